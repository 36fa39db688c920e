//! JP2 Streamer - JPEG 2000 region extraction and tile server.
//!
//! This binary parses the command line, starts logging and runs one
//! subcommand.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jp2_streamer::{
    config::{Cli, Command, ExtractConfig, InspectConfig, ServeConfig, STDIN_INPUT},
    context::{ImagingContext, TileOptions},
    error::ExtractError,
    extract::Extractor,
    format::ImageSource,
    referent::DirectoryResolver,
    server::{create_router, RouterConfig},
    tile::JpegTileEncoder,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.command.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Probe(config) => run_probe(config).await,
        Command::Xml(config) => run_xml(config).await,
        Command::Extract(config) => run_extract(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so `probe` and `xml` output stays clean on stdout.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "jp2_streamer=debug,tower_http=debug"
    } else {
        "jp2_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open a CLI input path, reading `-` from stdin as a stream source.
async fn open_input(input: &Path) -> Result<ImageSource, ExtractError> {
    if input.as_os_str() == STDIN_INPUT {
        let mut data = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut data)
            .await
            .map_err(|e| ExtractError::from_io("read standard input", e))?;
        Ok(ImageSource::bytes("stdin", data))
    } else {
        Ok(ImageSource::file(input))
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    let cache_dir = config.cache_dir();

    info!("Configuration:");
    info!("  Engine: {:?}", config.engine.kind());
    if let Some(home) = &config.engine.engine_home {
        info!("  Engine home: {}", home.display());
    }
    info!("  Image root: {}", config.image_root.display());
    info!(
        "  Tile cache: {} tiles in {} ({} delete workers)",
        config.cache_tiles,
        cache_dir.display(),
        config.delete_workers
    );

    let options = TileOptions::new(&cache_dir)
        .with_capacity(config.cache_tiles)
        .with_delete_workers(config.delete_workers)
        .with_default_quality(config.jpeg_quality);
    let context = match ImagingContext::start(
        config.engine.build_engine(),
        Arc::new(DirectoryResolver::new(&config.image_root)),
        options,
    )
    .await
    {
        Ok(context) => Arc::new(context),
        Err(e) => {
            error!("Failed to start imaging context: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);
    if let Some(origins) = &config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }
    let router = create_router(context.clone(), router_config);

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            context.shutdown().await;
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!("  curl http://{}/images/<id>/info", addr);

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Could not install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
        })
        .await;

    context.shutdown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Probe / Xml Commands
// =============================================================================

async fn run_probe(config: InspectConfig) -> ExitCode {
    let extractor = Extractor::new(config.engine.build_engine());
    let result = async {
        let source = open_input(&config.input).await?;
        extractor.probe(&source).await
    }
    .await;

    match result {
        Ok(metadata) => match serde_json::to_string_pretty(&metadata) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to serialize metadata: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_xml(config: InspectConfig) -> ExitCode {
    let extractor = Extractor::new(config.engine.build_engine());
    let result = async {
        let source = open_input(&config.input).await?;
        extractor.xml_boxes(&source).await
    }
    .await;

    match result {
        Ok(boxes) => {
            for payload in boxes {
                println!("{}", String::from_utf8_lossy(&payload));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Extract Command
// =============================================================================

async fn run_extract(config: ExtractConfig) -> ExitCode {
    let request = match config.decode_request() {
        Ok(request) => request,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let extractor = Extractor::new(config.engine.build_engine());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling decode");
            on_interrupt.cancel();
        }
    });

    let source = match open_input(&config.input).await {
        Ok(source) => source,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let raster = match extractor.extract(&source, &request, &cancel).await {
        Ok(raster) => raster,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let (width, height) = (raster.width(), raster.height());

    let quality = config.quality;
    let encoded =
        tokio::task::spawn_blocking(move || JpegTileEncoder::new().encode(raster, quality)).await;
    let jpeg = match encoded {
        Ok(Ok(jpeg)) => jpeg,
        Ok(Err(e)) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Encoder task failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, &jpeg).await {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote {}x{} region to {} ({} bytes)",
        width,
        height,
        config.output.display(),
        jpeg.len()
    );
    ExitCode::SUCCESS
}
