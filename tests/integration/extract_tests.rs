//! End-to-end extraction through the out-of-process engine.
//!
//! A shell script stands in for the expand executable, so these run on unix
//! only.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use jp2_streamer::{
    DecodeRequest, ExtractError, Extractor, ImageSource, OutputStrategy, ProcessConfig,
    ProcessEngine, Region,
};

use super::test_utils::{create_jp2, FakeExpand};

struct Fixture {
    dir: TempDir,
    expand: FakeExpand,
    engine: Arc<ProcessEngine>,
}

impl Fixture {
    fn new(make: fn(&std::path::Path) -> FakeExpand, output: OutputStrategy) -> Self {
        let dir = TempDir::new().unwrap();
        let expand = make(dir.path());
        let engine = Arc::new(ProcessEngine::new(
            ProcessConfig::new(&expand.path)
                .with_output(output)
                .with_settle(Duration::from_millis(5))
                .with_scratch_dir(dir.path()),
        ));
        Self {
            dir,
            expand,
            engine,
        }
    }

    fn extractor(&self) -> Extractor {
        Extractor::new(self.engine.clone())
    }

    fn image(&self) -> ImageSource {
        let path = self.dir.path().join("page.jp2");
        std::fs::write(&path, create_jp2(2000, 1000, 5, &[])).unwrap();
        ImageSource::file(path)
    }

    fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("jp2-"))
            .count()
    }
}

#[tokio::test]
async fn test_probe_reads_header_dump() {
    let fixture = Fixture::new(FakeExpand::working, OutputStrategy::Pipe);

    let metadata = fixture.extractor().probe(&fixture.image()).await.unwrap();

    assert_eq!(metadata.width, 2000);
    assert_eq!(metadata.height, 1000);
    assert_eq!(metadata.levels, 5);
    assert_eq!(metadata.channels, 3);
    assert_eq!(metadata.bit_depth, 8);

    let calls = fixture.expand.invocations();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("-record /dev/stdout"));
}

#[tokio::test]
async fn test_level_request_resolves_reduce_and_region() {
    let fixture = Fixture::new(FakeExpand::working, OutputStrategy::Pipe);
    let request = DecodeRequest::new()
        .with_region("0,0,0.5,0.25".parse::<Region>().unwrap())
        .with_level(2);

    let raster = fixture
        .extractor()
        .extract(&fixture.image(), &request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((raster.width(), raster.height(), raster.channels()), (4, 2, 3));

    let calls = fixture.expand.invocations();
    assert_eq!(calls.len(), 2, "probe then decode");
    let decode = &calls[1];
    assert!(decode.contains("-o /dev/stdout"));
    assert!(decode.contains("-reduce 3"));
    assert!(decode.contains("-region {0,0},{0.5,0.25}"));
    assert!(!decode.contains("-no_seek"));
}

#[tokio::test]
async fn test_full_image_skips_probe() {
    let fixture = Fixture::new(FakeExpand::working, OutputStrategy::Pipe);
    let request = DecodeRequest::new().with_reduce(1);

    fixture
        .extractor()
        .extract(&fixture.image(), &request, &CancellationToken::new())
        .await
        .unwrap();

    let calls = fixture.expand.invocations();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("-reduce 1"));
    assert!(!calls[0].contains("-region"));
}

#[tokio::test]
async fn test_temp_file_output_is_cleaned_up() {
    let fixture = Fixture::new(FakeExpand::working, OutputStrategy::TempFile);
    let request = DecodeRequest::new()
        .with_region("0,0,0.5,0.5".parse::<Region>().unwrap())
        .with_level(1);

    let raster = fixture
        .extractor()
        .extract(&fixture.image(), &request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(raster.width(), 4);
    let decode = &fixture.expand.invocations()[1];
    assert!(!decode.contains("/dev/stdout"));
    assert!(decode.contains("-reduce 4"));
    assert_eq!(fixture.scratch_files(), 0);
}

#[tokio::test]
async fn test_stream_source_reads_from_stdin() {
    let fixture = Fixture::new(FakeExpand::working, OutputStrategy::Pipe);
    let source = ImageSource::bytes("upload", create_jp2(2000, 1000, 5, &[]));
    let request = DecodeRequest::new()
        .with_region("0,0,0.5,0.5".parse::<Region>().unwrap())
        .with_level(5);

    fixture
        .extractor()
        .extract(&source, &request, &CancellationToken::new())
        .await
        .unwrap();

    for call in fixture.expand.invocations() {
        assert!(call.contains("-no_seek"), "{}", call);
        assert!(call.contains("-i /dev/stdin"), "{}", call);
    }
}

#[tokio::test]
async fn test_engine_failure_carries_diagnostics() {
    let fixture = Fixture::new(FakeExpand::failing, OutputStrategy::Pipe);

    let err = fixture
        .extractor()
        .extract(
            &fixture.image(),
            &DecodeRequest::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        ExtractError::DecodeProcess { exit_code, stderr } => {
            assert_eq!(exit_code, Some(3));
            assert!(stderr.contains("region out of bounds"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(fixture.engine.adapter().open_handles(), 0);
}

#[tokio::test]
async fn test_invalid_signature_never_runs_engine() {
    let fixture = Fixture::new(FakeExpand::working, OutputStrategy::Pipe);
    let path = fixture.dir.path().join("not.jp2");
    std::fs::write(&path, b"II*\0 this is a tiff").unwrap();

    let err = fixture
        .extractor()
        .extract(
            &ImageSource::file(path),
            &DecodeRequest::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::InvalidFormat { .. }));
    assert!(fixture.expand.invocations().is_empty());
}

#[tokio::test]
async fn test_cancel_stops_engine_and_next_decode_succeeds() {
    let hanging = Fixture::new(FakeExpand::hanging, OutputStrategy::Pipe);
    let source = hanging.image();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = hanging
        .extractor()
        .extract(&source, &DecodeRequest::new(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(hanging.engine.adapter().open_handles(), 0);

    let working = Fixture::new(FakeExpand::working, OutputStrategy::Pipe);
    let raster = working
        .extractor()
        .extract(&working.image(), &DecodeRequest::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(raster.height(), 2);
}
