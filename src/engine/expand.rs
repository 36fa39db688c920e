//! Out-of-process engine built on the expand executable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempPath;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ExtractError;
use crate::format::{ImageMetadata, ImageSource};
use crate::raster::{parse_pnm, Raster};
use crate::region::ResolvedParameters;

use super::command::{expand_command, probe_command, EnginePath};
use super::process::{Invocation, OutputTarget, ProcessAdapter};
use super::record::parse_record;
use super::{DecodeEngine, OutputStrategy};

/// Executable name used when none is configured.
pub const DEFAULT_ENGINE_EXECUTABLE: &str = "kdu_expand";

/// Pause between engine exit and reading its output file.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

// =============================================================================
// Configuration
// =============================================================================

/// Settings for the out-of-process engine.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Engine executable; relative paths resolve inside `home`
    pub executable: PathBuf,

    /// Installation directory (library search path and working directory)
    pub home: Option<PathBuf>,

    pub output: OutputStrategy,

    /// Temp-file settle delay
    pub settle: Duration,

    /// Directory for temp inputs and outputs
    pub scratch_dir: PathBuf,
}

impl ProcessConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            home: None,
            output: OutputStrategy::for_host(),
            settle: DEFAULT_SETTLE,
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_output(mut self, output: OutputStrategy) -> Self {
        self.output = output;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_EXECUTABLE)
    }
}

// =============================================================================
// Process Engine
// =============================================================================

/// Engine input: where the engine reads from, what to pipe in, and the
/// scratch copy that must outlive the run.
struct EngineInput {
    path: EnginePath,
    stdin: Option<Bytes>,
    scratch: Option<TempPath>,
}

/// [`DecodeEngine`] that runs the expand executable once per call.
pub struct ProcessEngine {
    config: ProcessConfig,
    adapter: ProcessAdapter,
}

impl ProcessEngine {
    pub fn new(config: ProcessConfig) -> Self {
        let adapter = ProcessAdapter::new(config.settle);
        Self { config, adapter }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// The adapter, for handle accounting.
    pub fn adapter(&self) -> &ProcessAdapter {
        &self.adapter
    }

    fn scratch_path(&self, suffix: &str) -> Result<TempPath, ExtractError> {
        tempfile::Builder::new()
            .prefix("jp2-")
            .suffix(suffix)
            .tempfile_in(&self.config.scratch_dir)
            .map(|file| file.into_temp_path())
            .map_err(|e| ExtractError::Io {
                context: "create engine scratch file",
                message: e.to_string(),
            })
    }

    async fn input_for(&self, source: &ImageSource) -> Result<EngineInput, ExtractError> {
        match source {
            ImageSource::File(path) => Ok(EngineInput {
                path: EnginePath::File(absolute(path)?),
                stdin: None,
                scratch: None,
            }),
            ImageSource::Bytes { data, .. } => match self.config.output {
                OutputStrategy::Pipe => Ok(EngineInput {
                    path: EnginePath::Stdin,
                    stdin: Some(data.clone()),
                    scratch: None,
                }),
                OutputStrategy::TempFile => {
                    let scratch = self.scratch_path(".jp2")?;
                    tokio::fs::write(&scratch, data)
                        .await
                        .map_err(|e| ExtractError::Io {
                            context: "write engine scratch input",
                            message: e.to_string(),
                        })?;
                    Ok(EngineInput {
                        path: EnginePath::File(scratch.to_path_buf()),
                        stdin: None,
                        scratch: Some(scratch),
                    })
                }
            },
        }
    }

    fn output_for(&self, suffix: &str) -> Result<(EnginePath, OutputTarget), ExtractError> {
        match self.config.output {
            OutputStrategy::Pipe => Ok((EnginePath::Stdout, OutputTarget::Stdout)),
            OutputStrategy::TempFile => {
                let path = self.scratch_path(suffix)?;
                Ok((
                    EnginePath::File(path.to_path_buf()),
                    OutputTarget::File(path),
                ))
            }
        }
    }
}

#[async_trait]
impl DecodeEngine for ProcessEngine {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn probe(&self, source: &ImageSource) -> Result<ImageMetadata, ExtractError> {
        source.verify().await?;

        let EngineInput {
            path,
            stdin,
            scratch: _scratch,
        } = self.input_for(source).await?;
        let throwaway = self.scratch_path(".ppm")?;
        let (record, output) = self.output_for(".txt")?;

        let command = probe_command(
            &self.config.executable,
            self.config.home.as_deref(),
            &path,
            &throwaway,
            &record,
        );
        let dump = self
            .adapter
            .run(
                Invocation {
                    command,
                    stdin,
                    output,
                },
                &CancellationToken::new(),
            )
            .await?;

        let metadata = parse_record(&String::from_utf8_lossy(&dump))?;
        debug!(
            source = %source.identity(),
            width = metadata.width,
            height = metadata.height,
            levels = metadata.levels,
            "Probed image via header dump"
        );
        Ok(metadata)
    }

    async fn decode(
        &self,
        source: &ImageSource,
        params: &ResolvedParameters,
        cancel: &CancellationToken,
    ) -> Result<Raster, ExtractError> {
        let EngineInput {
            path,
            stdin,
            scratch: _scratch,
        } = self.input_for(source).await?;
        let (output_path, output) = self.output_for(".ppm")?;

        let command = expand_command(
            &self.config.executable,
            self.config.home.as_deref(),
            &path,
            &output_path,
            params,
        );
        let pnm = self
            .adapter
            .run(
                Invocation {
                    command,
                    stdin,
                    output,
                },
                cancel,
            )
            .await?;

        let raster = parse_pnm(&pnm)?;
        debug!(
            source = %source.identity(),
            width = raster.width(),
            height = raster.height(),
            reduce = params.reduce,
            "Decoded region"
        );
        Ok(raster)
    }
}

/// The engine may run in another working directory, so relative source
/// paths are anchored to ours first.
fn absolute(path: &Path) -> Result<PathBuf, ExtractError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| ExtractError::Io {
            context: "resolve source path",
            message: e.to_string(),
        })
}
