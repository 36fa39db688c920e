//! Engine command construction.
//!
//! Turns [`ResolvedParameters`] into the expand executable's argument vector:
//!
//! ```text
//! <engine> [-no_seek] -quiet -i <input> -o <output>
//!          [-reduce n] [-rotate d] [-jpx_layer n] [-region {t,l},{h,w}]
//! ```
//!
//! Optional flags are only emitted when their value is non-zero. Arguments
//! are passed as an argv vector, never through a shell, so paths with spaces
//! reach the engine intact; [`EngineCommand::command_line`] quotes them for
//! logs and diagnostics.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::region::{RegionBox, ResolvedParameters};

/// Pseudo-path the engine reads standard input from.
pub const STDIN_PATH: &str = "/dev/stdin";

/// Pseudo-path the engine writes standard output to.
pub const STDOUT_PATH: &str = "/dev/stdout";

/// Region used by the header dump so the probe decodes almost nothing.
const PROBE_REGION: RegionBox = [0.0, 0.0, 0.01, 0.01];

/// Environment variable the engine's shared libraries are located through.
pub const fn library_path_var() -> &'static str {
    if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else if cfg!(windows) {
        "PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

// =============================================================================
// Engine Paths
// =============================================================================

/// Where the engine reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePath {
    Stdin,
    Stdout,
    File(PathBuf),
}

impl EnginePath {
    fn as_os_str(&self) -> &OsStr {
        match self {
            EnginePath::Stdin => OsStr::new(STDIN_PATH),
            EnginePath::Stdout => OsStr::new(STDOUT_PATH),
            EnginePath::File(path) => path.as_os_str(),
        }
    }

    /// Whether the engine must be told the input cannot seek.
    pub fn is_stream(&self) -> bool {
        matches!(self, EnginePath::Stdin)
    }
}

// =============================================================================
// Engine Command
// =============================================================================

/// A fully specified engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
}

impl EngineCommand {
    /// Command for `program`, optionally anchored in an installation directory.
    ///
    /// The installation directory becomes the working directory and the
    /// shared-library search path; a relative program is resolved inside it.
    pub fn new(program: impl Into<PathBuf>, home: Option<&Path>) -> Self {
        let program = program.into();
        let (program, env, current_dir) = match home {
            Some(home) => {
                let program = if program.is_relative() {
                    home.join(&program)
                } else {
                    program
                };
                (
                    program,
                    vec![(
                        OsString::from(library_path_var()),
                        home.as_os_str().to_os_string(),
                    )],
                    Some(home.to_path_buf()),
                )
            }
            None => (program, Vec::new(), None),
        };
        Self {
            program,
            args: Vec::new(),
            env,
            current_dir,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    fn flag_if(self, flag: &str, value: u32) -> Self {
        if value > 0 {
            self.arg(flag).arg(value.to_string())
        } else {
            self
        }
    }

    /// Printable command line, quoting any argument that contains whitespace.
    pub fn command_line(&self) -> String {
        let mut line = quote(self.program.as_os_str());
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line
    }
}

fn quote(arg: &OsStr) -> String {
    let s = arg.to_string_lossy();
    if s.chars().any(char::is_whitespace) {
        format!("\"{}\"", s)
    } else {
        s.into_owned()
    }
}

/// Format a region box as `{top,left},{height,width}`.
pub fn format_region(region: &RegionBox) -> String {
    format!(
        "{{{},{}}},{{{},{}}}",
        region[0], region[1], region[2], region[3]
    )
}

// =============================================================================
// Builders
// =============================================================================

fn io_args(command: EngineCommand, input: &EnginePath, output: &EnginePath) -> EngineCommand {
    let command = if input.is_stream() {
        command.arg("-no_seek")
    } else {
        command
    };
    command
        .arg("-quiet")
        .arg("-i")
        .arg(input.as_os_str())
        .arg("-o")
        .arg(output.as_os_str())
}

/// Build the decode invocation for one set of resolved parameters.
pub fn expand_command(
    program: &Path,
    home: Option<&Path>,
    input: &EnginePath,
    output: &EnginePath,
    params: &ResolvedParameters,
) -> EngineCommand {
    let command = io_args(EngineCommand::new(program, home), input, output)
        .flag_if("-reduce", params.reduce)
        .flag_if("-rotate", params.rotation.degrees())
        .flag_if("-jpx_layer", params.layer);

    match &params.region {
        Some(region) => command.arg("-region").arg(format_region(region)),
        None => command,
    }
}

/// Build the header-dump invocation used to probe metadata.
///
/// The engine decodes a tiny corner into `scratch` and writes its codestream
/// parameters as `key=value` lines to `record`.
pub fn probe_command(
    program: &Path,
    home: Option<&Path>,
    input: &EnginePath,
    scratch: &Path,
    record: &EnginePath,
) -> EngineCommand {
    io_args(
        EngineCommand::new(program, home),
        input,
        &EnginePath::File(scratch.to_path_buf()),
    )
    .arg("-record")
    .arg(record.as_os_str())
    .arg("-region")
    .arg(format_region(&PROBE_REGION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Rotation;

    fn args(command: &EngineCommand) -> Vec<String> {
        command
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn params(
        region: Option<RegionBox>,
        reduce: u32,
        rotation: Rotation,
        layer: u32,
    ) -> ResolvedParameters {
        ResolvedParameters {
            region,
            reduce,
            rotation,
            layer,
        }
    }

    #[test]
    fn test_minimal_file_command() {
        let cmd = expand_command(
            Path::new("kdu_expand"),
            None,
            &EnginePath::File(PathBuf::from("/data/a.jp2")),
            &EnginePath::Stdout,
            &params(None, 0, Rotation::None, 0),
        );
        assert_eq!(
            args(&cmd),
            vec!["-quiet", "-i", "/data/a.jp2", "-o", "/dev/stdout"]
        );
        assert!(cmd.env.is_empty());
        assert!(cmd.current_dir.is_none());
    }

    #[test]
    fn test_stream_input_adds_no_seek() {
        let cmd = expand_command(
            Path::new("kdu_expand"),
            None,
            &EnginePath::Stdin,
            &EnginePath::Stdout,
            &params(None, 0, Rotation::None, 0),
        );
        assert_eq!(args(&cmd)[0], "-no_seek");
        assert_eq!(args(&cmd)[3], "/dev/stdin");
    }

    #[test]
    fn test_full_command() {
        let cmd = expand_command(
            Path::new("kdu_expand"),
            None,
            &EnginePath::File(PathBuf::from("a.jp2")),
            &EnginePath::Stdout,
            &params(Some([0.1, 0.05, 0.2, 0.3]), 2, Rotation::Deg90, 1),
        );
        assert_eq!(
            args(&cmd),
            vec![
                "-quiet",
                "-i",
                "a.jp2",
                "-o",
                "/dev/stdout",
                "-reduce",
                "2",
                "-rotate",
                "90",
                "-jpx_layer",
                "1",
                "-region",
                "{0.1,0.05},{0.2,0.3}",
            ]
        );
    }

    #[test]
    fn test_engine_home_sets_environment() {
        let home = Path::new("/opt/kakadu");
        let cmd = EngineCommand::new("kdu_expand", Some(home));
        assert_eq!(cmd.program, PathBuf::from("/opt/kakadu/kdu_expand"));
        assert_eq!(cmd.current_dir.as_deref(), Some(home));
        assert_eq!(cmd.env.len(), 1);
        assert_eq!(cmd.env[0].0, OsString::from(library_path_var()));
        assert_eq!(cmd.env[0].1, OsString::from("/opt/kakadu"));
    }

    #[test]
    fn test_command_line_quotes_spaces() {
        let cmd = expand_command(
            Path::new("kdu_expand"),
            None,
            &EnginePath::File(PathBuf::from("/my images/a.jp2")),
            &EnginePath::Stdout,
            &params(None, 0, Rotation::None, 0),
        );
        assert_eq!(
            cmd.command_line(),
            "kdu_expand -quiet -i \"/my images/a.jp2\" -o /dev/stdout"
        );
        // The argv entry itself is not quoted
        assert_eq!(args(&cmd)[2], "/my images/a.jp2");
    }

    #[test]
    fn test_probe_command() {
        let cmd = probe_command(
            Path::new("kdu_expand"),
            None,
            &EnginePath::Stdin,
            Path::new("/tmp/probe.ppm"),
            &EnginePath::Stdout,
        );
        assert_eq!(
            args(&cmd),
            vec![
                "-no_seek",
                "-quiet",
                "-i",
                "/dev/stdin",
                "-o",
                "/tmp/probe.ppm",
                "-record",
                "/dev/stdout",
                "-region",
                "{0,0},{0.01,0.01}",
            ]
        );
    }
}
