//! Verifier adapter shelling out to a `spatch`-compatible binary.
//!
//! Every operation writes its inputs to uniquely-named temp files, runs the
//! binary with a hard timeout, and classifies the exit. Temp files are
//! RAII-owned so they are released on every exit path, including timeout
//! and spawn failure; a dropped invocation also kills the child process.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::config::VerifierConfig;
use crate::verifier::{Apply, DryRun, SyntaxCheck, Verifier};

/// Maximum captured output per stream before truncation (64KB).
const MAX_CAPTURE: usize = 64 * 1024;

/// Adapter around the external structural verifier binary.
pub struct SpatchVerifier {
    program: PathBuf,
    timeout: Duration,
}

impl SpatchVerifier {
    /// Create an adapter from configuration.
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            program: config.program,
            timeout: config.timeout,
        }
    }

    /// Override the binary to invoke.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Override the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the binary with `args`, capturing both streams.
    async fn run(&self, args: Vec<OsString>) -> Result<ProcessOutput, RunFailure> {
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program = %self.program.display(), ?args, "invoking verifier");

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RunFailure::Missing);
            }
            Ok(Err(e)) => return Err(RunFailure::Io(e.to_string())),
            Err(_) => return Err(RunFailure::Timeout(self.timeout)),
        };

        Ok(ProcessOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: truncate_capture(&String::from_utf8_lossy(&output.stdout)),
            stderr: truncate_capture(&String::from_utf8_lossy(&output.stderr)),
        })
    }

    fn failure_message(&self, failure: &RunFailure) -> String {
        match failure {
            RunFailure::Missing => format!(
                "verifier binary '{}' not found; is the structural patch tool installed?",
                self.program.display()
            ),
            RunFailure::Timeout(timeout) => {
                format!("verifier timed out after {:?}", timeout)
            }
            RunFailure::Io(reason) => format!("verifier invocation failed: {}", reason),
        }
    }
}

#[async_trait]
impl Verifier for SpatchVerifier {
    async fn syntax_check(&self, script: &str) -> SyntaxCheck {
        let script_file = match ephemeral_file(script, ".cocci") {
            Ok(file) => file,
            Err(e) => {
                return SyntaxCheck::SystemError {
                    message: format!("could not stage script: {}", e),
                };
            }
        };

        let args = vec![
            OsString::from("--parse-cocci"),
            script_file.path().as_os_str().to_owned(),
        ];

        match self.run(args).await {
            Ok(output) if output.success => SyntaxCheck::Ok,
            Ok(output) => SyntaxCheck::SyntaxError {
                message: output.diagnostic(),
            },
            Err(failure) => SyntaxCheck::SystemError {
                message: self.failure_message(&failure),
            },
        }
    }

    async fn dry_run(&self, script: &str, sample_input: &str) -> DryRun {
        let staged = ephemeral_file(script, ".cocci")
            .and_then(|s| ephemeral_file(sample_input, ".c").map(|i| (s, i)));
        let (script_file, input_file) = match staged {
            Ok(pair) => pair,
            Err(e) => {
                return DryRun::SystemError {
                    message: format!("could not stage script or sample: {}", e),
                };
            }
        };

        let args = vec![
            OsString::from("--sp-file"),
            script_file.path().as_os_str().to_owned(),
            input_file.path().as_os_str().to_owned(),
        ];

        match self.run(args).await {
            Ok(output) if output.success => {
                if output.stdout.trim().is_empty() {
                    DryRun::LogicError {
                        message: "script parsed but produced no transformation on the sample \
                                  input; the pattern likely matches nothing in it"
                            .to_string(),
                    }
                } else {
                    DryRun::Ok {
                        diff: output.stdout,
                    }
                }
            }
            Ok(output) => DryRun::SystemError {
                message: output.diagnostic(),
            },
            Err(failure) => DryRun::SystemError {
                message: self.failure_message(&failure),
            },
        }
    }

    async fn apply(&self, script: &str, targets: &[PathBuf]) -> Apply {
        if targets.is_empty() {
            return Apply::Applied {
                summary: "no target files; nothing to apply".to_string(),
            };
        }

        let script_file = match ephemeral_file(script, ".cocci") {
            Ok(file) => file,
            Err(e) => {
                return Apply::SystemError {
                    message: format!("could not stage script: {}", e),
                };
            }
        };

        let mut args = vec![
            OsString::from("--sp-file"),
            script_file.path().as_os_str().to_owned(),
            OsString::from("--in-place"),
        ];
        args.extend(targets.iter().map(|t| t.as_os_str().to_owned()));

        match self.run(args).await {
            Ok(output) if output.success => {
                let summary = if output.stdout.trim().is_empty() {
                    format!("applied to {} file(s)", targets.len())
                } else {
                    output.stdout
                };
                Apply::Applied { summary }
            }
            Ok(output) => Apply::SystemError {
                message: output.diagnostic(),
            },
            Err(failure) => Apply::SystemError {
                message: self.failure_message(&failure),
            },
        }
    }
}

struct ProcessOutput {
    code: Option<i32>,
    success: bool,
    stdout: String,
    stderr: String,
}

impl ProcessOutput {
    /// Combine both streams into one diagnostic. Errors usually land on
    /// stderr, but some tools split context across both.
    fn diagnostic(&self) -> String {
        let mut parts = Vec::new();
        if let Some(code) = self.code {
            parts.push(format!("exit code {}", code));
        }
        if !self.stderr.trim().is_empty() {
            parts.push(self.stderr.trim().to_string());
        }
        if !self.stdout.trim().is_empty() {
            parts.push(self.stdout.trim().to_string());
        }
        parts.join("\n")
    }
}

enum RunFailure {
    Missing,
    Timeout(Duration),
    Io(String),
}

/// Stage `contents` into a uniquely-named temp file with the given suffix.
fn ephemeral_file(contents: &str, suffix: &str) -> io::Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("patchwright-")
        .suffix(suffix)
        .tempfile()?;
    std::fs::write(file.path(), contents)?;
    Ok(file)
}

/// Truncate captured output, keeping head and tail.
fn truncate_capture(s: &str) -> String {
    if s.len() <= MAX_CAPTURE {
        return s.to_string();
    }

    let mut half = MAX_CAPTURE / 2;
    while !s.is_char_boundary(half) {
        half -= 1;
    }
    let mut tail_start = s.len() - MAX_CAPTURE / 2;
    while !s.is_char_boundary(tail_start) {
        tail_start += 1;
    }

    format!(
        "{}\n... [truncated {} bytes] ...\n{}",
        &s[..half],
        s.len() - MAX_CAPTURE,
        &s[tail_start..]
    )
}
