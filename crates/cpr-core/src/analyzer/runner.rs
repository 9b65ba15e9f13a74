//! Subprocess execution with a wall-clock timeout.

use std::ffi::OsString;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::errors::AnalyzerError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A fully resolved command line.
#[derive(Clone, Debug, Default)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|p| p.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            let _ = r.read_to_end(&mut buf);
        }
        buf
    })
}

/// Run `spec`, killing the child once `timeout` elapses.
///
/// stdout and stderr are drained on helper threads so a chatty child cannot
/// block on a full pipe while we wait for it.
pub fn run_with_timeout(
    tool: &str,
    spec: &CommandSpec,
    timeout: Duration,
) -> Result<CommandOutput, AnalyzerError> {
    let started = Instant::now();
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.envs.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| AnalyzerError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AnalyzerError::Spawn {
                    tool: tool.to_string(),
                    source,
                });
            }
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            let elapsed_secs = started.elapsed().as_secs_f64();
            tracing::error!(tool, elapsed_secs, command = %spec.display(), "analyzer timeout");
            return Err(AnalyzerError::Timeout {
                tool: tool.to_string(),
                elapsed_secs,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    Ok(CommandOutput {
        exit_code: status.code(),
        success: status.success(),
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
        elapsed: started.elapsed(),
    })
}

/// Find the JSON object a bridge printed, tolerating stray log lines: either
/// the whole trimmed output, or the last line that looks like an object.
pub fn extract_json_line(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{') && line.ends_with('}'))
        .last()
}

/// Truncate to at most `max` bytes on a char boundary.
pub fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
