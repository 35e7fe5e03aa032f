use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Reference to an image produced by the engine, usable in `FROM` and `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ImageId(pub String);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a running container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a single readiness probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    NotReady(String),
}

/// Everything the engine needs from the surrounding process, passed in
/// explicitly instead of being read from the environment.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Engine binary, e.g. `docker` or `podman`.
    pub program: String,
    /// Daemon address forwarded as `-H`.
    pub host: Option<String>,
    /// Directory copied into `/workspace` of the base build.
    pub context_dir: PathBuf,
    /// Upper bound for any single engine call.
    pub timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            host: None,
            context_dir: PathBuf::from("."),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Why an engine call did not succeed. Recorded per step, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
    #[error("container engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    #[error("`{command}` exited with {}", exit_label(.code))]
    NonZeroExit { command: String, code: Option<i32> },

    #[error("engine call timed out after {}", human(.after))]
    TimedOut {
        #[serde(with = "crate::config::human_duration")]
        after: Duration,
    },

    #[error("not ready after {attempts} probe attempt(s): {last}")]
    ProbeTimeout { attempts: u32, last: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (killed by signal)".to_string(),
    }
}

fn human(d: &Duration) -> String {
    humantime::format_duration(*d).to_string()
}

/// Describes one invocation of the engine binary. `args` excludes the
/// program name itself.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub args: Vec<String>,
    pub timeout: Duration,
}

/// Outcome of an engine process.
#[derive(Debug)]
pub struct ProcessResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub log: String,
    pub timed_out: bool,
}
