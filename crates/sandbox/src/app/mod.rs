use std::env;
use std::path::PathBuf;

use overworld::{LevelLoadError, MovementConfigError, WorldError};
use thiserror::Error;

mod atomic_io;
mod bootstrap;
mod loop_runner;
mod objects;
mod report;
mod scenario;
mod session;

pub(crate) use bootstrap::build_app;
pub(crate) use loop_runner::run;

#[derive(Debug, Error)]
pub(crate) enum SandboxError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("{var} is set but is not a directory: {path}")]
    InvalidRoot { var: &'static str, path: PathBuf },
    #[error("failed to read scenario file {path}: {source}")]
    ReadScenario {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario {path} at {json_path}: {source}")]
    ParseScenario {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid scenario {path}: {message}")]
    InvalidScenario { path: PathBuf, message: String },
    #[error("invalid movement config: {0}")]
    MovementConfig(#[from] MovementConfigError),
    #[error("failed to load level: {0}")]
    Level(#[from] LevelLoadError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("unknown object kind '{kind}' for object '{label}'")]
    UnknownObjectKind { kind: String, label: String },
    #[error("failed to serialize run report: {0}")]
    SerializeReport(#[source] serde_json::Error),
    #[error("failed to write run report to {path}: {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
