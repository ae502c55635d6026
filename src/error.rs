//! Error taxonomy
//!
//! - `DiscoveryError`: ctest listing missing, failed or unreadable
//! - `IntrospectionError`: `-functions` could not be obtained for one executable
//! - `RunError`: a test process could not be started
//! - `CorrelationError`: the TAP log of a run is unreadable or malformed
//! - `AttributionError`: a parsed failure names a slot the executable does not have
//! - `ConfigError`: `qttest.toml` unreadable or invalid

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no cmake build directory given")]
    EmptyBuildDir,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} --show-only=json-v1 exited with code {code} in {build_dir}")]
    Failed {
        program: String,
        code: i32,
        build_dir: PathBuf,
    },

    #[error("empty json output from ctest in {0}")]
    EmptyOutput(PathBuf),

    #[error("invalid ctest json: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IntrospectionError {
    #[error("executable does not exist: {0}")]
    MissingExecutable(PathBuf),

    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run -functions, stdout={stdout}; stderr={stderr}; code={code}")]
    Failed {
        code: i32,
        stdout: String,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{executable} has no slot named {slot}")]
    UnknownSlot { executable: PathBuf, slot: String },

    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("failed to read log file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("log file {0} contains no TAP output")]
    Malformed(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to find slot with name {slot} in {executable}")]
pub struct AttributionError {
    pub executable: PathBuf,
    pub slot: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
