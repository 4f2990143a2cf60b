//! Error kinds for the rcm core.
//!
//! Every fallible operation in this crate returns `RcmError`. Validation and
//! state errors are reported before any side effect happens; external-operation
//! errors are reported per operation by the caller. Nothing in this crate
//! terminates the process; turning an error into an exit code is the CLI's job.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RcmError>;

#[derive(Debug, Error)]
pub enum RcmError {
    // ------------------------------------------------------------------
    // Validation errors
    // ------------------------------------------------------------------
    #[error("name of the cluster is required")]
    ClusterNameRequired,

    #[error("illegal cluster name, allowed characters are letters, digits, '_', '+', '-' and '.'")]
    IllegalClusterName,

    #[error("cluster should have at least {min} nodes")]
    TooFewNodes { min: usize },

    #[error("start port out of range of allowed ports (1-{max})")]
    PortOutOfRange { max: u16 },

    #[error("number of replicas should be in range 0..{node_count}")]
    IllegalReplicaCount { node_count: usize },

    #[error("nodes count is required")]
    NodesCountRequired,

    #[error("illegal percent value, should be in range (0, 100]")]
    IllegalPercentValue,

    #[error("node count should be in range 1..{node_count}")]
    IllegalNodeCount { node_count: usize },

    // ------------------------------------------------------------------
    // State errors
    // ------------------------------------------------------------------
    #[error("cluster {0} already exists")]
    ClusterExists(String),

    #[error("cluster {0} does not exist")]
    ClusterDoesNotExist(String),

    #[error("all cluster nodes are down")]
    ClusterIsDown,

    // ------------------------------------------------------------------
    // External-operation errors
    // ------------------------------------------------------------------
    #[error("{0} not found on PATH")]
    BinaryNotFound(String),

    #[error("no pid file for node {address}, nothing to signal")]
    NoPid { address: String },

    #[error("malformed pid file {path}: {reason}")]
    MalformedPid { path: PathBuf, reason: String },

    #[error("can't fetch id of node {address}")]
    IdentityNotFound { address: String },

    #[error("failed to launch {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {stderr}")]
    ExternalCommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout_secs}s")]
    ExternalCommandTimeout { program: String, timeout_secs: u64 },

    // ------------------------------------------------------------------
    // Wrapped I/O and serialization failures
    // ------------------------------------------------------------------
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
}
