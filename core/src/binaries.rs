//! Resolution of the external executables the manager drives.
//!
//! The three collaborators (`redis-server`, `redis-cli`, `kill`) are resolved
//! on PATH once at startup, so a missing installation is reported before any
//! cluster operation begins.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{RcmError, Result};

const REDIS_SERVER: &str = "redis-server";
const REDIS_CLIENT: &str = "redis-cli";
const KILL: &str = "kill";

/// Absolute paths of the external executables, looked up by role.
#[derive(Debug, Clone)]
pub struct Binaries {
    server: PathBuf,
    client: PathBuf,
    kill: PathBuf,
}

impl Binaries {
    /// Resolve all three executables on PATH.
    pub fn resolve() -> Result<Self> {
        Ok(Binaries {
            server: find_in_path(REDIS_SERVER)?,
            client: find_in_path(REDIS_CLIENT)?,
            kill: find_in_path(KILL)?,
        })
    }

    /// Construct from explicit paths, for tests and unusual installations.
    pub fn with_paths(
        server: impl Into<PathBuf>,
        client: impl Into<PathBuf>,
        kill: impl Into<PathBuf>,
    ) -> Self {
        Binaries {
            server: server.into(),
            client: client.into(),
            kill: kill.into(),
        }
    }

    pub fn server(&self) -> &Path {
        &self.server
    }

    pub fn client(&self) -> &Path {
        &self.client
    }

    pub fn kill(&self) -> &Path {
        &self.kill
    }
}

fn find_in_path(name: &str) -> Result<PathBuf> {
    let path_var = env::var_os("PATH").ok_or_else(|| RcmError::BinaryNotFound(name.into()))?;

    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }

    Err(RcmError::BinaryNotFound(name.into()))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
