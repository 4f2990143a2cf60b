//! Cluster and node configuration.
//!
//! `ClusterConf` is the immutable recipe a cluster was created from; it is
//! persisted once as `cluster.yml` and read back whenever the cluster is
//! opened. `NodeConf` describes one server instance and is rendered into the
//! server's own directive-per-line config dialect.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The recipe a cluster topology was created from. Round-trips losslessly
/// through `save`/`load`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConf {
    #[serde(rename = "bind")]
    pub listen_host: String,
    pub ports: Vec<u16>,
    pub persistence: bool,
}

impl ClusterConf {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

/// Configuration of a single server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConf {
    pub listen_host: String,
    pub listen_port: u16,
    pub persistence: bool,
    pub data_dir: PathBuf,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
}

impl NodeConf {
    /// Render the configuration in the server's directive-per-line dialect.
    ///
    /// The directive order is not significant to the server but is kept fixed
    /// for readability. `bind` is omitted for an empty host, `port` for 0.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("daemonize yes\n");
        out.push_str("cluster-enabled yes\n");
        out.push_str("loglevel notice\n");

        if !self.listen_host.is_empty() {
            out.push_str(&format!("bind {}\n", self.listen_host));
        }

        if self.listen_port > 0 {
            out.push_str(&format!("port {}\n", self.listen_port));
        }

        if !self.pid_file.as_os_str().is_empty() {
            out.push_str(&format!("pidfile {}\n", self.pid_file.display()));
        }

        if !self.log_file.as_os_str().is_empty() {
            out.push_str(&format!("logfile {}\n", self.log_file.display()));
        }

        if self.persistence {
            out.push_str(&format!("dir {}\n", self.data_dir.display()));
            out.push_str("appendonly yes\n");
        } else {
            out.push_str("appendonly no\n");
            out.push_str("save \"\"\n");
        }

        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }
}
