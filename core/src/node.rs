//! A single cluster node.
//!
//! A `Node` owns one server instance's configuration, file-system layout and
//! lifecycle. Liveness is derived on demand from the PID file rather than a
//! kept-alive process handle: the manager does not stay resident between
//! commands, so state must always be re-read from disk.
//!
//! Protocol commands (`CLUSTER MEET`, `CLUSTER ADDSLOTS`, ...) are built as
//! plain `CommandLine` values and executed by the caller through the node's
//! runner, keeping construction side-effect-free.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::binaries::Binaries;
use crate::config::{ClusterConf, NodeConf};
use crate::error::{RcmError, Result};
use crate::infrastructure::{CommandLine, ProcessRunner};

/// Length of the node identifier token in `CLUSTER NODES` output.
const NODE_ID_LEN: usize = 40;

/// A `host:port` endpoint, doubling as the node's stable external identifier
/// in protocol commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeAddress {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One server instance: its address, directory layout and process state.
pub struct Node {
    address: NodeAddress,
    conf_file: PathBuf,
    conf: NodeConf,
    binaries: Arc<Binaries>,
    runner: Arc<dyn ProcessRunner>,
}

impl Node {
    /// Lay out a node under `<cluster_dir>/<port>/`. Nothing touches the disk
    /// until `create` is called.
    pub fn new(
        cluster_dir: &std::path::Path,
        port: u16,
        cluster_conf: &ClusterConf,
        binaries: Arc<Binaries>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let base_dir = cluster_dir.join(port.to_string());

        Node {
            address: NodeAddress::new(cluster_conf.listen_host.clone(), port),
            conf_file: base_dir.join("conf").join("redis.conf"),
            conf: NodeConf {
                listen_host: cluster_conf.listen_host.clone(),
                listen_port: port,
                persistence: cluster_conf.persistence,
                log_file: base_dir.join("var").join("log").join("redis.log"),
                pid_file: base_dir.join("var").join("run").join("redis.pid"),
                data_dir: base_dir.join("var").join("lib").join("redis"),
            },
            binaries,
            runner,
        }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// Materialize the node's directory tree and write its config file.
    /// Partially-created directories are not rolled back on failure.
    pub fn create(&self) -> Result<()> {
        for file in [&self.conf_file, &self.conf.log_file, &self.conf.pid_file] {
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::create_dir_all(&self.conf.data_dir)?;

        self.conf.save(&self.conf_file)?;
        log::debug!("created node {}", self.address);
        Ok(())
    }

    /// Launch the server process. Does not wait for liveness and does not
    /// retry.
    pub fn start(&self) -> Result<()> {
        let cmd = CommandLine::new(
            self.binaries.server(),
            vec![self.conf_file.display().to_string()],
        );
        log::info!("starting node {}", self.address);
        self.runner.run(&cmd)
    }

    pub fn stop(&self) -> Result<()> {
        self.signal("TERM")
    }

    pub fn kill(&self) -> Result<()> {
        self.signal("KILL")
    }

    fn signal(&self, signal: &str) -> Result<()> {
        let pid = self.pid()?.ok_or_else(|| RcmError::NoPid {
            address: self.address.to_string(),
        })?;

        let cmd = CommandLine::new(
            self.binaries.kill(),
            vec!["-s".into(), signal.into(), pid.to_string()],
        );
        log::info!("sending {} to node {} (pid {})", signal, self.address, pid);
        self.runner.run(&cmd)
    }

    /// The PID recorded for this node, or `None` when the PID file is absent.
    pub fn pid(&self) -> Result<Option<i32>> {
        if !self.conf.pid_file.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.conf.pid_file)?;
        let pid = raw
            .trim()
            .parse::<i32>()
            .map_err(|e| RcmError::MalformedPid {
                path: self.conf.pid_file.clone(),
                reason: e.to_string(),
            })?;

        Ok(Some(pid))
    }

    /// Best-effort liveness: true iff the PID file holds a positive integer.
    /// The PID is not verified against the OS process table, so a recycled
    /// PID can be misreported as up.
    pub fn is_up(&self) -> Result<bool> {
        Ok(self.pid()?.is_some_and(|pid| pid > 0))
    }

    /// Fetch the node's 40-character identifier from the line of
    /// `CLUSTER NODES` output flagged `myself`. Fails before the node has
    /// joined any topology.
    pub fn id(&self) -> Result<String> {
        let output = self.runner.capture(&self.cluster_nodes())?;

        for line in output.lines() {
            if line.contains("myself") {
                if let Some(id) = line.get(..NODE_ID_LEN) {
                    return Ok(id.to_string());
                }
            }
        }

        Err(RcmError::IdentityNotFound {
            address: self.address.to_string(),
        })
    }

    // ------------------------------------------------------------------
    // Protocol command builders. Pure; executed through run_command /
    // capture_command / exec_command.
    // ------------------------------------------------------------------

    pub fn cluster_meet(&self, address: &NodeAddress) -> CommandLine {
        self.client_command(vec![
            "CLUSTER".into(),
            "MEET".into(),
            address.host.clone(),
            address.port.to_string(),
        ])
    }

    /// `CLUSTER ADDSLOTS` for the half-open range `[from_slot, to_slot)`.
    /// Every slot number is passed as its own argument.
    pub fn cluster_add_slots(&self, from_slot: usize, to_slot: usize) -> CommandLine {
        let mut args = vec!["CLUSTER".into(), "ADDSLOTS".into()];
        args.extend((from_slot..to_slot).map(|slot| slot.to_string()));
        self.client_command(args)
    }

    pub fn cluster_replicate(&self, master_id: &str) -> CommandLine {
        self.client_command(vec![
            "CLUSTER".into(),
            "REPLICATE".into(),
            master_id.into(),
        ])
    }

    pub fn cluster_nodes(&self) -> CommandLine {
        self.client_command(vec!["CLUSTER".into(), "NODES".into()])
    }

    pub fn cluster_info(&self) -> CommandLine {
        self.client_command(vec!["CLUSTER".into(), "INFO".into()])
    }

    pub fn cluster_slots(&self) -> CommandLine {
        self.client_command(vec!["--no-raw".into(), "CLUSTER".into(), "SLOTS".into()])
    }

    /// An interactive client session against this node, with extra arguments
    /// appended verbatim.
    pub fn cli(&self, extra_args: &[String]) -> CommandLine {
        self.client_command(extra_args.to_vec())
    }

    fn client_command(&self, args: Vec<String>) -> CommandLine {
        let mut full = vec![
            "-c".into(),
            "-h".into(),
            self.conf.listen_host.clone(),
            "-p".into(),
            self.conf.listen_port.to_string(),
        ];
        full.extend(args);
        CommandLine::new(self.binaries.client(), full)
    }

    // ------------------------------------------------------------------
    // Execution helpers
    // ------------------------------------------------------------------

    pub fn run_command(&self, cmd: &CommandLine) -> Result<()> {
        self.runner.run(cmd)
    }

    pub fn capture_command(&self, cmd: &CommandLine) -> Result<String> {
        self.runner.capture(cmd)
    }

    /// Hand the terminal over to `cmd`, replacing the current process image.
    pub fn exec_command(&self, cmd: &CommandLine) -> Result<()> {
        self.runner.exec(cmd)
    }
}
