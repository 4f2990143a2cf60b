//! The orchestration controller.
//!
//! Validates operator intent, translates it into cluster and node operations,
//! and reports through the injected `View`. A cluster's conceptual state
//! (created, bootstrapped, partially up, ...) is never persisted; it is
//! re-derived on every call from directory existence and per-node liveness.

use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::Regex;

use crate::cluster::Cluster;
use crate::cluster_set::ClusterSet;
use crate::config::ClusterConf;
use crate::damage::{self, DamageAction};
use crate::error::{RcmError, Result};
use crate::infrastructure::CommandLine;
use crate::node::Node;
use crate::view::View;

pub const MIN_NODES_COUNT: usize = 2;
pub const MAX_TCP_PORT: u32 = 65535;
/// Each node also listens on `port + offset` for cluster gossip; the port
/// window must leave room for it.
pub const GOSSIP_PORT_OFFSET: u32 = 10000;
const MAX_NAME_DISPLAY_LEN: usize = 32;

fn cluster_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w+\-.]+$").expect("static pattern"))
}

/// Parameters of a `create` operation.
#[derive(Debug, Clone)]
pub struct CreateProperties {
    pub nodes_count: usize,
    pub listen_host: String,
    pub start_port: u16,
    pub persistence: bool,
}

/// Validates commands, drives the cluster set and reports through the view.
pub struct Controller<V: View> {
    view: V,
    cluster_set: ClusterSet,
    rng: StdRng,
}

impl<V: View> Controller<V> {
    pub fn new(view: V, cluster_set: ClusterSet) -> Self {
        Self::with_rng(view, cluster_set, StdRng::from_entropy())
    }

    /// Construct with an explicit random source, for deterministic tests.
    pub fn with_rng(view: V, cluster_set: ClusterSet, rng: StdRng) -> Self {
        Controller {
            view,
            cluster_set,
            rng,
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Validate and persist a new cluster: recipe plus node directory trees.
    /// Processes are not started and slots are not distributed here.
    pub fn create(&mut self, name: &str, props: &CreateProperties) -> Result<()> {
        if name.is_empty() {
            return Err(RcmError::ClusterNameRequired);
        }

        if !cluster_name_pattern().is_match(name) {
            return Err(RcmError::IllegalClusterName);
        }

        if self.cluster_set.exists(name) {
            return Err(RcmError::ClusterExists(name.into()));
        }

        if props.nodes_count < MIN_NODES_COUNT {
            return Err(RcmError::TooFewNodes {
                min: MIN_NODES_COUNT,
            });
        }

        // The whole window [start, start + nodes) plus the gossip offset must
        // fit under the TCP port ceiling.
        let max_start =
            MAX_TCP_PORT as i64 - GOSSIP_PORT_OFFSET as i64 - (props.nodes_count as i64 - 1);
        if props.start_port < 1 || props.start_port as i64 > max_start {
            return Err(RcmError::PortOutOfRange {
                max: max_start.clamp(0, u16::MAX as i64) as u16,
            });
        }

        let ports: Vec<u16> = (0..props.nodes_count as u16)
            .map(|i| props.start_port + i)
            .collect();

        let prompt = format!(
            "Create cluster {} with {} nodes listening on {}:{:?}?",
            name, props.nodes_count, props.listen_host, ports
        );

        if !self.view.ask(&prompt) {
            self.view.aborted();
            return Ok(());
        }

        self.view.echo(&format!("Creating cluster {}...", name));

        self.cluster_set.create(
            name,
            &ClusterConf {
                listen_host: props.listen_host.clone(),
                ports,
                persistence: props.persistence,
            },
        )?;

        self.view.success(
            "Cluster nodes created. To complete cluster creation, \
             run the 'start' and 'distribute-slots' operations",
        );
        Ok(())
    }

    /// Delete the cluster's directory tree after confirmation. Running
    /// processes are not stopped first; stop the cluster before removing it.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(RcmError::ClusterNameRequired);
        }

        if !self.cluster_set.exists(name) {
            return Err(RcmError::ClusterDoesNotExist(name.into()));
        }

        let prompt = format!("Do you really want to remove cluster {}?", name);
        if !self.view.ask(&prompt) {
            self.view.aborted();
            return Ok(());
        }

        self.view.echo(&format!("Removing cluster {}...", name));
        self.cluster_set.remove(name)?;
        self.view
            .success(&format!("Cluster {} has been removed", name));
        Ok(())
    }

    pub fn start(&mut self, name: &str) -> Result<()> {
        self.open_cluster(name)?.start()
    }

    pub fn stop(&mut self, name: &str) -> Result<()> {
        self.open_cluster(name)?.stop()
    }

    /// Compute the shard plan, display it, and apply it after confirmation.
    /// A failing bootstrap step aborts and is propagated; the partially
    /// applied topology is left for inspection.
    pub fn distribute_slots(&mut self, name: &str, replicas: usize) -> Result<()> {
        let cluster = self.open_cluster(name)?;

        if replicas < 1 || replicas >= cluster.node_count() {
            return Err(RcmError::IllegalReplicaCount {
                node_count: cluster.node_count(),
            });
        }

        let shards = cluster.prepare_slot_distribution(replicas)?;

        for shard in &shards {
            let slot_range = format!("{}-{}", shard.from_slot, shard.to_slot - 1);
            let replicas: Vec<String> = shard.replicas.iter().map(|r| r.to_string()).collect();
            self.view.echo(&format!(
                "{:<11} {:>20} {}",
                slot_range,
                shard.master.to_string(),
                replicas.join(" ")
            ));
        }

        if !self.view.ask("Do you want to proceed?") {
            self.view.aborted();
            return Ok(());
        }

        cluster.apply_slot_distribution(&shards)?;
        self.view
            .success(&format!("Slots distributed across {} shards", shards.len()));
        Ok(())
    }

    /// List registered clusters, sorted by name. Per-cluster failures are
    /// reported inline and never abort the rest of the listing.
    pub fn list(&mut self, short: bool) -> Result<()> {
        let mut names = self.cluster_set.list_names()?;
        names.sort();

        for name in names {
            if short {
                self.view.echo(&name);
                continue;
            }

            let cluster = match self.cluster_set.open(&name) {
                Ok(cluster) => cluster,
                Err(_) => {
                    self.view
                        .echo(&format!("{:<40} ERROR can't open cluster", name));
                    continue;
                }
            };

            let stats = match cluster.stats() {
                Ok(stats) => stats,
                Err(_) => {
                    self.view
                        .echo(&format!("{:<40} ERROR can't fetch cluster stats", name));
                    continue;
                }
            };

            let ratio = format!("({}/{})", stats.nodes_up, stats.nodes_total);
            let status = if stats.nodes_up == 0 {
                format!("DOWN{}", ratio)
            } else if stats.nodes_up < stats.nodes_total {
                format!("PARTIALLY UP{}", ratio)
            } else {
                format!("UP{}", ratio)
            };

            self.view.echo(&format!(
                "{:<40} {}",
                shorter(&name, MAX_NAME_DISPLAY_LEN),
                status
            ));
        }

        Ok(())
    }

    /// Report each node's PID and state. A node whose PID cannot be read is
    /// reported as `-1`/`ERROR`; the loop never aborts.
    pub fn ps(&mut self, name: &str, short: bool) -> Result<()> {
        let cluster = self.open_cluster(name)?;

        for node in cluster.nodes() {
            let pid_result = node.pid();
            let pid = match &pid_result {
                Ok(Some(pid)) => *pid,
                Ok(None) | Err(_) => -1,
            };

            if short {
                self.view.echo(&pid.to_string());
                continue;
            }

            let state = match pid_result {
                Err(_) => "ERROR",
                Ok(Some(pid)) if pid > 0 => "UP",
                Ok(_) => "DOWN",
            };

            self.view.echo(&format!(
                "{:<5} {:<20} {}",
                pid,
                node.address().to_string(),
                state
            ));
        }

        Ok(())
    }

    /// Drive the cluster toward the requested liveness target by stopping or
    /// starting randomly selected nodes.
    pub fn damage(&mut self, name: &str, target: &str) -> Result<()> {
        let cluster = self.open_cluster(name)?;
        let desired_up = damage::desired_up_count(cluster.node_count(), target)?;

        let (nodes, up_count) = cluster.nodes_by_state()?;

        let Some(plan) = damage::plan(up_count, nodes.len(), desired_up, &mut self.rng) else {
            self.view
                .echo("Nothing to do, cluster is already in the requested state");
            return Ok(());
        };

        let verb = match plan.action {
            DamageAction::Start => "start",
            DamageAction::Stop => "stop",
        };

        if !self
            .view
            .ask(&format!("Will {} {} nodes. Proceed?", verb, plan.indices.len()))
        {
            self.view.aborted();
            return Ok(());
        }

        for &index in &plan.indices {
            match plan.action {
                DamageAction::Start => nodes[index].start()?,
                DamageAction::Stop => nodes[index].stop()?,
            }
        }

        self.view
            .success(&format!("Affected {} nodes", plan.indices.len()));
        Ok(())
    }

    /// Relay `CLUSTER INFO` from one random up node.
    pub fn info(&mut self, name: &str) -> Result<()> {
        self.relay(name, Node::cluster_info)
    }

    /// Relay `CLUSTER NODES` from one random up node.
    pub fn nodes(&mut self, name: &str) -> Result<()> {
        self.relay(name, Node::cluster_nodes)
    }

    /// Relay `CLUSTER SLOTS` from one random up node.
    pub fn slots(&mut self, name: &str) -> Result<()> {
        self.relay(name, Node::cluster_slots)
    }

    /// Hand the terminal over to an interactive client session against one
    /// random up node. Returns only on failure.
    pub fn cli(&mut self, name: &str, extra_args: &[String]) -> Result<()> {
        let cluster = self.open_cluster(name)?;
        let node = cluster.random_node(true, &mut self.rng)?;
        node.exec_command(&node.cli(extra_args))
    }

    fn relay(&mut self, name: &str, command: impl Fn(&Node) -> CommandLine) -> Result<()> {
        let cluster = self.open_cluster(name)?;
        let node = cluster.random_node(true, &mut self.rng)?;
        let output = node.capture_command(&command(node))?;
        self.view.echo(output.trim_end());
        Ok(())
    }

    fn open_cluster(&self, name: &str) -> Result<Cluster> {
        if name.is_empty() {
            return Err(RcmError::ClusterNameRequired);
        }

        if !self.cluster_set.exists(name) {
            return Err(RcmError::ClusterDoesNotExist(name.into()));
        }

        self.cluster_set.open(name)
    }
}

/// Shorten a name to at most `max_len` display columns, ellipsis included.
fn shorter(name: &str, max_len: usize) -> String {
    let budget = max_len.saturating_sub(3);

    if name.chars().count() < budget {
        name.to_string()
    } else {
        let truncated: String = name.chars().take(budget).collect();
        truncated + "..."
    }
}
