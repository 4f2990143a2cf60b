//! Cluster topology: an ordered, fixed-size set of nodes.
//!
//! Owns the liveness classification of its members, uniform sampling within a
//! liveness class, the slot partitioning algorithm and the ordered bootstrap
//! protocol that turns isolated server processes into one gossiping cluster.

use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use crate::binaries::Binaries;
use crate::config::ClusterConf;
use crate::error::{RcmError, Result};
use crate::infrastructure::ProcessRunner;
use crate::node::{Node, NodeAddress};

/// Number of fixed partitions of the key space.
pub const SLOT_COUNT: usize = 16384;

/// A slot range plus the master and replica set that owns it.
///
/// Ranges are half-open; across one distribution they are contiguous,
/// non-overlapping and cover exactly `[0, SLOT_COUNT)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub master: NodeAddress,
    pub replicas: Vec<NodeAddress>,
    pub from_slot: usize,
    pub to_slot: usize,
    master_index: usize,
    replica_indices: Vec<usize>,
}

/// Liveness snapshot, recomputed on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterStats {
    pub nodes_total: usize,
    pub nodes_up: usize,
}

/// An ordered collection of nodes established at creation time. The node
/// count is immutable; the first node doubles as the bootstrap contact point.
pub struct Cluster {
    nodes: Vec<Node>,
}

impl Cluster {
    pub fn new(
        cluster_dir: &Path,
        conf: &ClusterConf,
        binaries: Arc<Binaries>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let nodes = conf
            .ports
            .iter()
            .map(|&port| Node::new(cluster_dir, port, conf, binaries.clone(), runner.clone()))
            .collect();

        Cluster { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Materialize every member node on disk. The first failure aborts;
    /// already-created nodes are not rolled back.
    pub fn create_nodes(&self) -> Result<()> {
        for node in &self.nodes {
            node.create()?;
        }
        Ok(())
    }

    /// Start every member. Applies the operation to all nodes and returns
    /// only the last failure (coarse aggregate policy, see DESIGN.md).
    pub fn start(&self) -> Result<()> {
        self.for_each_node(Node::start)
    }

    /// Stop every member. Same aggregate error policy as `start`.
    pub fn stop(&self) -> Result<()> {
        self.for_each_node(Node::stop)
    }

    /// Force-kill every member. Same aggregate error policy as `start`.
    pub fn kill(&self) -> Result<()> {
        self.for_each_node(Node::kill)
    }

    fn for_each_node(&self, op: impl Fn(&Node) -> Result<()>) -> Result<()> {
        let mut last = Ok(());
        for node in &self.nodes {
            if let Err(e) = op(node) {
                last = Err(e);
            }
        }
        last
    }

    /// Count total and up nodes. Aborts on the first liveness query failure.
    pub fn stats(&self) -> Result<ClusterStats> {
        let mut nodes_up = 0;
        for node in &self.nodes {
            if node.is_up()? {
                nodes_up += 1;
            }
        }

        Ok(ClusterStats {
            nodes_total: self.nodes.len(),
            nodes_up,
        })
    }

    /// All member nodes partitioned by liveness: up nodes first, down nodes
    /// last (stable partition), plus the count of up nodes.
    pub fn nodes_by_state(&self) -> Result<(Vec<&Node>, usize)> {
        let mut up = Vec::new();
        let mut down = Vec::new();

        for node in &self.nodes {
            if node.is_up()? {
                up.push(node);
            } else {
                down.push(node);
            }
        }

        let split_index = up.len();
        up.extend(down);
        Ok((up, split_index))
    }

    /// Uniformly sample one node from the requested liveness class.
    pub fn random_node(&self, want_up: bool, rng: &mut impl Rng) -> Result<&Node> {
        let (nodes, split_index) = self.nodes_by_state()?;

        let pool = if want_up {
            &nodes[..split_index]
        } else {
            &nodes[split_index..]
        };

        if pool.is_empty() {
            return Err(RcmError::ClusterIsDown);
        }

        Ok(pool[rng.gen_range(0..pool.len())])
    }

    /// Partition the key space across the member nodes.
    ///
    /// One replication unit is a master plus `replicas` replicas; the unit
    /// size must be smaller than the node count. Surplus nodes beyond full
    /// units become extra replicas, assigned round-robin, which can leave
    /// shards with unequal replica counts. The last shard absorbs the slot
    /// division remainder.
    ///
    /// Pure: touches no node, issues no command.
    pub fn prepare_slot_distribution(&self, replicas: usize) -> Result<Vec<Shard>> {
        let unit_size = replicas + 1;
        let node_count = self.nodes.len();

        if unit_size >= node_count {
            return Err(RcmError::IllegalReplicaCount { node_count });
        }

        let master_count = node_count / unit_size;
        let slots_per_shard = SLOT_COUNT / master_count;

        let mut shards: Vec<Shard> = self.nodes[..master_count]
            .iter()
            .enumerate()
            .map(|(i, node)| Shard {
                master: node.address().clone(),
                replicas: Vec::new(),
                from_slot: i * slots_per_shard,
                to_slot: (i + 1) * slots_per_shard,
                master_index: i,
                replica_indices: Vec::new(),
            })
            .collect();

        // The division remainder goes to the last shard.
        shards[master_count - 1].to_slot = SLOT_COUNT;

        for (j, node) in self.nodes[master_count..].iter().enumerate() {
            let shard = &mut shards[j % master_count];
            shard.replicas.push(node.address().clone());
            shard.replica_indices.push(master_count + j);
        }

        Ok(shards)
    }

    /// Execute the bootstrap protocol against live nodes.
    ///
    /// Strictly ordered: the first shard's master meets every other master
    /// (seeding one gossip mesh), then per shard the master claims its slot
    /// range, its identity is fetched, and each replica is met and told to
    /// replicate it. The first failing step aborts; a partially bootstrapped
    /// topology is left as-is for the operator.
    pub fn apply_slot_distribution(&self, shards: &[Shard]) -> Result<()> {
        let Some(first_shard) = shards.first() else {
            return Ok(());
        };

        let contact = &self.nodes[first_shard.master_index];
        for shard in &shards[1..] {
            log::info!("meet {} -> {}", contact.address(), shard.master);
            contact.run_command(&contact.cluster_meet(&shard.master))?;
        }

        for shard in shards {
            let master = &self.nodes[shard.master_index];

            log::info!(
                "addslots {}-{} on {}",
                shard.from_slot,
                shard.to_slot - 1,
                master.address()
            );
            master.run_command(&master.cluster_add_slots(shard.from_slot, shard.to_slot))?;

            let master_id = master.id()?;

            for &replica_index in &shard.replica_indices {
                let replica = &self.nodes[replica_index];
                log::info!("replicate {} -> {}", replica.address(), master.address());
                master.run_command(&master.cluster_meet(replica.address()))?;
                replica.run_command(&replica.cluster_replicate(&master_id))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockRunner;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use std::path::Path;

    fn conf(ports: Vec<u16>) -> ClusterConf {
        ClusterConf {
            listen_host: "127.0.0.1".into(),
            ports,
            persistence: false,
        }
    }

    fn cluster_with_runner(dir: &Path, ports: Vec<u16>, runner: Arc<MockRunner>) -> Cluster {
        let binaries = Arc::new(Binaries::with_paths(
            "/opt/redis/redis-server",
            "/opt/redis/redis-cli",
            "/bin/kill",
        ));
        Cluster::new(dir, &conf(ports), binaries, runner)
    }

    fn cluster(dir: &Path, ports: Vec<u16>) -> Cluster {
        cluster_with_runner(dir, ports, Arc::new(MockRunner::new()))
    }

    fn mark_up(dir: &Path, port: u16, pid: i32) {
        let run_dir = dir.join(port.to_string()).join("var").join("run");
        fs::create_dir_all(&run_dir).unwrap();
        fs::write(run_dir.join("redis.pid"), pid.to_string()).unwrap();
    }

    #[test]
    fn nodes_follow_port_order() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), vec![7003, 7001, 7002]);

        let ports: Vec<u16> = cluster.nodes().iter().map(|n| n.address().port).collect();
        assert_eq!(ports, vec![7003, 7001, 7002]);
    }

    #[test]
    fn six_nodes_one_replica_gives_three_shards() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), (7001..=7006).collect());

        let shards = cluster.prepare_slot_distribution(1).unwrap();
        assert_eq!(shards.len(), 3);

        let bounds: Vec<(usize, usize)> =
            shards.iter().map(|s| (s.from_slot, s.to_slot)).collect();
        assert_eq!(bounds, vec![(0, 5461), (5461, 10922), (10922, 16384)]);

        // One replica each, assigned round-robin after the masters.
        for (i, shard) in shards.iter().enumerate() {
            assert_eq!(shard.master.port, 7001 + i as u16);
            assert_eq!(shard.replicas.len(), 1);
            assert_eq!(shard.replicas[0].port, 7004 + i as u16);
        }
    }

    #[test]
    fn six_nodes_no_replicas_gives_six_shards_with_remainder_in_last() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), (7001..=7006).collect());

        let shards = cluster.prepare_slot_distribution(0).unwrap();
        assert_eq!(shards.len(), 6);

        for shard in &shards[..5] {
            assert_eq!(shard.to_slot - shard.from_slot, 2730);
            assert!(shard.replicas.is_empty());
        }
        assert_eq!(shards[5].from_slot, 13650);
        assert_eq!(shards[5].to_slot, SLOT_COUNT);
    }

    #[test]
    fn uneven_replica_assignment_is_accepted() {
        // 7 nodes, 1 replica: 3 masters, 4 spare nodes round-robin, so the
        // first shard ends up with two replicas.
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), (7001..=7007).collect());

        let shards = cluster.prepare_slot_distribution(1).unwrap();
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0].replicas.len(), 2);
        assert_eq!(shards[1].replicas.len(), 1);
        assert_eq!(shards[2].replicas.len(), 1);
    }

    #[test]
    fn slot_ranges_cover_the_key_space_exactly() {
        let dir = tempfile::tempdir().unwrap();

        for (node_count, replicas) in [(2usize, 0usize), (4, 1), (6, 1), (6, 2), (9, 2), (12, 3)] {
            let ports: Vec<u16> = (0..node_count as u16).map(|i| 7001 + i).collect();
            let cluster = cluster(dir.path(), ports);
            let shards = cluster.prepare_slot_distribution(replicas).unwrap();

            let mut expected_from = 0;
            for shard in &shards {
                assert_eq!(shard.from_slot, expected_from);
                assert!(shard.to_slot > shard.from_slot);
                expected_from = shard.to_slot;
            }
            assert_eq!(expected_from, SLOT_COUNT);
        }
    }

    #[test]
    fn replica_unit_must_be_smaller_than_node_count() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), (7001..=7006).collect());

        assert!(matches!(
            cluster.prepare_slot_distribution(5),
            Err(RcmError::IllegalReplicaCount { node_count: 6 })
        ));
        assert!(matches!(
            cluster.prepare_slot_distribution(6),
            Err(RcmError::IllegalReplicaCount { .. })
        ));
    }

    #[test]
    fn stats_count_up_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), vec![7001, 7002, 7003]);
        mark_up(dir.path(), 7002, 100);

        let stats = cluster.stats().unwrap();
        assert_eq!(stats.nodes_total, 3);
        assert_eq!(stats.nodes_up, 1);
    }

    #[test]
    fn nodes_by_state_puts_up_nodes_first() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), (7001..=7005).collect());
        mark_up(dir.path(), 7002, 100);
        mark_up(dir.path(), 7004, 101);

        let (nodes, split_index) = cluster.nodes_by_state().unwrap();
        assert_eq!(split_index, 2);

        let up_ports: Vec<u16> = nodes[..split_index].iter().map(|n| n.address().port).collect();
        let down_ports: Vec<u16> = nodes[split_index..].iter().map(|n| n.address().port).collect();
        assert_eq!(up_ports, vec![7002, 7004]);
        assert_eq!(down_ports, vec![7001, 7003, 7005]);
    }

    #[test]
    fn random_node_requires_a_member_of_the_class() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), vec![7001, 7002]);
        let mut rng = StdRng::seed_from_u64(7);

        assert!(matches!(
            cluster.random_node(true, &mut rng),
            Err(RcmError::ClusterIsDown)
        ));

        mark_up(dir.path(), 7001, 100);
        mark_up(dir.path(), 7002, 101);
        assert!(matches!(
            cluster.random_node(false, &mut rng),
            Err(RcmError::ClusterIsDown)
        ));
    }

    #[test]
    fn random_node_samples_the_requested_class() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), (7001..=7004).collect());
        mark_up(dir.path(), 7002, 100);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let node = cluster.random_node(true, &mut rng).unwrap();
            assert_eq!(node.address().port, 7002);

            let node = cluster.random_node(false, &mut rng).unwrap();
            assert_ne!(node.address().port, 7002);
        }
    }

    #[test]
    fn stop_on_all_down_cluster_returns_last_no_pid_error() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = cluster(dir.path(), vec![7001, 7002]);

        assert!(matches!(cluster.stop(), Err(RcmError::NoPid { .. })));
    }

    #[test]
    fn stop_signals_every_up_node_despite_down_members() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new());
        let cluster = cluster_with_runner(dir.path(), vec![7001, 7002, 7003], runner.clone());
        mark_up(dir.path(), 7001, 100);
        mark_up(dir.path(), 7003, 101);

        // 7002 has no pid file, so the aggregate result is its NoPid error,
        // but both live nodes still got the signal.
        assert!(matches!(cluster.stop(), Err(RcmError::NoPid { .. })));
        assert_eq!(runner.executed_commands().len(), 2);
    }

    fn nodes_output(id: &str, port: u16) -> String {
        format!("{} 127.0.0.1:{} myself,master - 0 0 1 connected\n", id, port)
    }

    #[test]
    fn bootstrap_issues_ordered_protocol() {
        let dir = tempfile::tempdir().unwrap();

        let id_a = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        let id_b = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

        // Call order: 1 master-mesh meet, then per shard: addslots, id fetch,
        // replica meet, replicate.
        let runner = Arc::new(MockRunner::with_responses(vec![
            Ok(String::new()),            // meet 7001 -> 7002
            Ok(String::new()),            // addslots shard 0
            Ok(nodes_output(id_a, 7001)), // id of 7001
            Ok(String::new()),            // meet 7001 -> 7003
            Ok(String::new()),            // replicate on 7003
            Ok(String::new()),            // addslots shard 1
            Ok(nodes_output(id_b, 7002)), // id of 7002
            Ok(String::new()),            // meet 7002 -> 7004
            Ok(String::new()),            // replicate on 7004
        ]));
        let cluster = cluster_with_runner(dir.path(), (7001..=7004).collect(), runner.clone());

        let shards = cluster.prepare_slot_distribution(1).unwrap();
        assert_eq!(shards.len(), 2);

        cluster.apply_slot_distribution(&shards).unwrap();

        let commands = runner.executed_commands();
        assert_eq!(commands.len(), 9);

        // Gossip mesh seeded from the first master.
        assert_eq!(
            &commands[0].args[5..],
            &["CLUSTER", "MEET", "127.0.0.1", "7002"]
        );

        // Shard 0: master 7001 claims [0, 8192).
        assert_eq!(commands[1].args[4], "7001");
        assert_eq!(&commands[1].args[5..7], &["CLUSTER", "ADDSLOTS"]);
        assert_eq!(commands[1].args.len(), 7 + 8192);
        assert_eq!(commands[1].args[7], "0");
        assert_eq!(commands[1].args[commands[1].args.len() - 1], "8191");

        // Shard 0 replica 7003 replicates master 7001's identity.
        assert_eq!(&commands[3].args[5..], &["CLUSTER", "MEET", "127.0.0.1", "7003"]);
        assert_eq!(commands[4].args[4], "7003");
        assert_eq!(&commands[4].args[5..], &["CLUSTER", "REPLICATE", id_a]);

        // Shard 1: master 7002 claims [8192, 16384), replica 7004 follows.
        assert_eq!(commands[5].args[4], "7002");
        assert_eq!(commands[5].args[7], "8192");
        assert_eq!(&commands[8].args[5..], &["CLUSTER", "REPLICATE", id_b]);
    }

    #[test]
    fn bootstrap_aborts_on_first_failing_step() {
        let dir = tempfile::tempdir().unwrap();

        let runner = Arc::new(MockRunner::with_responses(vec![
            Ok(String::new()),        // meet 7001 -> 7002
            Err("connection refused".into()), // addslots shard 0 fails
        ]));
        let cluster = cluster_with_runner(dir.path(), (7001..=7004).collect(), runner.clone());

        let shards = cluster.prepare_slot_distribution(1).unwrap();
        assert!(matches!(
            cluster.apply_slot_distribution(&shards),
            Err(RcmError::ExternalCommandFailed { .. })
        ));

        // Nothing past the failing step was attempted.
        assert_eq!(runner.executed_commands().len(), 2);
    }
}
