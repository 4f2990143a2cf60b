//! On-disk registry of named clusters.
//!
//! Each cluster lives in its own directory under the registry base dir, with
//! a `cluster.yml` recipe at its root and one subdirectory per node. Opened
//! clusters are fresh, independent views over that directory; nothing is
//! cached or shared between handles.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::binaries::Binaries;
use crate::cluster::Cluster;
use crate::config::ClusterConf;
use crate::error::{RcmError, Result};
use crate::infrastructure::ProcessRunner;

pub const CLUSTER_CONF_FILE: &str = "cluster.yml";

pub struct ClusterSet {
    base_dir: PathBuf,
    binaries: Arc<Binaries>,
    runner: Arc<dyn ProcessRunner>,
}

impl ClusterSet {
    /// Open the registry, creating its base directory if needed.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        binaries: Arc<Binaries>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;

        Ok(ClusterSet {
            base_dir,
            binaries,
            runner,
        })
    }

    /// Persist the recipe and materialize every node directory. Processes are
    /// not started and slots are not distributed; those are separate steps.
    pub fn create(&self, name: &str, conf: &ClusterConf) -> Result<Cluster> {
        if self.exists(name) {
            return Err(RcmError::ClusterExists(name.into()));
        }

        let cluster_dir = self.cluster_dir(name);
        fs::create_dir_all(&cluster_dir)?;
        conf.save(&self.conf_file(name))?;

        let cluster = Cluster::new(
            &cluster_dir,
            conf,
            self.binaries.clone(),
            self.runner.clone(),
        );
        cluster.create_nodes()?;

        log::info!("created cluster {} with {} nodes", name, conf.ports.len());
        Ok(cluster)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.cluster_dir(name).exists()
    }

    pub fn open(&self, name: &str) -> Result<Cluster> {
        if !self.exists(name) {
            return Err(RcmError::ClusterDoesNotExist(name.into()));
        }

        let conf = ClusterConf::load(&self.conf_file(name))?;
        Ok(Cluster::new(
            &self.cluster_dir(name),
            &conf,
            self.binaries.clone(),
            self.runner.clone(),
        ))
    }

    /// Delete the cluster's whole directory tree. Running processes are not
    /// stopped first.
    pub fn remove(&self, name: &str) -> Result<()> {
        fs::remove_dir_all(self.cluster_dir(name))?;
        log::info!("removed cluster {}", name);
        Ok(())
    }

    /// Names of all registered clusters, in directory order.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        Ok(names)
    }

    fn cluster_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    fn conf_file(&self, name: &str) -> PathBuf {
        self.cluster_dir(name).join(CLUSTER_CONF_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockRunner;
    use std::path::Path;

    fn registry(base: &Path) -> ClusterSet {
        let binaries = Arc::new(Binaries::with_paths(
            "/opt/redis/redis-server",
            "/opt/redis/redis-cli",
            "/bin/kill",
        ));
        ClusterSet::new(base, binaries, Arc::new(MockRunner::new())).unwrap()
    }

    fn sample_conf() -> ClusterConf {
        ClusterConf {
            listen_host: "127.0.0.1".into(),
            ports: vec![7001, 7002],
            persistence: false,
        }
    }

    #[test]
    fn create_persists_recipe_and_node_trees() {
        let dir = tempfile::tempdir().unwrap();
        let set = registry(dir.path());

        set.create("alpha", &sample_conf()).unwrap();

        assert!(set.exists("alpha"));
        assert!(dir.path().join("alpha").join(CLUSTER_CONF_FILE).is_file());
        assert!(dir
            .path()
            .join("alpha")
            .join("7001")
            .join("conf")
            .join("redis.conf")
            .is_file());
    }

    #[test]
    fn open_rebuilds_the_topology_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let set = registry(dir.path());
        set.create("alpha", &sample_conf()).unwrap();

        let cluster = set.open("alpha").unwrap();
        assert_eq!(cluster.node_count(), 2);
        assert_eq!(cluster.nodes()[0].address().port, 7001);
    }

    #[test]
    fn duplicate_create_is_rejected_without_touching_state() {
        let dir = tempfile::tempdir().unwrap();
        let set = registry(dir.path());
        set.create("alpha", &sample_conf()).unwrap();

        let marker = dir.path().join("alpha").join("marker");
        fs::write(&marker, "untouched").unwrap();

        let mut other = sample_conf();
        other.ports = vec![9001];
        assert!(matches!(
            set.create("alpha", &other),
            Err(RcmError::ClusterExists(_))
        ));

        assert_eq!(fs::read_to_string(&marker).unwrap(), "untouched");
        assert_eq!(set.open("alpha").unwrap().node_count(), 2);
    }

    #[test]
    fn open_unknown_cluster_fails() {
        let dir = tempfile::tempdir().unwrap();
        let set = registry(dir.path());

        assert!(matches!(
            set.open("ghost"),
            Err(RcmError::ClusterDoesNotExist(_))
        ));
    }

    #[test]
    fn remove_deletes_the_whole_tree() {
        let dir = tempfile::tempdir().unwrap();
        let set = registry(dir.path());
        set.create("alpha", &sample_conf()).unwrap();

        set.remove("alpha").unwrap();
        assert!(!set.exists("alpha"));
    }

    #[test]
    fn list_names_reports_only_directories() {
        let dir = tempfile::tempdir().unwrap();
        let set = registry(dir.path());
        set.create("beta", &sample_conf()).unwrap();
        set.create("alpha", &sample_conf()).unwrap();
        fs::write(dir.path().join("stray-file"), "").unwrap();

        let mut names = set.list_names().unwrap();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta"]);
    }
}
