//! rcm, the Redis cluster manager command line.
//!
//! # Usage
//!
//! ```text
//! rcm create --nodes 6 --start-port 7001 my-cluster
//! rcm start my-cluster
//! rcm distribute-slots --replicas 1 my-cluster
//! rcm ps my-cluster
//! rcm damage --nodes 50% my-cluster
//! rcm remove my-cluster
//! ```
//!
//! The binary is a thin shell around `rcm-core`: it parses arguments, builds
//! the controller, and maps errors to exit codes. The cluster registry lives
//! in `$RCM_HOME`, defaulting to `~/.rcm`.

mod console;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use rcm_core::binaries::Binaries;
use rcm_core::cluster_set::ClusterSet;
use rcm_core::controller::{Controller, CreateProperties};
use rcm_core::infrastructure::runner::SystemRunner;
use rcm_core::infrastructure::ProcessRunner;

use console::ConsoleView;

#[derive(Parser)]
#[command(name = "rcm", version, about = "Redis cluster manager")]
struct Args {
    /// Assume "yes" for every confirmation prompt
    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new cluster
    Create {
        /// Host to bind the node listeners to
        #[arg(short, long, default_value = "127.0.0.1")]
        listen: String,

        /// Number of nodes to create
        #[arg(short, long, default_value_t = 6)]
        nodes: usize,

        /// Enable appendonly persistence
        #[arg(short = 's', long)]
        persistence: bool,

        /// Port of the first node
        #[arg(short = 'p', long, default_value_t = 10001)]
        start_port: u16,

        name: String,
    },

    /// Remove an existing cluster
    #[command(alias = "rm")]
    Remove { name: String },

    /// Start every node of the cluster
    Start { name: String },

    /// Stop every node of the cluster
    Stop { name: String },

    /// Compute and apply the slot distribution
    DistributeSlots {
        /// Number of data replicas per master
        #[arg(short, long, default_value_t = 1)]
        replicas: usize,

        name: String,
    },

    /// List registered clusters
    List {
        /// Display only the cluster names
        #[arg(short, long)]
        short: bool,
    },

    /// Show per-node process state
    Ps {
        /// Display only the PIDs
        #[arg(short, long)]
        short: bool,

        name: String,
    },

    /// Start or stop random nodes until the target liveness is reached
    Damage {
        /// Desired up-node count, absolute or a percentage (e.g. 50%)
        #[arg(short, long)]
        nodes: String,

        name: String,
    },

    /// Run CLUSTER INFO against a random up node
    Info { name: String },

    /// Run CLUSTER NODES against a random up node
    Nodes { name: String },

    /// Run CLUSTER SLOTS against a random up node
    Slots { name: String },

    /// Open an interactive client session against a random up node
    Cli {
        name: String,

        /// Extra arguments passed to the client verbatim
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        console::failure(&e);
        process::exit(1);
    }
}

fn run(args: Args) -> rcm_core::Result<()> {
    let binaries = Arc::new(Binaries::resolve()?);
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner::default());
    let cluster_set = ClusterSet::new(registry_dir(), binaries, runner)?;

    let view = ConsoleView::new(args.yes);
    let mut controller = Controller::new(view, cluster_set);

    match args.command {
        Command::Create {
            listen,
            nodes,
            persistence,
            start_port,
            name,
        } => controller.create(
            &name,
            &CreateProperties {
                nodes_count: nodes,
                listen_host: listen,
                start_port,
                persistence,
            },
        ),
        Command::Remove { name } => controller.remove(&name),
        Command::Start { name } => controller.start(&name),
        Command::Stop { name } => controller.stop(&name),
        Command::DistributeSlots { replicas, name } => {
            controller.distribute_slots(&name, replicas)
        }
        Command::List { short } => controller.list(short),
        Command::Ps { short, name } => controller.ps(&name, short),
        Command::Damage { nodes, name } => controller.damage(&name, &nodes),
        Command::Info { name } => controller.info(&name),
        Command::Nodes { name } => controller.nodes(&name),
        Command::Slots { name } => controller.slots(&name),
        Command::Cli { name, args } => controller.cli(&name, &args),
    }
}

fn registry_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RCM_HOME") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".rcm")
}
