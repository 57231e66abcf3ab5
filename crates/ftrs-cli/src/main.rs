//! Command-line entrypoints for the fault-tolerant replicated
//! state-machine service: one subcommand per component, plus a `devnet`
//! convenience subcommand that boots a full pipeline in one process.
//!
//! This is peripheral glue, not the core contract (spec §1): it only
//! constructs components and invokes their `start`/`stop` lifecycle.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ftrs")]
#[command(author, version, about = "Fault-tolerant replicated state-machine service", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a replica (client/LFD/peer acceptor, active or passive replication).
    Server {
        /// This replica's stable identifier.
        #[arg(long)]
        id: String,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to.
        #[arg(long, default_value_t = 5000)]
        port: u16,

        /// Peer `host:port`, repeatable. Ignored when `--topology` is given.
        #[arg(long = "peer")]
        peers: Vec<String>,

        /// Run in passive mode (election + checkpointed backups) instead of active.
        #[arg(long, conflicts_with = "active")]
        passive: bool,

        /// Run in active mode (default).
        #[arg(long)]
        active: bool,

        /// Checkpoint / election-backoff interval base, in seconds.
        #[arg(long, default_value_t = 5)]
        interval: u64,

        /// Load bind address and peers from a topology TOML file instead of flags.
        #[arg(long)]
        topology: Option<PathBuf>,
    },

    /// Run a client fanning requests out to a fixed set of replicas.
    Client {
        /// This client's stable identifier.
        #[arg(long)]
        id: String,

        /// Replica `host:port`, repeatable; at least one required.
        #[arg(long = "replica", required = true)]
        replicas: Vec<String>,

        /// Seconds between request rounds.
        #[arg(long, default_value_t = 1)]
        interval: u64,

        /// Number of requests to send before stopping. Unbounded if omitted.
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Run a Local Fault Detector watching one replica and reporting to a GFD.
    Lfd {
        /// This LFD's stable identifier.
        #[arg(long)]
        id: String,

        /// The replica's `host:port`.
        #[arg(long)]
        replica: String,

        /// The GFD's `host:port`. Mandatory: startup fails if unreachable.
        #[arg(long)]
        gfd: String,

        /// Seconds between heartbeats.
        #[arg(long, default_value_t = 1)]
        interval: u64,
    },

    /// Run a Global Fault Detector aggregating LFD reports for one RM.
    Gfd {
        /// This GFD's stable identifier.
        #[arg(long)]
        id: String,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to.
        #[arg(long, default_value_t = 6000)]
        port: u16,

        /// The RM's `host:port`.
        #[arg(long)]
        rm: String,
    },

    /// Run a Replication Manager aggregating GFD reports fleet-wide.
    Rm {
        /// This RM's stable identifier.
        #[arg(long)]
        id: String,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to.
        #[arg(long, default_value_t = 7000)]
        port: u16,
    },

    /// Boot a full RM/GFD/replicas/LFDs/client pipeline in one process, for local smoke-testing.
    Devnet {
        /// Host every component binds to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// First port used; subsequent components claim the following ports.
        #[arg(long, default_value_t = 8000)]
        base_port: u16,

        /// Number of replicas to boot.
        #[arg(long, default_value_t = 3)]
        replicas: usize,

        /// Run replicas in passive mode (default is active).
        #[arg(long)]
        passive: bool,

        /// Seconds between heartbeats, checkpoints, and client request rounds.
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            id,
            host,
            port,
            peers,
            passive,
            active: _,
            interval,
            topology,
        } => commands::server::run(id, host, port, peers, passive, interval, topology).await,
        Commands::Client {
            id,
            replicas,
            interval,
            limit,
        } => commands::client::run(id, replicas, interval, limit).await,
        Commands::Lfd {
            id,
            replica,
            gfd,
            interval,
        } => commands::lfd::run(id, replica, gfd, interval).await,
        Commands::Gfd { id, host, port, rm } => commands::gfd::run(id, host, port, rm).await,
        Commands::Rm { id, host, port } => commands::rm::run(id, host, port).await,
        Commands::Devnet {
            host,
            base_port,
            replicas,
            passive,
            interval,
        } => commands::devnet::run(host, base_port, replicas, passive, interval).await,
    }
}
