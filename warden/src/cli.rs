use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};

use crate::config::{Config, DEFAULT_CONFIG_PATH};

#[derive(Debug, Parser)]
#[command(name = "warden", version, about = "Caching DoH resolver with reactive domain blocking")]
pub struct Cli {
    /// Path of the TOML config file. A missing file means defaults.
    #[arg(long, short, env = "WARDEN_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve DNS over HTTPS from the shared cache.
    Server,

    /// Evaluate queued access events and block bad domains.
    Worker {
        /// Process the current backlog and exit.
        #[arg(long)]
        drain: bool,

        /// Number of concurrent consumers.
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Answer plain DNS over UDP by forwarding to a DoH server.
    Stub {
        /// DoH endpoint to forward to.
        #[arg(long)]
        server: Option<String>,

        /// UDP address to listen on.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
}

impl Command {
    /// Fold command line overrides into `config`.
    pub fn apply(&self, config: &mut Config) {
        match self {
            Command::Server => {}
            Command::Worker { workers, .. } => {
                if let Some(workers) = workers {
                    config.worker.workers = *workers;
                }
            }
            Command::Stub { server, listen } => {
                if let Some(server) = server {
                    config.stub.server = server.clone();
                }
                if let Some(listen) = listen {
                    config.stub.listen = *listen;
                }
            }
        }
    }
}
