//! Command-line flags, layered over [`strangedb_core::NodeConfig`]'s
//! reference defaults. Anything left unset on the command line falls back
//! to the corresponding `STRANGEDB_*` environment variable, then the
//! default.

use clap::Parser;
use strangedb_core::NodeConfig;

#[derive(Debug, Parser)]
#[command(name = "strangedb-server", about = "StrangeDB cluster node")]
pub struct Cli {
    #[arg(long, env = "STRANGEDB_NODE_ID")]
    node_id: Option<String>,

    #[arg(long, env = "STRANGEDB_NODE_URL")]
    node_url: Option<String>,

    #[arg(long, env = "STRANGEDB_HTTP_ADDR")]
    http_addr: Option<String>,

    #[arg(long, env = "STRANGEDB_GRPC_ADDR")]
    grpc_addr: Option<String>,

    #[arg(long, env = "STRANGEDB_DATA_DIR")]
    data_dir: Option<String>,

    #[arg(long, env = "STRANGEDB_SEEDS", value_delimiter = ',')]
    seeds: Vec<String>,

    #[arg(long, env = "STRANGEDB_REPLICATION_N")]
    replication_n: Option<usize>,

    #[arg(long, env = "STRANGEDB_READ_QUORUM")]
    read_quorum: Option<usize>,

    #[arg(long, env = "STRANGEDB_WRITE_QUORUM")]
    write_quorum: Option<usize>,

    #[arg(long, env = "STRANGEDB_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Merges set flags over [`NodeConfig::default`].
    pub fn into_config(self) -> NodeConfig {
        let mut config = NodeConfig::default();
        if let Some(v) = self.node_id {
            config.node_id = v;
        }
        if let Some(v) = self.node_url {
            config.node_url = v;
        }
        if let Some(v) = self.http_addr {
            config.http_addr = v;
        }
        if let Some(v) = self.grpc_addr {
            config.grpc_addr = v;
        }
        if let Some(v) = self.data_dir {
            config.data_dir = v;
        }
        if !self.seeds.is_empty() {
            config.seeds = self.seeds;
        }
        if let Some(v) = self.replication_n {
            config.replication_n = v;
        }
        if let Some(v) = self.read_quorum {
            config.read_quorum = v;
        }
        if let Some(v) = self.write_quorum {
            config.write_quorum = v;
        }
        if let Some(v) = self.log_level {
            config.log_level = v;
        }
        config
    }
}
