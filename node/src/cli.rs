//! # CLI Interface
//!
//! Command-line arguments for `murmur-node` using `clap` derive. The flag
//! spelling (`--UIPort`, `--gossipAddr`, ...) is part of the node's external
//! contract with the UI and the test harnesses, so it stays camel-cased
//! even though that is not the house style for flags.

use clap::Parser;

use murmur_protocol::config::{DEFAULT_GOSSIP_ADDR, DEFAULT_UI_PORT};

/// Murmur gossip node.
///
/// Binds one UDP socket for gossip, serves the HTTP controller for the UI,
/// and disseminates messages by rumor mongering with periodic anti-entropy.
#[derive(Parser, Debug)]
#[command(name = "murmur-node", about = "Murmur gossip node", version)]
pub struct MurmurNodeCli {
    /// Port the HTTP controller (UI backend) listens on.
    #[arg(long = "UIPort", env = "MURMUR_UI_PORT", default_value_t = DEFAULT_UI_PORT)]
    pub ui_port: u16,

    /// Address the gossip UDP socket binds to.
    #[arg(long = "gossipAddr", env = "MURMUR_GOSSIP_ADDR", default_value = DEFAULT_GOSSIP_ADDR)]
    pub gossip_addr: String,

    /// Identifier this node signs its rumors with.
    #[arg(long = "name", env = "MURMUR_NAME")]
    pub name: String,

    /// Comma-separated list of bootstrap peer addresses.
    #[arg(long = "peers", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Anti-entropy period in seconds. Must be positive.
    #[arg(long = "antiEntropy", default_value_t = 10)]
    pub anti_entropy: u64,

    /// Route-rumor period in seconds. 0 disables route rumors.
    #[arg(long = "rtimer", default_value_t = 0)]
    pub rtimer: u64,

    /// Use legacy broadcast (simple) mode for outgoing messages instead of
    /// rumor mongering.
    #[arg(long = "broadcast")]
    pub broadcast: bool,

    /// Log output format: "pretty" or "json".
    #[arg(long = "log-format", env = "MURMUR_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        MurmurNodeCli::command().debug_assert();
    }

    #[test]
    fn peers_flag_splits_on_commas() {
        let cli = MurmurNodeCli::parse_from([
            "murmur-node",
            "--name",
            "alice",
            "--peers",
            "127.0.0.1:5001,127.0.0.1:5002",
        ]);

        assert_eq!(cli.peers, vec!["127.0.0.1:5001", "127.0.0.1:5002"]);
        assert_eq!(cli.ui_port, DEFAULT_UI_PORT);
        assert!(!cli.broadcast);
    }
}
