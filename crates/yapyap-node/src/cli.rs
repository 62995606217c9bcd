//! Command-line configuration surface (§6): everything a front end would
//! otherwise read from the environment, expressed as `clap` flags.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "yapyap-node", about = "Message Router node")]
pub struct Cli {
    /// Directory holding the node's SQLite database.
    #[arg(long, default_value = "./yapyap-data")]
    pub data_dir: PathBuf,

    /// Control-plane port a front end would bind to. Not served here.
    #[arg(long, default_value_t = 3000)]
    pub control_plane_port: u16,

    /// Bootstrap peers, as hex-encoded peer IDs, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub bootstrap_peers: Vec<String>,

    /// Per-origin messages/sec before the rate limiter starts dropping.
    #[arg(long)]
    pub origin_rate_per_sec: Option<u32>,

    /// Per-sender messages/sec before the rate limiter starts dropping.
    #[arg(long)]
    pub sender_rate_per_sec: Option<u32>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
