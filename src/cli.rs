//! CLI definitions for zscan.

use std::path::PathBuf;

use clap::Parser;

/// Single-host, high-rate Internet-scale stateless TCP SYN scanner.
#[derive(Parser, Debug, Clone)]
#[command(name = "zscan", version, about)]
pub struct Cli {
    /// Target CIDR ranges or bare IPv4 addresses, space separated.
    pub targets: Vec<String>,

    /// Optional TOML file with any of these same fields; CLI flags win on
    /// conflict.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Newline-delimited CIDR blacklist, `#`-comments allowed.
    #[arg(long)]
    pub blacklist_file: Option<PathBuf>,

    /// Port to probe on every target.
    #[arg(short = 'p', long)]
    pub target_port: Option<u16>,

    #[arg(long, default_value = "tcp_synscan")]
    pub probe_module: String,

    #[arg(long, default_value = "csv")]
    pub output_module: String,

    /// Output path; stdout when omitted.
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    #[arg(long)]
    pub source_ip_first: Option<std::net::Ipv4Addr>,
    #[arg(long)]
    pub source_ip_last: Option<std::net::Ipv4Addr>,
    #[arg(long, default_value_t = 32768)]
    pub source_port_first: u16,
    #[arg(long, default_value_t = 61000)]
    pub source_port_last: u16,

    /// Network interface to send on and capture replies from.
    #[arg(short = 'i', long)]
    pub interface: Option<String>,

    /// Gateway hardware address, `aa:bb:cc:dd:ee:ff`. ARP-based discovery is
    /// out of scope, so this must be supplied.
    #[arg(long)]
    pub gateway_mac: Option<String>,

    /// Target rate in packets per second.
    #[arg(short = 'r', long)]
    pub rate: Option<u64>,

    /// Target bandwidth in bits per second, overrides `--rate` if both given.
    #[arg(short = 'B', long)]
    pub bandwidth: Option<u64>,

    #[arg(short = 'n', long)]
    pub max_targets: Option<u64>,
    #[arg(short = 't', long)]
    pub max_runtime: Option<u64>,
    #[arg(long, default_value_t = 8)]
    pub cooldown_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub num_retries: u8,
    #[arg(long, default_value_t = 1)]
    pub packet_streams: u8,
    #[arg(long, default_value_t = 1_000_000)]
    pub retransmit_capacity: usize,

    #[arg(long, default_value_t = 1)]
    pub shards: u8,
    #[arg(long, default_value_t = 0)]
    pub shard: u8,
    #[arg(long, default_value_t = 1)]
    pub sender_threads: u8,

    /// Boolean expression over output fields, e.g. `success == true`.
    #[arg(long)]
    pub filter: Option<String>,
    #[arg(long)]
    pub filter_duplicates: bool,
    #[arg(long)]
    pub filter_unsuccessful: bool,

    /// Build and classify packets without ever touching the wire.
    #[arg(long)]
    pub dryrun: bool,
    #[arg(long)]
    pub send_ip_pkts: bool,

    #[arg(long, default_value_t = 0)]
    pub max_results: u64,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
