//! `scan.toml` configuration overlay for zscan. CLI flags always win over a
//! value supplied here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default)]
    pub targets: Vec<String>,
    pub blacklist_file: Option<String>,
    pub target_port: Option<u16>,
    pub probe_module: Option<String>,
    pub output_module: Option<String>,
    pub output_file: Option<String>,
    pub source_ip_first: Option<Ipv4Addr>,
    pub source_ip_last: Option<Ipv4Addr>,
    pub source_port_first: Option<u16>,
    pub source_port_last: Option<u16>,
    pub interface: Option<String>,
    pub gateway_mac: Option<String>,
    pub rate: Option<u64>,
    pub bandwidth: Option<u64>,
    pub max_targets: Option<u64>,
    pub max_runtime: Option<u64>,
    pub cooldown_secs: Option<u64>,
    pub num_retries: Option<u8>,
    pub packet_streams: Option<u8>,
    pub retransmit_capacity: Option<usize>,
    pub shards: Option<u8>,
    pub shard: Option<u8>,
    pub sender_threads: Option<u8>,
    pub filter: Option<String>,
    pub filter_duplicates: Option<bool>,
    pub filter_unsuccessful: Option<bool>,
    pub dryrun: Option<bool>,
    pub send_ip_pkts: Option<bool>,
    pub max_results: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse config file: {}", path.display()))
    }
}

pub fn merge_targets(cli: &[String], file: &FileConfig) -> Vec<String> {
    if cli.is_empty() {
        file.targets.clone()
    } else {
        cli.to_vec()
    }
}

pub fn merge_bool(cli: bool, file: Option<bool>) -> bool {
    cli || file.unwrap_or(false)
}
