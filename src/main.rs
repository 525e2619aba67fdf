//! zscan — single-host, high-rate Internet-scale stateless TCP SYN scanner.
//!
//! Run `zscan --help` for usage.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::RngCore;
use tracing_subscriber::EnvFilter;
use zscan_core::address_space::AddressSpace;

mod blacklist;
mod cli;
mod config;
mod filter;
mod gateway;
mod outputs;
mod probes;

use cli::Cli;
use config::FileConfig;

fn init_logging(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let target_port = cli
        .target_port
        .or(file_config.target_port)
        .context("target port is required (-p/--target-port or scan.toml)")?;

    let target_tokens = config::merge_targets(&cli.targets, &file_config);
    if target_tokens.is_empty() {
        bail!("no targets given: pass CIDR ranges/addresses or list them under `targets` in scan.toml");
    }
    let allow_ranges = blacklist::parse_targets(&target_tokens)?;

    let blacklist_path = cli.blacklist_file.clone().or_else(|| file_config.blacklist_file.as_ref().map(Into::into));
    let block_ranges = match &blacklist_path {
        Some(p) => blacklist::parse_blacklist_file(p)?,
        None => Vec::new(),
    };
    let target_space = Arc::new(AddressSpace::new(allow_ranges, block_ranges));
    if target_space.is_empty() {
        bail!("target space is empty after applying the blacklist");
    }

    let interface = cli.interface.clone().or_else(|| file_config.interface.clone()).context("--interface is required")?;
    let hw_mac = gateway::interface_hw_mac(&interface)?;
    let gw_mac_str = cli.gateway_mac.clone().or_else(|| file_config.gateway_mac.clone()).context(
        "--gateway-mac is required (ARP-based gateway discovery is out of scope for this scanner)",
    )?;
    let gw_mac = gateway::parse_mac(&gw_mac_str)?;

    let probe_module = probes::by_name(&cli.probe_module, target_port, cli.source_port_first, cli.source_port_last)?;

    let output_path = cli.output_file.clone().or_else(|| file_config.output_file.as_ref().map(Into::into));
    let output_module = outputs::by_name(&cli.output_module, output_path.as_deref(), 1000)?;

    let rate_pps = match cli.bandwidth.or(file_config.bandwidth) {
        Some(bps) => Some(bps / (probe_module.packet_length() as u64 * 8).max(1)),
        None => cli.rate.or(file_config.rate),
    };

    let filter = match cli.filter.clone().or_else(|| file_config.filter.clone()) {
        Some(expr) => Some(filter::compile(&expr)?),
        None => None,
    };

    let source_ip_first = cli
        .source_ip_first
        .or(file_config.source_ip_first)
        .context("--source-ip-first is required")?;
    let source_ip_last = cli.source_ip_last.or(file_config.source_ip_last).unwrap_or(source_ip_first);

    // drawn once against the *exclusive* span, matching `srcip_offset_modulus`'s
    // documented quirk; `Config::source_ip_for` folds this into every call.
    let srcip_offset_modulus = u32::from(source_ip_last) - u32::from(source_ip_first);
    let srcip_offset = if srcip_offset_modulus == 0 { 0 } else { rand::rngs::OsRng.next_u32() % srcip_offset_modulus };

    let config = Arc::new(zscan_core::Config {
        source_ip_first,
        source_ip_last,
        source_port_first: cli.source_port_first,
        source_port_last: cli.source_port_last,
        target_port,
        srcip_offset,
        total_shards: cli.shards,
        shard_index: cli.shard,
        sender_threads: cli.sender_threads,
        probe_module,
        output_module,
        target_space,
        rate_pps,
        bandwidth_bps: cli.bandwidth,
        max_targets: cli.max_targets.unwrap_or(0),
        max_runtime_secs: cli.max_runtime.unwrap_or(0),
        cooldown_secs: cli.cooldown_secs,
        num_retries: cli.num_retries,
        packet_streams: cli.packet_streams,
        retransmit_capacity: cli.retransmit_capacity,
        filter,
        filter_duplicates: config::merge_bool(cli.filter_duplicates, file_config.filter_duplicates),
        filter_unsuccessful: config::merge_bool(cli.filter_unsuccessful, file_config.filter_unsuccessful),
        dryrun: config::merge_bool(cli.dryrun, file_config.dryrun),
        send_ip_pkts: config::merge_bool(cli.send_ip_pkts, file_config.send_ip_pkts),
        interface: interface.clone(),
        hw_mac,
        gw_mac,
        max_results: cli.max_results,
    });
    config.validate()?;

    let mut seed = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    let start_exponent = u64::from_le_bytes(seed);

    let summary = zscan_core::supervisor::run(config, start_exponent, &interface)?;
    tracing::info!(
        sent = summary.send.targets_sent.load(std::sync::atomic::Ordering::Relaxed),
        unique_successes = summary.recv.successes_unique.load(std::sync::atomic::Ordering::Relaxed),
        "scan complete"
    );
    Ok(())
}
