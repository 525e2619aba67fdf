pub mod tcp_synscan;

use std::sync::Arc;

use anyhow::{bail, Result};
use zscan_core::probe::ProbeModule;

pub fn by_name(name: &str, target_port: u16, source_port_first: u16, source_port_last: u16) -> Result<Arc<dyn ProbeModule>> {
    match name {
        "tcp_synscan" => Ok(Arc::new(tcp_synscan::TcpSynScan::new(target_port, source_port_first, source_port_last))),
        other => bail!("unknown probe module: {other}"),
    }
}
