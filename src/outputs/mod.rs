pub mod csv_output;
pub mod jsonl_output;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use zscan_core::output::OutputModule;

pub fn by_name(name: &str, path: Option<&Path>, update_interval: u64) -> Result<Arc<dyn OutputModule>> {
    match name {
        "csv" => Ok(Arc::new(csv_output::Csv::new(path, update_interval)?)),
        "jsonl" => Ok(Arc::new(jsonl_output::Jsonl::new(path, update_interval)?)),
        other => bail!("unknown output module: {other}"),
    }
}
