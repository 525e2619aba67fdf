//! CSV sink: one row per surviving field set, header taken from the first
//! record's field names (the field set's shape is fixed per probe module,
//! so this is stable for the life of a run).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::info;
use zscan_core::fieldset::FieldSet;
use zscan_core::output::OutputModule;
use zscan_core::state::{RecvState, SendState};

pub struct Csv {
    writer: Mutex<csv::Writer<Box<dyn Write + Send>>>,
    header_written: Mutex<bool>,
    update_interval: u64,
    emitted: AtomicU64,
}

impl Csv {
    pub fn new(path: Option<&Path>, update_interval: u64) -> Result<Self> {
        let sink: Box<dyn Write + Send> = match path {
            Some(p) => Box::new(BufWriter::new(
                File::create(p).with_context(|| format!("failed to create output file: {}", p.display()))?,
            )),
            None => Box::new(std::io::stdout()),
        };
        let writer = csv::WriterBuilder::new().has_headers(false).from_writer(sink);
        Ok(Self { writer: Mutex::new(writer), header_written: Mutex::new(false), update_interval, emitted: AtomicU64::new(0) })
    }
}

impl OutputModule for Csv {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn process(&self, fields: &FieldSet) {
        let mut header_written = self.header_written.lock().unwrap_or_else(|e| e.into_inner());
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if !*header_written {
            let header: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
            let _ = writer.write_record(&header);
            *header_written = true;
        }
        let row: Vec<String> = fields.iter().map(|(_, value)| value.to_string()).collect();
        let _ = writer.write_record(&row);
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn update_interval(&self) -> u64 {
        self.update_interval
    }

    fn update(&self, send: &SendState, recv: &RecvState) {
        info!(
            sent = send.targets_sent.load(Ordering::Relaxed),
            unique_successes = recv.successes_unique.load(Ordering::Relaxed),
            "scan progress"
        );
    }

    fn close(&self) {
        if let Ok(mut w) = self.writer.lock() {
            let _ = w.flush();
        }
    }
}
