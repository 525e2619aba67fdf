//! JSON-lines sink: one `serde_json::Value` object per surviving field set.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::info;
use zscan_core::fieldset::{FieldSet, FieldValue};
use zscan_core::output::OutputModule;
use zscan_core::state::{RecvState, SendState};

fn to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::U64(v) => Value::from(*v),
        FieldValue::I64(v) => Value::from(*v),
        FieldValue::Bool(v) => Value::from(*v),
        FieldValue::Str(v) => Value::from(v.clone()),
        FieldValue::Ip(v) => Value::from(v.to_string()),
    }
}

pub struct Jsonl {
    writer: Mutex<Box<dyn Write + Send>>,
    update_interval: u64,
    emitted: AtomicU64,
}

impl Jsonl {
    pub fn new(path: Option<&Path>, update_interval: u64) -> Result<Self> {
        let sink: Box<dyn Write + Send> = match path {
            Some(p) => Box::new(BufWriter::new(
                File::create(p).with_context(|| format!("failed to create output file: {}", p.display()))?,
            )),
            None => Box::new(std::io::stdout()),
        };
        Ok(Self { writer: Mutex::new(sink), update_interval, emitted: AtomicU64::new(0) })
    }
}

impl OutputModule for Jsonl {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn process(&self, fields: &FieldSet) {
        let mut obj = Map::with_capacity(fields.len());
        for (name, value) in fields.iter() {
            obj.insert((*name).to_string(), to_json(value));
        }
        let line = Value::Object(obj).to_string();
        let mut w = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(w, "{line}");
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
