//! Per-target audit stream: one line to stdout for every target sent, the
//! same contract ZMap's send loop offers to consumers that tail its stdout.
//! Lives in the hot send path, so it is also a throughput anchor — do not
//! add buffering or formatting beyond what's written here without
//! considering the effect on achievable packet rate.

use std::io::Write;
use std::net::Ipv4Addr;
use std::sync::OnceLock;
use std::sync::Mutex;

use crate::state::now_unix_f64;

static AUDIT_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn lock() -> &'static Mutex<()> {
    AUDIT_LOCK.get_or_init(|| Mutex::new(()))
}

/// Emits `^\t<unix-ts>\t<ip>\n` for a freshly-sent target.
pub fn audit_sent(ip: Ipv4Addr) {
    let _guard = lock().lock().unwrap_or_else(|e| e.into_inner());
    let stdout = std::io::stdout();
    let mut h = stdout.lock();
    let _ = writeln!(h, "^\t{:.6}\t{}", now_unix_f64(), ip);
}

/// Emits `^R\t<unix-ts>\t<ip>\n` for a retransmitted target.
pub fn audit_retransmit(ip: Ipv4Addr) {
    let _guard = lock().lock().unwrap_or_else(|e| e.into_inner());
    let stdout = std::io::stdout();
    let mut h = stdout.lock();
    let _ = writeln!(h, "^R\t{:.6}\t{}", now_unix_f64(), ip);
}
