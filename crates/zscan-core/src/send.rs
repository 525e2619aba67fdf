//! Send engine: the per-thread hot loop that walks a shard's cyclic-group
//! sequence, builds a probe packet per target, and pushes it onto the wire
//! at a paced rate, replaying a bounded tail of recent targets once the
//! primary walk is exhausted.

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::audit::{audit_retransmit, audit_sent};
use crate::config::Config;
use crate::iterator::Shard;
use crate::retransmit::{RetransmitPhase, RetransmitRing};
use crate::state::{now_unix_f64, RecvState, SendState};
use crate::validator::Validator;

/// Abstraction over the raw-socket backend so the hot loop and its tests
/// don't depend on actually owning a privileged socket.
pub trait PacketSink: Send {
    fn send_to(&self, dst: Ipv4Addr, packet: &[u8]) -> std::io::Result<()>;
}

/// Drives `interval`-iteration busy-wait pacing toward a target packet rate
/// without any blocking syscall. The spin counter is read/written through
/// volatile accesses so the optimizer can't prove the loop has no observable
/// effect and elide it.
struct Pacer {
    target_interval: std::time::Duration,
    recalibrate_every: u32,
    last_check: Instant,
    since_check: u32,
}

impl Pacer {
    fn new(rate_pps: Option<u64>, recalibrate_every: u32) -> Self {
        let target_interval = match rate_pps {
            Some(r) if r > 0 => std::time::Duration::from_secs_f64(1.0 / r as f64),
            _ => std::time::Duration::ZERO,
        };
        Self { target_interval, recalibrate_every: recalibrate_every.max(1), last_check: Instant::now(), since_check: 0 }
    }

    /// Spins until the configured rate would not be exceeded, checking wall
    /// clock only every `recalibrate_every` calls.
    fn pace(&mut self) {
        if self.target_interval.is_zero() {
            return;
        }
        self.since_check += 1;
        if self.since_check < self.recalibrate_every {
            let mut spin: u64 = 0;
            unsafe {
                std::ptr::write_volatile(&mut spin, std::ptr::read_volatile(&spin).wrapping_add(1));
            }
            return;
        }
        self.since_check = 0;
        let elapsed = self.last_check.elapsed();
        let expected = self.target_interval * self.recalibrate_every;
        if elapsed < expected {
            let remaining = expected - elapsed;
            let deadline = Instant::now() + remaining;
            let mut spin: u64 = 0;
            while Instant::now() < deadline {
                unsafe {
                    std::ptr::write_volatile(&mut spin, std::ptr::read_volatile(&spin).wrapping_add(1));
                }
            }
        }
        self.last_check = Instant::now();
    }
}

pub struct SendEngine<'a> {
    pub config: Arc<Config>,
    pub validator: Arc<Validator>,
    pub send_mutex: Arc<Mutex<()>>,
    pub state: Arc<SendState>,
    pub recv_state: Arc<RecvState>,
    pub sink: &'a dyn PacketSink,
    pub thread_index: u8,
}

impl<'a> SendEngine<'a> {
    pub fn run(&self, mut shard: Shard) {
        {
            let _guard = self.send_mutex.lock().unwrap_or_else(|e| e.into_inner());
            trace!(thread = self.thread_index, "send thread entering init barrier");
        }
        debug!(thread = self.thread_index, "send thread starting");

        let mut ring = RetransmitRing::new(self.config.retransmit_capacity);
        let mut pacer = Pacer::new(self.config.rate_pps, 100);
        let probe_state = self.config.probe_module.thread_initialize(
            self.config.hw_mac,
            self.config.gw_mac,
            self.config.target_port,
        );
        let mut probe_state = probe_state;
        let mut buf = vec![0u8; self.config.probe_module.packet_length()];
        let mut sent_count: u64 = 0;
        let streams = self.config.packet_streams.max(1);

        let mut cur_ip = shard.cur_ip();
        loop {
            if self.recv_state.is_complete() {
                debug!(thread = self.thread_index, "receive side signaled complete, stopping");
                break;
            }
            if cur_ip != 0 && !self.deadline_exceeded() {
                for stream_index in 0..streams {
                    self.send_one(cur_ip, &mut buf, &mut *probe_state, stream_index, false);
                    sent_count += 1;
                    pacer.pace();
                }
                self.state.targets_sent.fetch_add(1, Ordering::Relaxed);
                ring.push(cur_ip);
                if self.config.retransmit_capacity > 0 && ring.buffered() == self.config.retransmit_capacity {
                    if self.drain_ring(&mut ring, &mut buf, &mut *probe_state, &mut sent_count, &mut pacer, streams) {
                        break;
                    }
                    ring.reset_for_next_cycle();
                }
                cur_ip = shard.next_ip();
                continue;
            }
            if cur_ip != 0 {
                debug!(thread = self.thread_index, "max runtime reached, abandoning primary walk");
            }
            self.drain_ring(&mut ring, &mut buf, &mut *probe_state, &mut sent_count, &mut pacer, streams);
            break;
        }

        debug!(thread = self.thread_index, sent = sent_count, "send thread finished");
    }

    /// Drains the retransmit ring to exhaustion, replaying each buffered
    /// target across all configured `packet_streams`. Returns `true` if the
    /// receive side signaled completion mid-drain and the caller should stop
    /// immediately rather than resume the primary walk.
    fn drain_ring(
        &self,
        ring: &mut RetransmitRing,
        buf: &mut [u8],
        probe_state: &mut dyn std::any::Any,
        sent_count: &mut u64,
        pacer: &mut Pacer,
        streams: u8,
    ) -> bool {
        ring.begin_drain();
        loop {
            if self.recv_state.is_complete() {
                return true;
            }
            match ring.phase() {
                RetransmitPhase::DrainingTail if !self.deadline_exceeded() => {
                    if let Some(ip) = ring.pop() {
                        for stream_index in 0..streams {
                            self.send_one(ip, buf, probe_state, stream_index, true);
                            *sent_count += 1;
                            pacer.pace();
                        }
                        self.state.hosts_retransmitted.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                }
                RetransmitPhase::DrainingTail => return false,
                RetransmitPhase::Done => return false,
                RetransmitPhase::Fresh => unreachable!("begin_drain always leaves Fresh"),
            }
        }
    }

    /// `max_runtime_secs == 0` means unrun, matching the `max_targets`
    /// sentinel convention used by `Shard`.
    fn deadline_exceeded(&self) -> bool {
        if self.config.max_runtime_secs == 0 {
            return false;
        }
        let start = self.state.start_time();
        start > 0.0 && now_unix_f64() - start >= self.config.max_runtime_secs as f64
    }

    fn send_one(&self, ip: u32, buf: &mut [u8], probe_state: &mut dyn std::any::Any, stream_index: u8, retransmit: bool) {
        let dst = Ipv4Addr::from(ip);
        let src = self.config.source_ip_for(dst, stream_index);
        let validation = self.validator.generate(src, dst);
        let n = self.config.probe_module.make_packet(buf, src, dst, &validation, stream_index, probe_state);

        if self.config.dryrun {
            self.state.packets_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            let mut ok = false;
            for attempt in 0..=self.config.num_retries {
                match self.sink.send_to(dst, &buf[..n]) {
                    Ok(()) => {
                        ok = true;
                        break;
                    }
                    Err(e) => {
                        warn!(target = %dst, attempt, error = %e, "send failed, retrying");
                    }
                }
            }
            if ok {
                self.state.packets_sent.fetch_add(1, Ordering::Relaxed);
            } else {
                self.state.send_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        if retransmit {
            audit_retransmit(dst);
        } else {
            audit_sent(dst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSink {
        calls: AtomicUsize,
        fail_first_n: usize,
    }

    impl PacketSink for CountingSink {
        fn send_to(&self, _dst: Ipv4Addr, _packet: &[u8]) -> std::io::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            if n < self.fail_first_n {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "simulated failure"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn pacer_with_no_rate_never_blocks() {
        let mut p = Pacer::new(None, 100);
        let start = Instant::now();
        for _ in 0..1000 {
            p.pace();
        }
        assert!(start.elapsed() < std::time::Duration::from_millis(50));
    }
}
