//! Probe module contract: the pluggable logic that builds outbound packets
//! and interprets inbound ones. The core send/receive engines are written
//! against this trait and never know what wire protocol a concrete probe
//! speaks.

use std::any::Any;
use std::net::Ipv4Addr;

use crate::fieldset::FieldSet;
use crate::validator::ValidationVector;

/// Per-thread scratch state a probe module may need (e.g. a prebuilt packet
/// template it mutates in place for each target). Opaque to the engines.
pub type ProbeThreadState = Box<dyn Any + Send>;

pub trait ProbeModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Maximum bytes `make_packet` will ever write.
    fn packet_length(&self) -> usize;

    /// Index into the `FieldSet` produced by `process_packet` that holds the
    /// overall success boolean.
    fn success_index(&self) -> usize;

    /// Index into the `FieldSet` holding an application-layer success
    /// boolean, if this probe performs one beyond the base protocol
    /// handshake.
    fn app_success_index(&self) -> Option<usize>;

    /// One-time setup before any sender thread starts (e.g. resolving a
    /// payload template). Default: nothing to do.
    fn global_initialize(&self) {}

    /// Per-thread setup: allocate and return scratch state the thread will
    /// pass back into `make_packet` on every call.
    fn thread_initialize(&self, hw_mac: [u8; 6], gw_mac: [u8; 6], target_port: u16) -> ProbeThreadState;

    /// Writes a complete outbound frame into `buf` (sized `packet_length()`),
    /// returning the number of bytes written. `stream_index` identifies
    /// which of the configured `packet_streams` sub-probes this is (`0` for
    /// a single-stream scan), so a probe can vary a per-stream nonce.
    fn make_packet(
        &self,
        buf: &mut [u8],
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        validation: &ValidationVector,
        stream_index: u8,
        probe_state: &mut dyn Any,
    ) -> usize;

    /// True if `ip_payload` (the IP header onward, `remaining_len` bytes
    /// available) looks like a reply to a probe this process sent, given the
    /// validation vector recomputed for the (reply_src, reply_dst) pair.
    fn validate_packet(&self, ip_payload: &[u8], remaining_len: usize, validation: &ValidationVector) -> bool;

    /// Extracts probe-specific fields from a validated reply into `fields`.
    fn process_packet(&self, ip_payload: &[u8], remaining_len: usize, fields: &mut FieldSet);
}
