//! Immutable run configuration, built once by the caller and shared
//! read-only across every send/receive thread via `Arc`.

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::address_space::AddressSpace;
use crate::error::{Error, Result};
use crate::fieldset::FieldSet;
use crate::output::OutputModule;
use crate::probe::ProbeModule;

pub type Filter = Arc<dyn Fn(&FieldSet) -> bool + Send + Sync>;

pub struct Config {
    pub source_ip_first: Ipv4Addr,
    pub source_ip_last: Ipv4Addr,
    pub source_port_first: u16,
    pub source_port_last: u16,
    pub target_port: u16,

    /// One-time random offset drawn at startup against
    /// `srcip_offset_modulus()`, folded into every `source_ip_for` call so
    /// concurrent sender threads don't all start their rotation from the
    /// same point in the source range.
    pub srcip_offset: u32,

    pub total_shards: u8,
    pub shard_index: u8,
    pub sender_threads: u8,

    pub probe_module: Arc<dyn ProbeModule>,
    pub output_module: Arc<dyn OutputModule>,

    pub target_space: Arc<AddressSpace>,

    pub rate_pps: Option<u64>,
    pub bandwidth_bps: Option<u64>,
    pub max_targets: u64,
    pub max_runtime_secs: u64,
    pub cooldown_secs: u64,
    pub num_retries: u8,
    pub packet_streams: u8,
    pub retransmit_capacity: usize,

    pub filter: Option<Filter>,
    pub filter_duplicates: bool,
    pub filter_unsuccessful: bool,

    pub dryrun: bool,
    pub send_ip_pkts: bool,

    pub interface: String,
    pub hw_mac: [u8; 6],
    pub gw_mac: [u8; 6],

    pub max_results: u64,
}

impl Config {
    /// `srcip_offset_modulus`/`num_src_addrs` reproduce an exclusive/inclusive
    /// modulus mismatch present in the scanner this was ported from: the
    /// one-time `srcip_offset` draw (see `srcip_offset_modulus`) wraps modulo
    /// the *exclusive* span (`last - first`), while `source_ip_for`'s
    /// per-call rotation uses the *inclusive* span (`last - first + 1`).
    /// Preserved verbatim rather than corrected.
    pub fn num_src_addrs(&self) -> u32 {
        u32::from(self.source_ip_last) - u32::from(self.source_ip_first) + 1
    }

    /// Modulus against which the one-time `srcip_offset` is drawn at
    /// startup — deliberately the exclusive span; see `num_src_addrs`.
    pub fn srcip_offset_modulus(&self) -> u32 {
        u32::from(self.source_ip_last) - u32::from(self.source_ip_first)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_ip_first > self.source_ip_last {
            return Err(Error::InvalidSourceRange { first: self.source_ip_first, last: self.source_ip_last });
        }
        if self.source_port_first > self.source_port_last {
            return Err(Error::InvalidPortRange { first: self.source_port_first, last: self.source_port_last });
        }
        if self.total_shards == 0 || self.shard_index >= self.total_shards {
            return Err(Error::InvalidShard { shard: self.shard_index, total: self.total_shards });
        }
        Ok(())
    }

    /// `get_src_ip`: `(ntohl(dst) + srcip_offset + stream_index) mod
    /// num_src_addrs + srcip_first`. Keying on `dst` (rather than a plain
    /// send counter) is what makes two different targets draw different
    /// source addresses even within the same stream index.
    pub fn source_ip_for(&self, dst: Ipv4Addr, stream_index: u8) -> Ipv4Addr {
        let num_addrs = self.num_src_addrs();
        if num_addrs <= 1 {
            return self.source_ip_first;
        }
        let base = u32::from(dst).wrapping_add(self.srcip_offset).wrapping_add(stream_index as u32);
        let offset = base % num_addrs;
        Ipv4Addr::from(u32::from(self.source_ip_first).wrapping_add(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeThreadState;
    use crate::validator::ValidationVector;
    use std::any::Any;

    struct NoopProbe;
    impl ProbeModule for NoopProbe {
        fn name(&self) -> &'static str {
            "noop"
        }
        fn packet_length(&self) -> usize {
            0
        }
        fn success_index(&self) -> usize {
            0
        }
        fn app_success_index(&self) -> Option<usize> {
            None
        }
        fn thread_initialize(&self, _hw: [u8; 6], _gw: [u8; 6], _port: u16) -> ProbeThreadState {
            Box::new(())
        }
        fn make_packet(&self, _: &mut [u8], _: Ipv4Addr, _: Ipv4Addr, _: &ValidationVector, _: u8, _: &mut dyn Any) -> usize {
            0
        }
        fn validate_packet(&self, _: &[u8], _: usize, _: &ValidationVector) -> bool {
            false
        }
        fn process_packet(&self, _: &[u8], _: usize, _: &mut FieldSet) {}
    }

    struct NoopOutput;
    impl OutputModule for NoopOutput {
        fn name(&self) -> &'static str {
            "noop"
        }
        fn process(&self, _: &FieldSet) {}
    }

    #[test]
    fn num_src_addrs_is_inclusive_offset_is_exclusive() {
        let first = Ipv4Addr::new(10, 0, 0, 0);
        let last = Ipv4Addr::new(10, 0, 0, 3);
        // 4 addresses (.0 .. .3) but the offset modulus is 3, not 4
        assert_eq!(u32::from(last) - u32::from(first) + 1, 4);
        assert_eq!(u32::from(last) - u32::from(first), 3);
    }

    fn range_config(first: Ipv4Addr, last: Ipv4Addr, srcip_offset: u32) -> Config {
        Config {
            source_ip_first: first,
            source_ip_last: last,
            source_port_first: 40000,
            source_port_last: 40000,
            target_port: 80,
            srcip_offset,
            total_shards: 1,
            shard_index: 0,
            sender_threads: 1,
            probe_module: Arc::new(NoopProbe),
            output_module: Arc::new(NoopOutput),
            target_space: Arc::new(AddressSpace::new(vec![(0, u32::MAX)], vec![])),
            rate_pps: None,
            bandwidth_bps: None,
            max_targets: 0,
            max_runtime_secs: 0,
            cooldown_secs: 0,
            num_retries: 0,
            packet_streams: 1,
            retransmit_capacity: 10,
            filter: None,
            filter_duplicates: false,
            filter_unsuccessful: false,
            dryrun: true,
            send_ip_pkts: false,
            interface: "lo".to_string(),
            hw_mac: [0; 6],
            gw_mac: [0; 6],
            max_results: 0,
        }
    }

    #[test]
    fn source_ip_for_distinguishes_targets() {
        let cfg = range_config(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 0);
        let a = cfg.source_ip_for(Ipv4Addr::new(192, 0, 2, 10), 0);
        let b = cfg.source_ip_for(Ipv4Addr::new(192, 0, 2, 11), 0);
        assert_ne!(a, b);
        for ip in [a, b] {
            assert!(u32::from(ip) >= u32::from(cfg.source_ip_first) && u32::from(ip) <= u32::from(cfg.source_ip_last));
        }
    }

    #[test]
    fn source_ip_for_single_address_is_constant() {
        let cfg = range_config(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 1), 0);
        assert_eq!(cfg.source_ip_for(Ipv4Addr::new(192, 0, 2, 10), 0), cfg.source_ip_first);
        assert_eq!(cfg.source_ip_for(Ipv4Addr::new(192, 0, 2, 11), 3), cfg.source_ip_first);
    }
}
