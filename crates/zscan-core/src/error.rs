//! Core error taxonomy.
//!
//! Per-packet send/receive failures are never represented here — they are
//! counted in `SendState`/`RecvState` instead. This type only covers the
//! fatal, once-per-thread-or-process errors described in the error handling
//! design: invalid configuration, socket/capture init failure.

use std::net::Ipv4Addr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid source address range: first {first} > last {last}")]
    InvalidSourceRange { first: Ipv4Addr, last: Ipv4Addr },

    #[error("invalid source port range: first {first} > last {last}")]
    InvalidPortRange { first: u16, last: u16 },

    #[error("shard index {shard} out of bounds for {total} total shards")]
    InvalidShard { shard: u8, total: u8 },

    #[error("no primitive root found for prime {0}")]
    NoPrimitiveRoot(u64),

    #[error("socket initialization failed: {0}")]
    SocketInit(#[source] std::io::Error),

    #[error("packet capture initialization failed: {0}")]
    CaptureInit(#[source] pcap::Error),

    #[error("packet capture error: {0}")]
    Capture(#[source] pcap::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
