//! Stateless send/receive validation via a keyed PRF.
//!
//! The validator is the linchpin invariant: it lets the receive thread
//! decide whether an inbound packet is a genuine reply to a probe this
//! process actually sent, without keeping per-target state anywhere. The key
//! is drawn once from OS entropy at startup and never written to disk or
//! logged.

use std::net::Ipv4Addr;

use rand::RngCore;

pub const VALIDATION_BYTES: usize = 16;
pub type ValidationVector = [u8; VALIDATION_BYTES];

pub struct Validator {
    key: [u8; 32],
}

impl Validator {
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    #[cfg(test)]
    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the validation vector for an (src, dst) pair. Order matters —
    /// callers on the receive side swap (dst, src) to recompute what the
    /// sender would have generated for the original outbound packet.
    pub fn generate(&self, src: Ipv4Addr, dst: Ipv4Addr) -> ValidationVector {
        let mut input = [0u8; 8];
        input[0..4].copy_from_slice(&src.octets());
        input[4..8].copy_from_slice(&dst.octets());
        let hash = blake3::keyed_hash(&self.key, &input);
        let mut out = [0u8; VALIDATION_BYTES];
        out.copy_from_slice(&hash.as_bytes()[0..VALIDATION_BYTES]);
        out
    }

    /// Recompute the vector the sender would have used for a reply now
    /// arriving from `reply_src` addressed to `reply_dst`, and compare it
    /// against the vector embedded in the reply.
    pub fn validate(&self, reply_src: Ipv4Addr, reply_dst: Ipv4Addr, observed: &ValidationVector) -> bool {
        &self.generate(reply_dst, reply_src) == observed
    }

    /// Recomputes the vector the original outbound probe would have carried,
    /// given the addresses observed on an inbound reply. Probe modules
    /// compare this against whatever fragment of it they embedded on the
    /// wire (e.g. a truncated copy in a TCP sequence number).
    pub fn regenerate_for_reply(&self, reply_src: Ipv4Addr, reply_dst: Ipv4Addr) -> ValidationVector {
        self.generate(reply_dst, reply_src)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> (Ipv4Addr, Ipv4Addr) {
        (Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(93, 184, 216, 34))
    }

    #[test]
    fn deterministic_for_same_key_and_pair() {
        let v = Validator::with_key([7u8; 32]);
        let (a, b) = addrs();
        assert_eq!(v.generate(a, b), v.generate(a, b));
    }

    #[test]
    fn order_sensitive() {
        let v = Validator::with_key([7u8; 32]);
        let (a, b) = addrs();
        assert_ne!(v.generate(a, b), v.generate(b, a));
    }

    #[test]
    fn different_keys_diverge() {
        let (a, b) = addrs();
        let v1 = Validator::with_key([1u8; 32]);
        let v2 = Validator::with_key([2u8; 32]);
        assert_ne!(v1.generate(a, b), v2.generate(a, b));
    }

    #[test]
    fn round_trip_validates() {
        let v = Validator::with_key([42u8; 32]);
        let (src, dst) = addrs();
        let sent = v.generate(src, dst);
        // reply arrives from dst back to src
        assert!(v.validate(dst, src, &sent));
    }

    #[test]
    fn forged_vector_rejected() {
        let v = Validator::with_key([42u8; 32]);
        let (src, dst) = addrs();
        let mut forged = v.generate(src, dst);
        forged[0] ^= 0xff;
        assert!(!v.validate(dst, src, &forged));
    }
}
