//! Cyclic-group target iterator.
//!
//! Enumerates the full 2^32 address space in pseudo-random order by walking
//! a multiplicative group modulo a prime just above 2^32, so target order is
//! unpredictable without ever materializing or storing a permutation table.
//! Sharding splits the single walk across `total_shards * senders` disjoint
//! arithmetic sequences of exponents, one per (shard, sender) pair.

use crate::address_space::AddressSpace;
use crate::error::{Error, Result};

/// Smallest prime greater than 2^32. The group (Z/pZ)* has order `PRIME - 1`.
pub const PRIME: u64 = 4_294_967_311;

/// Prime factorization of `PRIME - 1 = 2 * 3^2 * 5 * 131 * 364289`, used only
/// to test candidate primitive roots.
const PRIME_MINUS_ONE_FACTORS: [u64; 5] = [2, 3, 5, 131, 364_289];

fn mulmod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn modpow(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mulmod(result, base, m);
        }
        exp >>= 1;
        base = mulmod(base, base, m);
    }
    result
}

fn is_primitive_root(g: u64, p: u64) -> bool {
    let pm1 = p - 1;
    PRIME_MINUS_ONE_FACTORS.iter().all(|&q| modpow(g, pm1 / q, p) != 1)
}

/// Finds the smallest primitive root of `PRIME` starting the search at
/// `start` (wrapping), so callers can vary the search seed without changing
/// correctness — any primitive root works equally well for enumeration.
fn find_primitive_root(p: u64, start: u64) -> Result<u64> {
    let mut g = start.max(2);
    for _ in 0..p {
        if is_primitive_root(g, p) {
            return Ok(g);
        }
        g += 1;
        if g >= p {
            g = 2;
        }
    }
    Err(Error::NoPrimitiveRoot(p))
}

/// One (shard, sender) walker's view of the cyclic group. Advances the
/// exponent by `step` each call, starting at `offset`, skipping values that
/// don't map onto a valid 32-bit address.
struct GroupWalk {
    prime: u64,
    multiplier: u64,
    current: u64,
    visited: u64,
    max_visits: u64,
    exhausted: bool,
}

impl GroupWalk {
    fn new(prime: u64, root: u64, start_exponent: u64, offset: u64, step: u64) -> Self {
        let pm1 = prime - 1;
        let e0 = (start_exponent + offset) % pm1;
        let current = modpow(root, e0, prime);
        let multiplier = modpow(root, step % pm1, prime);
        // number of k in {offset, offset+step, ...} with k <= pm1 - 1
        let max_visits = if offset > pm1 - 1 { 0 } else { (pm1 - 1 - offset) / step + 1 };
        Self { prime, multiplier, current, visited: 0, max_visits, exhausted: max_visits == 0 }
    }

    /// Returns the next raw group value (1..=prime-1), or `None` once this
    /// walker has exhausted its assigned exponents.
    fn next_raw(&mut self) -> Option<u64> {
        if self.exhausted {
            return None;
        }
        let val = self.current;
        self.visited += 1;
        if self.visited >= self.max_visits {
            self.exhausted = true;
        } else {
            self.current = mulmod(self.current, self.multiplier, self.prime);
        }
        Some(val)
    }
}

/// A single sender thread's share of a single shard's target space.
pub struct Shard {
    walk: GroupWalk,
    space: std::sync::Arc<AddressSpace>,
    cur_ip: u32,
    sent: u64,
    max_targets: u64,
}

impl Shard {
    /// `shard` in `0..total_shards`, `sender` in `0..senders_per_shard`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shard: u8,
        total_shards: u8,
        sender: u8,
        senders_per_shard: u8,
        start_exponent: u64,
        space: std::sync::Arc<AddressSpace>,
        max_targets: u64,
    ) -> Result<Self> {
        if total_shards == 0 || shard >= total_shards {
            return Err(Error::InvalidShard { shard, total: total_shards });
        }
        let root = find_primitive_root(PRIME, start_exponent)?;
        let step = total_shards as u64 * senders_per_shard as u64;
        let offset = shard as u64 * senders_per_shard as u64 + sender as u64;
        let walk = GroupWalk::new(PRIME, root, start_exponent, offset, step);
        let mut s = Self { walk, space, cur_ip: 0, sent: 0, max_targets };
        s.cur_ip = s.find_next_valid();
        Ok(s)
    }

    fn find_next_valid(&mut self) -> u32 {
        if self.max_targets != 0 && self.sent >= self.max_targets {
            return 0;
        }
        loop {
            let Some(val) = self.walk.next_raw() else { return 0 };
            if val == 0 || val > u32::MAX as u64 {
                continue; // 0 and values >= 2^32 never denote a routable address
            }
            let ip = val as u32;
            if ip != 0 && self.space.contains(ip) {
                return ip;
            }
        }
    }

    /// Current position without advancing. `0` is the sentinel meaning this
    /// walker is exhausted — `0.0.0.0` is never a valid target.
    pub fn cur_ip(&self) -> u32 {
        self.cur_ip
    }

    /// Advances to and returns the next valid target, or `0` once exhausted.
    /// Once `0` is returned it is returned forever after.
    pub fn next_ip(&mut self) -> u32 {
        if self.cur_ip != 0 {
            self.sent += 1;
        }
        self.cur_ip = self.find_next_valid();
        self.cur_ip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// A small prime for fast exhaustive coverage tests, with a step chosen
    /// coprime to `p - 1` so the offset classes are genuinely disjoint (see
    /// DESIGN.md for the general-case caveat when step shares a factor with
    /// `p - 1`).
    const SMALL_PRIME: u64 = 10_007; // prime, p-1 = 10006 = 2 * 5003
    const SMALL_FACTORS: [u64; 2] = [2, 5003];

    fn small_primitive_root() -> u64 {
        let pm1 = SMALL_PRIME - 1;
        let mut g = 2;
        loop {
            if SMALL_FACTORS.iter().all(|&q| modpow(g, pm1 / q, SMALL_PRIME) != 1) {
                return g;
            }
            g += 1;
        }
    }

    fn full_space() -> Arc<AddressSpace> {
        Arc::new(AddressSpace::new(vec![(0, u32::MAX)], vec![]))
    }

    #[test]
    fn primitive_root_is_verified_not_assumed() {
        let root = find_primitive_root(PRIME, 2).unwrap();
        assert!(is_primitive_root(root, PRIME));
    }

    #[test]
    fn shard_coverage_and_no_duplicates_small_group() {
        let root = small_primitive_root();
        let step = 3u64; // coprime with p-1 = 2 * 5003
        let total_shards = 3u8;
        let senders = 1u8;
        let space = full_space();

        let mut seen: HashSet<u32> = HashSet::new();
        let mut total = 0u64;
        for shard in 0..total_shards {
            let mut walk = GroupWalk::new(SMALL_PRIME, root, 0, shard as u64, step);
            while let Some(val) = walk.next_raw() {
                if val == 0 || val > u32::MAX as u64 {
                    continue;
                }
                assert!(seen.insert(val as u32), "value {val} produced twice");
                total += 1;
            }
        }
        // every nonzero residue mod SMALL_PRIME is visited exactly once
        assert_eq!(total, SMALL_PRIME - 1);
    }

    #[test]
    fn exhausted_shard_returns_sentinel_forever() {
        let space = full_space();
        let mut shard = Shard::new(0, 1, 0, 1, 0, space, 3).unwrap();
        let mut count = 0;
        loop {
            let ip = shard.cur_ip();
            if ip == 0 {
                break;
            }
            shard.next_ip();
            count += 1;
            assert!(count <= 10, "shard did not respect max_targets");
        }
        assert_eq!(count, 3);
        assert_eq!(shard.next_ip(), 0);
        assert_eq!(shard.next_ip(), 0);
    }

    #[test]
    fn invalid_shard_index_rejected() {
        let space = full_space();
        assert!(Shard::new(5, 3, 0, 1, 0, space, 0).is_err());
    }
}
