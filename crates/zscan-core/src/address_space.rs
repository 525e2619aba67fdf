//! Target address space: an allowlist of inclusive `[u32, u32]` ranges with
//! a blacklist subtracted out, collapsed into a sorted, disjoint range list
//! so membership tests during the hot iteration loop are a binary search.
//!
//! Callers (the CLI's CIDR-file parser) hand in ranges as plain `u32` pairs
//! so this crate carries no dependency on a CIDR-parsing library; `ipnet` is
//! only ever used at the edge that turns text into ranges.

#[derive(Debug, Clone)]
pub struct AddressSpace {
    allowed: Vec<(u32, u32)>,
}

fn merge(mut ranges: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    ranges.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        if let Some(last) = merged.last_mut() {
            if start <= last.1.saturating_add(1) {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }
    merged
}

/// Subtracts `block` (sorted, disjoint) from `allow` (sorted, disjoint).
fn subtract(allow: &[(u32, u32)], block: &[(u32, u32)]) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    let mut bi = 0;
    for &(mut start, end) in allow {
        while bi < block.len() && block[bi].1 < start {
            bi += 1;
        }
        let mut b = bi;
        while start <= end {
            if b >= block.len() || block[b].0 > end {
                out.push((start, end));
                break;
            }
            let (bs, be) = block[b];
            if bs > start {
                out.push((start, bs - 1));
            }
            if be >= end {
                start = end.saturating_add(1);
                break;
            }
            start = be + 1;
            b += 1;
        }
    }
    out
}

impl AddressSpace {
    pub fn new(allow: Vec<(u32, u32)>, block: Vec<(u32, u32)>) -> Self {
        let allow = merge(allow);
        let block = merge(block);
        Self { allowed: subtract(&allow, &block) }
    }

    pub fn contains(&self, ip: u32) -> bool {
        self.allowed
            .binary_search_by(|&(start, end)| {
                if ip < start {
                    std::cmp::Ordering::Greater
                } else if ip > end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_allow_no_block() {
        let space = AddressSpace::new(vec![(0, u32::MAX)], vec![]);
        assert!(space.contains(0));
        assert!(space.contains(12345));
        assert!(space.contains(u32::MAX));
    }

    #[test]
    fn block_carves_a_hole() {
        let space = AddressSpace::new(vec![(0, 100)], vec![(40, 60)]);
        assert!(space.contains(39));
        assert!(!space.contains(40));
        assert!(!space.contains(60));
        assert!(space.contains(61));
    }

    #[test]
    fn block_covering_everything_empties_space() {
        let space = AddressSpace::new(vec![(10, 20)], vec![(0, u32::MAX)]);
        assert!(space.is_empty());
        assert!(!space.contains(15));
    }

    #[test]
    fn overlapping_allow_ranges_merge() {
        let space = AddressSpace::new(vec![(0, 10), (5, 20)], vec![]);
        assert_eq!(space.ranges(), &[(0, 20)]);
    }
}
