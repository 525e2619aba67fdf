//! Parses CIDR target/blacklist text into the inclusive `(u32, u32)` ranges
//! `zscan_core::address_space::AddressSpace` operates on.

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::path::Path;

fn net_to_range(net: Ipv4Net) -> (u32, u32) {
    (u32::from(net.network()), u32::from(net.broadcast()))
}

/// Parses a single CLI target token: a bare IPv4 address or a CIDR range.
pub fn parse_target(token: &str) -> Result<(u32, u32)> {
    if let Ok(net) = token.parse::<Ipv4Net>() {
        return Ok(net_to_range(net));
    }
    let ip: Ipv4Addr = token.parse().with_context(|| format!("not an address or CIDR range: {token}"))?;
    let v = u32::from(ip);
    Ok((v, v))
}

pub fn parse_targets(tokens: &[String]) -> Result<Vec<(u32, u32)>> {
    tokens.iter().map(|t| parse_target(t)).collect()
}

/// Parses a newline-delimited CIDR blacklist file, `#`-prefixed comments and
/// blank lines ignored.
pub fn parse_blacklist_file(path: &Path) -> Result<Vec<(u32, u32)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read blacklist file: {}", path.display()))?;
    let mut ranges = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let range = parse_target(line)
            .with_context(|| format!("{}:{}: invalid CIDR entry", path.display(), lineno + 1))?;
        ranges.push(range);
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_address() {
        assert_eq!(parse_target("10.0.0.5").unwrap(), (167772165, 167772165));
    }

    #[test]
    fn parses_cidr_range() {
        let (start, end) = parse_target("10.0.0.0/30").unwrap();
        assert_eq!(end - start, 3);
    }

    #[test]
    fn blacklist_file_skips_comments_and_blanks() {
        let dir = std::env::temp_dir();
        let path = dir.join("zscan-test-blacklist.txt");
        std::fs::write(&path, "# comment\n\n10.0.0.0/24\n").unwrap();
        let ranges = parse_blacklist_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(ranges.len(), 1);
    }
}
