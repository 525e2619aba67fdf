//! Interface and gateway hardware address discovery. ARP-based gateway
//! discovery is out of scope for this port, so the gateway MAC must be
//! supplied on the command line; only the local interface's own MAC is
//! looked up automatically.

use anyhow::{bail, Context, Result};

pub fn interface_hw_mac(interface: &str) -> Result<[u8; 6]> {
    let path = format!("/sys/class/net/{interface}/address");
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read hardware address for interface {interface}"))?;
    parse_mac(text.trim())
}

pub fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        bail!("malformed MAC address: {s}");
    }
    let mut mac = [0u8; 6];
    for (i, p) in parts.iter().enumerate() {
        mac[i] = u8::from_str_radix(p, 16).with_context(|| format!("malformed MAC octet: {p}"))?;
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_colon_separated_mac() {
        assert_eq!(parse_mac("aa:bb:cc:dd:ee:ff").unwrap(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(parse_mac("aa:bb:cc").is_err());
    }
}
