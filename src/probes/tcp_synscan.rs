//! Port of ZMap's classic `tcp_synscan` probe module: sends a bare TCP SYN,
//! classifies the reply by flags, and treats a SYN+ACK as an open port.

use std::any::Any;
use std::net::Ipv4Addr;

use zscan_core::fieldset::{FieldSet, FieldValue};
use zscan_core::packet::TcpHeader;
use zscan_core::probe::{ProbeModule, ProbeThreadState};
use zscan_core::validator::ValidationVector;

pub struct TcpSynScan {
    target_port: u16,
    source_port_first: u16,
    source_port_last: u16,
}

impl TcpSynScan {
    pub fn new(target_port: u16, source_port_first: u16, source_port_last: u16) -> Self {
        Self { target_port, source_port_first, source_port_last }
    }

    fn embedded_seed(validation: &ValidationVector) -> u32 {
        u32::from_be_bytes([validation[0], validation[1], validation[2], validation[3]])
    }

    fn source_port_for(&self, validation: &ValidationVector) -> u16 {
        let span = self.source_port_last - self.source_port_first + 1;
        let word = u16::from_be_bytes([validation[4], validation[5]]);
        self.source_port_first + (word % span)
    }
}

fn checksum(words: impl Iterator<Item = u16>) -> u16 {
    let mut sum: u32 = 0;
    for w in words {
        sum += w as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

fn ipv4_checksum(header: &[u8]) -> u16 {
    checksum(header.chunks(2).map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)])))
}

fn tcp_checksum(src: Ipv4Addr, dst: Ipv4Addr, tcp_segment: &[u8]) -> u16 {
    let mut pseudo = Vec::with_capacity(12 + tcp_segment.len() + 1);
    pseudo.extend_from_slice(&src.octets());
    pseudo.extend_from_slice(&dst.octets());
    pseudo.push(0);
    pseudo.push(6); // TCP
    pseudo.extend_from_slice(&(tcp_segment.len() as u16).to_be_bytes());
    pseudo.extend_from_slice(tcp_segment);
    if pseudo.len() % 2 == 1 {
        pseudo.push(0);
    }
    checksum(pseudo.chunks(2).map(|c| u16::from_be_bytes([c[0], c[1]])))
}

impl ProbeModule for TcpSynScan {
    fn name(&self) -> &'static str {
        "tcp_synscan"
    }

    fn packet_length(&self) -> usize {
        40 // 20-byte IPv4 header + 20-byte TCP header, no options
    }

    fn success_index(&self) -> usize {
        8
    }

    fn app_success_index(&self) -> Option<usize> {
        None
    }

    fn thread_initialize(&self, _hw_mac: [u8; 6], _gw_mac: [u8; 6], _target_port: u16) -> ProbeThreadState {
        Box::new(())
    }

    fn make_packet(
        &self,
        buf: &mut [u8],
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        validation: &ValidationVector,
        _stream_index: u8,
        _probe_state: &mut dyn Any,
    ) -> usize {
        let total_len = self.packet_length() as u16;
        let (ip, tcp) = buf.split_at_mut(20);
        let tcp = &mut tcp[..20];

        ip[0] = 0x45;
        ip[1] = 0;
        ip[2..4].copy_from_slice(&total_len.to_be_bytes());
        ip[4..6].copy_from_slice(&(Self::embedded_seed(validation) as u16).to_be_bytes()); // id
        ip[6..8].copy_from_slice(&0u16.to_be_bytes());
        ip[8] = 64; // ttl
        ip[9] = 6; // TCP
        ip[10..12].copy_from_slice(&0u16.to_be_bytes());
        ip[12..16].copy_from_slice(&src_ip.octets());
        ip[16..20].copy_from_slice(&dst_ip.octets());
        let csum = ipv4_checksum(ip);
        ip[10..12].copy_from_slice(&csum.to_be_bytes());

        let src_port = self.source_port_for(validation);
        tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&self.target_port.to_be_bytes());
        tcp[4..8].copy_from_slice(&Self::embedded_seed(validation).to_be_bytes());
        tcp[8..12].copy_from_slice(&0u32.to_be_bytes());
        tcp[12] = 5 << 4; // data offset, 5 words, no options
        tcp[13] = 0x02; // SYN
        tcp[14..16].copy_from_slice(&65535u16.to_be_bytes()); // window
        tcp[16..18].copy_from_slice(&0u16.to_be_bytes());
        tcp[18..20].copy_from_slice(&0u16.to_be_bytes());
        let tcp_csum = tcp_checksum(src_ip, dst_ip, tcp);
        tcp[16..18].copy_from_slice(&tcp_csum.to_be_bytes());

        40
    }

    fn validate_packet(&self, payload: &[u8], remaining: usize, validation: &ValidationVector) -> bool {
        if remaining < 20 {
            return false;
        }
        let Some(tcp) = TcpHeader::parse(payload) else { return false };
        let expected = Self::embedded_seed(validation);
        if tcp.syn() && tcp.ack() {
            tcp.ack_number().wrapping_sub(1) == expected
        } else if tcp.rst() {
            tcp.ack_number().wrapping_sub(1) == expected || tcp.sequence() == expected
        } else {
            false
        }
    }

    fn process_packet(&self, payload: &[u8], remaining: usize, fields: &mut FieldSet) {
        let Some(tcp) = TcpHeader::parse(payload) else { return };
        let (classification, success) = if remaining >= 20 && tcp.syn() && tcp.ack() {
            ("synack", true)
        } else if tcp.rst() {
            ("rst", false)
        } else {
            ("other", false)
        };
        fields.push("classification", FieldValue::Str(classification.to_string()));
        fields.push("sport", FieldValue::U64(tcp.src_port() as u64));
        fields.push("dport", FieldValue::U64(tcp.dst_port() as u64));
        fields.push("success", FieldValue::Bool(success));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_well_formed_syn_packet() {
        let probe = TcpSynScan::new(80, 40000, 60000);
        let mut buf = vec![0u8; probe.packet_length()];
        let validation: ValidationVector = [1u8; 16];
        let mut state = ();
        let n = probe.make_packet(
            &mut buf,
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(93, 184, 216, 34),
            &validation,
            0,
            &mut state,
        );
        assert_eq!(n, 40);
        assert_eq!(buf[9], 6); // protocol TCP
        assert_eq!(&buf[16..20], &[93, 184, 216, 34]);
        assert_eq!(buf[33], 0x02); // SYN flag byte within TCP header
    }

    #[test]
    fn synack_with_matching_ack_validates() {
        let probe = TcpSynScan::new(80, 40000, 60000);
        let validation: ValidationVector = [9u8; 16];
        let expected = TcpSynScan::embedded_seed(&validation);
        let mut tcp = vec![0u8; 20];
        tcp[8..12].copy_from_slice(&expected.wrapping_add(1).to_be_bytes());
        tcp[13] = 0x12; // SYN+ACK
        assert!(probe.validate_packet(&tcp, 20, &validation));
    }

    #[test]
    fn unrelated_ack_rejected() {
        let probe = TcpSynScan::new(80, 40000, 60000);
        let validation: ValidationVector = [9u8; 16];
        let mut tcp = vec![0u8; 20];
        tcp[8..12].copy_from_slice(&42u32.to_be_bytes());
        tcp[13] = 0x12;
        assert!(!probe.validate_packet(&tcp, 20, &validation));
    }
}
