use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::net::Ipv6Addr;

use crate::icmp::{AddressFamily, IPPROTO_ICMPV6};

pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMPV6_ECHO_REQUEST: u8 = 128;
pub const ICMPV6_ECHO_REPLY: u8 = 129;

pub const ICMP_HEADER_SIZE: usize = 8;
pub const MIN_IP_HEADER_SIZE: usize = 20;
pub const MAX_IP_HEADER_SIZE: usize = 60;
pub const IPV6_PSEUDO_HEADER_SIZE: usize = 40;

/// An ICMP / ICMPv6 echo message. Used for outgoing requests and as the
/// parsed view of a reply; all fields are in host byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpPacket {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl IcmpPacket {
    /// Echo request with a zeroed checksum field.
    pub fn new_echo_request(family: AddressFamily, identifier: u16, sequence: u16, payload: Vec<u8>) -> Self {
        Self {
            icmp_type: family.echo_request_type(),
            code: 0,
            checksum: 0,
            identifier,
            sequence,
            payload,
        }
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        if data.len() < ICMP_HEADER_SIZE {
            return Err(anyhow::anyhow!("ICMP packet too short: {} bytes", data.len()));
        }

        let mut cursor = Cursor::new(data);
        let icmp_type = cursor.read_u8()?;
        let code = cursor.read_u8()?;
        let checksum = cursor.read_u16::<BigEndian>()?;
        let identifier = cursor.read_u16::<BigEndian>()?;
        let sequence = cursor.read_u16::<BigEndian>()?;

        let mut payload = Vec::new();
        cursor.read_to_end(&mut payload)?;

        Ok(Self {
            icmp_type,
            code,
            checksum,
            identifier,
            sequence,
            payload,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.wire_len());
        bytes.push(self.icmp_type);
        bytes.push(self.code);
        bytes.extend_from_slice(&self.checksum.to_be_bytes());
        bytes.extend_from_slice(&self.identifier.to_be_bytes());
        bytes.extend_from_slice(&self.sequence.to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Wire bytes with the checksum field zeroed, the input every checksum
    /// computation and verification starts from.
    pub fn checksum_input(&self) -> Vec<u8> {
        let mut bytes = self.to_bytes();
        bytes[2] = 0;
        bytes[3] = 0;
        bytes
    }

    pub fn wire_len(&self) -> usize {
        ICMP_HEADER_SIZE + self.payload.len()
    }

    pub fn is_echo_reply(&self, family: AddressFamily) -> bool {
        self.icmp_type == family.echo_reply_type() && self.code == 0
    }
}

/// IPv6 pseudo-header (RFC 8200 §8.1). Only ever fed to the checksum,
/// never transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6PseudoHeader {
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub payload_length: u32,
    pub next_header: u8,
}

impl Ipv6PseudoHeader {
    pub fn for_icmpv6(source: Ipv6Addr, destination: Ipv6Addr, payload_length: usize) -> Self {
        Self {
            source,
            destination,
            payload_length: payload_length as u32,
            next_header: IPPROTO_ICMPV6,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(IPV6_PSEUDO_HEADER_SIZE);
        bytes.extend_from_slice(&self.source.octets());
        bytes.extend_from_slice(&self.destination.octets());
        bytes.extend_from_slice(&self.payload_length.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.push(self.next_header);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_request_layout() {
        let packet = IcmpPacket::new_echo_request(AddressFamily::V4, 0x1234, 7, vec![0; 20]);
        let bytes = packet.to_bytes();

        assert_eq!(bytes.len(), 28);
        assert_eq!(&bytes[..8], &[ICMP_ECHO_REQUEST, 0, 0, 0, 0x12, 0x34, 0x00, 0x07]);
        assert!(bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_echo_request_type_follows_family() {
        let v6 = IcmpPacket::new_echo_request(AddressFamily::V6, 1, 1, Vec::new());
        assert_eq!(v6.icmp_type, ICMPV6_ECHO_REQUEST);
        assert_eq!(v6.code, 0);
        assert_eq!(v6.wire_len(), ICMP_HEADER_SIZE);
    }

    #[test]
    fn test_from_bytes_reads_network_order() {
        let data = [ICMP_ECHO_REPLY, 0, 0xAB, 0xCD, 0x01, 0x02, 0xFF, 0xFE, 0x61, 0x62];
        let packet = IcmpPacket::from_bytes(&data).unwrap();

        assert_eq!(packet.checksum, 0xABCD);
        assert_eq!(packet.identifier, 0x0102);
        assert_eq!(packet.sequence, 0xFFFE);
        assert_eq!(packet.payload, b"ab");
        assert!(packet.is_echo_reply(AddressFamily::V4));
        assert!(!packet.is_echo_reply(AddressFamily::V6));
    }

    #[test]
    fn test_from_bytes_rejects_truncated_header() {
        assert!(IcmpPacket::from_bytes(&[0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_checksum_input_zeroes_field_only() {
        let mut packet = IcmpPacket::new_echo_request(AddressFamily::V4, 9, 3, vec![1, 2, 3]);
        packet.checksum = 0xBEEF;

        let input = packet.checksum_input();
        assert_eq!(&input[2..4], &[0, 0]);
        assert_eq!(packet.checksum, 0xBEEF);
        assert_eq!(&input[4..], &packet.to_bytes()[4..]);
    }

    #[test]
    fn test_nonzero_code_is_not_echo_reply() {
        let mut packet = IcmpPacket::new_echo_request(AddressFamily::V6, 1, 1, Vec::new());
        packet.icmp_type = ICMPV6_ECHO_REPLY;
        packet.code = 1;
        assert!(!packet.is_echo_reply(AddressFamily::V6));
    }

    #[test]
    fn test_pseudo_header_layout() {
        let source: Ipv6Addr = "fe80::1".parse().unwrap();
        let destination: Ipv6Addr = "2001:db8::2".parse().unwrap();
        let bytes = Ipv6PseudoHeader::for_icmpv6(source, destination, 28).to_bytes();

        assert_eq!(bytes.len(), IPV6_PSEUDO_HEADER_SIZE);
        assert_eq!(&bytes[..16], &source.octets());
        assert_eq!(&bytes[16..32], &destination.octets());
        assert_eq!(&bytes[32..36], &[0, 0, 0, 28]);
        assert_eq!(&bytes[36..39], &[0, 0, 0]);
        assert_eq!(bytes[39], IPPROTO_ICMPV6);
    }
}
