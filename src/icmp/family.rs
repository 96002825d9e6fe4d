//! Address-family specific behavior, chosen once per session.

use std::net::{IpAddr, Ipv6Addr};

use crate::icmp::{
    compute_checksum, AddressFamily, Ipv6PseudoHeader, MAX_IP_HEADER_SIZE, MIN_IP_HEADER_SIZE,
};

/// How the checksum of an ICMP message is computed for one address family.
///
/// `message` is the full ICMP message with its checksum field zeroed.
pub trait ChecksumStrategy {
    /// Checksum for a message we send to the target.
    fn request_checksum(&self, message: &[u8]) -> u16;

    /// Expected checksum for a message received from `sender`.
    fn reply_checksum(&self, message: &[u8], sender: IpAddr) -> u16;
}

/// Locates the ICMP message inside a datagram handed up by the raw socket.
pub trait HeaderSkipStrategy {
    /// Offset of the ICMP message, or `None` if the datagram is malformed.
    fn icmp_offset(&self, datagram: &[u8]) -> Option<usize>;
}

/// ICMPv4 checksums cover the message only.
pub struct Icmpv4Checksum;

impl ChecksumStrategy for Icmpv4Checksum {
    fn request_checksum(&self, message: &[u8]) -> u16 {
        compute_checksum(message)
    }

    fn reply_checksum(&self, message: &[u8], _sender: IpAddr) -> u16 {
        compute_checksum(message)
    }
}

/// ICMPv6 checksums cover a pseudo-header followed by the message.
pub struct Icmpv6Checksum {
    pub local: Ipv6Addr,
    pub target: Ipv6Addr,
}

impl Icmpv6Checksum {
    fn with_pseudo_header(source: Ipv6Addr, destination: Ipv6Addr, message: &[u8]) -> u16 {
        let mut data = Ipv6PseudoHeader::for_icmpv6(source, destination, message.len()).to_bytes();
        data.extend_from_slice(message);
        compute_checksum(&data)
    }
}

impl ChecksumStrategy for Icmpv6Checksum {
    fn request_checksum(&self, message: &[u8]) -> u16 {
        Self::with_pseudo_header(self.local, self.target, message)
    }

    fn reply_checksum(&self, message: &[u8], sender: IpAddr) -> u16 {
        let source = match sender {
            IpAddr::V6(addr) => addr,
            IpAddr::V4(_) => self.target,
        };
        Self::with_pseudo_header(source, self.local, message)
    }
}

/// Raw IPv4 sockets deliver the IP header; its length is the low nibble of
/// the first byte in 32-bit words.
pub struct Ipv4HeaderSkip;

impl HeaderSkipStrategy for Ipv4HeaderSkip {
    fn icmp_offset(&self, datagram: &[u8]) -> Option<usize> {
        let first = *datagram.first()?;
        let header_len = (first & 0x0F) as usize * 4;
        if !(MIN_IP_HEADER_SIZE..=MAX_IP_HEADER_SIZE).contains(&header_len) || datagram.len() < header_len {
            return None;
        }
        Some(header_len)
    }
}

/// Raw ICMPv6 sockets deliver the ICMP message without the IPv6 header.
pub struct Ipv6HeaderSkip;

impl HeaderSkipStrategy for Ipv6HeaderSkip {
    fn icmp_offset(&self, _datagram: &[u8]) -> Option<usize> {
        Some(0)
    }
}

pub struct FamilyStrategy {
    pub family: AddressFamily,
    pub checksum: Box<dyn ChecksumStrategy>,
    pub header_skip: Box<dyn HeaderSkipStrategy>,
}

impl FamilyStrategy {
    /// Strategy pair for talking to `target`. `source` is the local address
    /// used in the IPv6 pseudo-header; the unspecified address stands in when
    /// it is unknown.
    pub fn for_target(target: IpAddr, source: Option<IpAddr>) -> Self {
        match target {
            IpAddr::V4(_) => Self {
                family: AddressFamily::V4,
                checksum: Box::new(Icmpv4Checksum),
                header_skip: Box::new(Ipv4HeaderSkip),
            },
            IpAddr::V6(target) => {
                let local = match source {
                    Some(IpAddr::V6(addr)) => addr,
                    _ => {
                        log::warn!("IPv6 source address unknown, checksums use {} in the pseudo-header", Ipv6Addr::UNSPECIFIED);
                        Ipv6Addr::UNSPECIFIED
                    }
                };
                Self {
                    family: AddressFamily::V6,
                    checksum: Box::new(Icmpv6Checksum { local, target }),
                    header_skip: Box::new(Ipv6HeaderSkip),
                }
            }
        }
    }
}
