pub mod checksum;
pub mod family;
pub mod packet;
pub mod socket;

pub use checksum::compute_checksum;
pub use family::FamilyStrategy;
pub use packet::*;
pub use socket::*;

use std::net::IpAddr;

/// IANA protocol number carried in the IPv6 next-header field for ICMPv6.
pub const IPPROTO_ICMPV6: u8 = 58;
/// IANA protocol number for ICMP over IPv4.
pub const IPPROTO_ICMP: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    pub fn echo_request_type(self) -> u8 {
        match self {
            AddressFamily::V4 => ICMP_ECHO_REQUEST,
            AddressFamily::V6 => ICMPV6_ECHO_REQUEST,
        }
    }

    pub fn echo_reply_type(self) -> u8 {
        match self {
            AddressFamily::V4 => ICMP_ECHO_REPLY,
            AddressFamily::V6 => ICMPV6_ECHO_REPLY,
        }
    }

    pub fn protocol(self) -> u8 {
        match self {
            AddressFamily::V4 => IPPROTO_ICMP,
            AddressFamily::V6 => IPPROTO_ICMPV6,
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}
