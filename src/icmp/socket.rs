use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};

use crate::dns::Candidate;
use crate::icmp::AddressFamily;

/// Port used when probing the route to a target. Connecting a datagram
/// socket sends nothing.
const ROUTE_PROBE_PORT: u16 = 9;

/// Send/receive surface the echo cycle needs from a raw ICMP socket.
pub trait RawSocket {
    fn send_to(&self, packet: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Non-blocking receive; `WouldBlock` means nothing is queued yet.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Option<IpAddr>)>;
}

pub struct IcmpSocket {
    socket: Socket,
    family: AddressFamily,
}

impl IcmpSocket {
    /// Opens the socket a resolved candidate describes, in non-blocking mode.
    pub fn open(candidate: &Candidate) -> anyhow::Result<Self> {
        let domain = match candidate.family {
            AddressFamily::V4 => Domain::IPV4,
            AddressFamily::V6 => Domain::IPV6,
        };
        let socktype = Type::from(candidate.socktype);
        let protocol = Protocol::from(candidate.protocol);

        let socket = Socket::new(domain, socktype, Some(protocol)).context("socket")?;
        socket.set_nonblocking(true).context("set_nonblocking")?;

        Ok(Self {
            socket,
            family: candidate.family,
        })
    }

    /// Opens a socket for the first candidate that allows it.
    pub fn open_first(candidates: &[Candidate]) -> anyhow::Result<(Self, Candidate)> {
        let mut last_error = None;

        for candidate in candidates {
            log::debug!(
                "Trying {} (socktype {}, protocol {})",
                candidate.address,
                candidate.socktype,
                candidate.protocol
            );
            match Self::open(candidate) {
                Ok(socket) => return Ok((socket, candidate.clone())),
                Err(e) => {
                    log::debug!("Cannot open socket for {}: {:#}", candidate.address, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("socket: no candidate addresses")))
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }
}

impl RawSocket for IcmpSocket {
    fn send_to(&self, packet: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(packet, &target.into())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Option<IpAddr>)> {
        // SAFETY: an initialised byte slice is a valid `[MaybeUninit<u8>]`,
        // and recv_from only ever writes initialised bytes into it.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        let (received, addr) = self.socket.recv_from(uninit)?;
        Ok((received, addr.as_socket().map(|s| s.ip())))
    }
}

/// Local address the kernel would pick to reach `target`. The target's
/// IPv6 scope id is kept so link-local routes resolve.
pub fn probe_source_address(target: SocketAddr) -> Option<IpAddr> {
    let domain = match target {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let mut route = target;
    route.set_port(ROUTE_PROBE_PORT);

    let probe = || -> io::Result<IpAddr> {
        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.connect(&route.into())?;
        socket
            .local_addr()?
            .as_socket()
            .map(|addr| addr.ip())
            .ok_or_else(|| io::Error::other("not an inet address"))
    };

    match probe() {
        Ok(addr) => {
            log::debug!("Source address for {} is {}", target, addr);
            Some(addr)
        }
        Err(e) => {
            log::debug!("Cannot determine source address for {}: {}", target, e);
            None
        }
    }
}
