use anyhow::Context;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use crate::icmp::{
    AddressFamily, FamilyStrategy, IcmpPacket, RawSocket, ICMP_HEADER_SIZE, MAX_IP_HEADER_SIZE,
};
use crate::report::Reporter;
use crate::utils::Shutdown;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_micros(1_000_000);
pub const REQUEST_INTERVAL: Duration = Duration::from_secs(1);
/// Zero-filled payload giving the classic 28-byte echo message.
pub const DEFAULT_PAYLOAD_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to wait for a matching reply.
    pub timeout: Duration,
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    pub payload_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: REQUEST_INTERVAL,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

/// State kept across echo cycles. Only the sequence number changes.
#[derive(Debug, Clone)]
pub struct Session {
    pub identifier: u16,
    pub sequence: u16,
    pub family: AddressFamily,
    /// Keeps the IPv6 scope id the resolver returned.
    pub target: SocketAddr,
    /// Local address, when known. Feeds the ICMPv6 pseudo-header.
    pub source: Option<IpAddr>,
    pub config: SessionConfig,
}

impl Session {
    pub fn new(target: SocketAddr, source: Option<IpAddr>, identifier: u16, config: SessionConfig) -> Self {
        Self {
            identifier,
            sequence: 0,
            family: AddressFamily::of(target.ip()),
            target,
            source,
            config,
        }
    }

    pub fn advance(&mut self) {
        self.sequence = self.sequence.wrapping_add(1);
    }
}

/// A matched echo reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoReply {
    pub source: IpAddr,
    pub sequence: u16,
    pub latency: Duration,
    /// Checksum carried by the reply.
    pub checksum: u16,
    /// Checksum recomputed locally.
    pub expected_checksum: u16,
}

impl EchoReply {
    pub fn checksum_mismatch(&self) -> bool {
        self.checksum != self.expected_checksum
    }
}

/// How an echo cycle ended. None of these stop the session.
#[derive(Debug)]
pub enum CycleOutcome {
    Reply(EchoReply),
    TimedOut { elapsed: Duration },
    ConnectionClosed,
    ReceiveFailed(io::Error),
}

/// Drives echo cycles over one raw socket.
pub struct Pinger<S> {
    socket: S,
    session: Session,
    strategy: FamilyStrategy,
}

impl<S: RawSocket> Pinger<S> {
    pub fn new(socket: S, session: Session) -> Self {
        let strategy = FamilyStrategy::for_target(session.target.ip(), session.source);
        Self {
            socket,
            session,
            strategy,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs cycles until `shutdown` fires. Only a failed send ends it early.
    pub async fn run_forever(&mut self, reporter: &mut dyn Reporter, shutdown: &mut Shutdown) -> anyhow::Result<()> {
        loop {
            if shutdown.is_triggered() {
                return Ok(());
            }

            self.run_cycle(reporter).await?;

            tokio::select! {
                _ = tokio::time::sleep(self.session.config.interval) => {}
                _ = shutdown.triggered() => return Ok(()),
            }

            self.session.advance();
        }
    }

    /// One send/await cycle for the current sequence number.
    pub async fn run_cycle(&mut self, reporter: &mut dyn Reporter) -> anyhow::Result<CycleOutcome> {
        let request = self.build_request();
        let target = self.session.target;

        log::debug!("Sending ICMP packet to {}: {} bytes", target, request.len());
        self.socket.send_to(&request, target).context("sendto")?;
        reporter.request_sent(target.ip(), self.session.sequence);

        let outcome = self.await_reply().await;
        reporter.outcome(&outcome);
        Ok(outcome)
    }

    fn build_request(&self) -> Vec<u8> {
        let mut packet = IcmpPacket::new_echo_request(
            self.session.family,
            self.session.identifier,
            self.session.sequence,
            vec![0; self.session.config.payload_size],
        );
        packet.checksum = self.strategy.checksum.request_checksum(&packet.checksum_input());
        packet.to_bytes()
    }

    async fn await_reply(&self) -> CycleOutcome {
        let capacity = MAX_IP_HEADER_SIZE + ICMP_HEADER_SIZE + self.session.config.payload_size;
        let mut buf = vec![0u8; capacity];
        let timeout = self.session.config.timeout;
        let start = Instant::now();

        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((0, _)) => return CycleOutcome::ConnectionClosed,
                Ok((received, sender)) => {
                    log::debug!("Received {} bytes from {:?}", received, sender);
                    if let Some(packet) = self.match_reply(&buf[..received]) {
                        let latency = start.elapsed();
                        return CycleOutcome::Reply(self.verify(packet, sender, latency));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return CycleOutcome::ReceiveFailed(e),
            }

            let elapsed = start.elapsed();
            if elapsed > timeout {
                return CycleOutcome::TimedOut { elapsed };
            }

            tokio::task::yield_now().await;
        }
    }

    /// Parses `datagram` and returns it if it answers the in-flight request.
    fn match_reply(&self, datagram: &[u8]) -> Option<IcmpPacket> {
        let Some(offset) = self.strategy.header_skip.icmp_offset(datagram) else {
            log::debug!("Discarding datagram with malformed IP header");
            return None;
        };

        let packet = match IcmpPacket::from_bytes(&datagram[offset..]) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("Discarding datagram: {}", e);
                return None;
            }
        };

        if packet.identifier != self.session.identifier
            || !packet.is_echo_reply(self.strategy.family)
            || packet.sequence != self.session.sequence
        {
            log::debug!(
                "Ignoring ICMP type {} code {} id {} seq {}",
                packet.icmp_type,
                packet.code,
                packet.identifier,
                packet.sequence
            );
            return None;
        }

        Some(packet)
    }

    fn verify(&self, packet: IcmpPacket, sender: Option<IpAddr>, latency: Duration) -> EchoReply {
        let source = sender.unwrap_or(self.session.target.ip());
        let expected_checksum = self
            .strategy
            .checksum
            .reply_checksum(&packet.checksum_input(), source);

        EchoReply {
            source,
            sequence: packet.sequence,
            latency,
            checksum: packet.checksum,
            expected_checksum,
        }
    }
}
