use std::net::IpAddr;
use std::time::Duration;

use crate::pinger::{CycleOutcome, EchoReply};

/// Receives one notification per sent request and one per cycle outcome.
pub trait Reporter {
    fn request_sent(&mut self, target: IpAddr, sequence: u16);
    fn outcome(&mut self, outcome: &CycleOutcome);
}

/// Prints one line per event, replies and timeouts on stdout and receive
/// errors on stderr.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn request_sent(&mut self, target: IpAddr, _sequence: u16) {
        println!("{}", format_request(target));
    }

    fn outcome(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::ReceiveFailed(e) => eprintln!("recvfrom: {}", e),
            CycleOutcome::TimedOut { elapsed } => {
                log::debug!("Gave up after {:?}", elapsed);
                println!("{}", format_outcome(outcome));
            }
            other => println!("{}", format_outcome(other)),
        }
    }
}

pub fn format_request(target: IpAddr) -> String {
    format!("Sent ICMP echo request to {}", target)
}

pub fn format_reply(reply: &EchoReply) -> String {
    let mut line = format!(
        "Received ICMP echo reply from {}: seq={}, time={} ms",
        reply.source,
        reply.sequence,
        format_latency(reply.latency)
    );
    if reply.checksum_mismatch() {
        line.push_str(&format!(
            " (incorrect checksum: {:x} != {:x})",
            reply.checksum, reply.expected_checksum
        ));
    }
    line
}

pub fn format_outcome(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Reply(reply) => format_reply(reply),
        CycleOutcome::TimedOut { .. } => "Request timed out".to_string(),
        CycleOutcome::ConnectionClosed => "Connection closed".to_string(),
        CycleOutcome::ReceiveFailed(e) => format!("recvfrom: {}", e),
    }
}

/// Milliseconds with microsecond resolution.
pub fn format_latency(latency: Duration) -> String {
    format!("{:.3}", latency.as_micros() as f64 / 1000.0)
}
