mod cli;
mod dns;
mod icmp;
mod pinger;
mod report;
mod utils;

use icmp::IcmpSocket;
use pinger::{Pinger, Session};
use report::ConsoleReporter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Enable debug logging if RUST_LOG is set
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    }

    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => utils::exit_with_error(&format!("{:#}", e), 1),
    };

    let candidates = match dns::resolve_host(&args.target, args.family).await {
        Ok(candidates) => candidates,
        Err(e) => utils::exit_with_error(&format!("{:#}", e), 1),
    };

    let (socket, candidate) = match IcmpSocket::open_first(&candidates) {
        Ok(opened) => opened,
        Err(e) => utils::exit_with_error(&format!("{:#}", e), 1),
    };
    log::debug!("Using {} socket for {}", socket.family(), candidate.ip());

    // Best effort: the ICMPv6 pseudo-header wants the real source address.
    let source = icmp::probe_source_address(candidate.address);

    let session = Session::new(
        candidate.address,
        source,
        utils::generate_identifier(),
        args.session_config(),
    );
    let mut pinger = Pinger::new(socket, session);
    log::debug!(
        "Identifier {:#06x}, timeout {:?}",
        pinger.session().identifier,
        pinger.session().config.timeout
    );

    let mut shutdown = utils::setup_signal_handler();
    let mut reporter = ConsoleReporter;

    if let Err(e) = pinger.run_forever(&mut reporter, &mut shutdown).await {
        utils::exit_with_error(&format!("{:#}", e), 1);
    }
}
