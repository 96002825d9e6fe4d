use clap::{Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::time::Duration;

use crate::dns::FamilyPreference;
use crate::pinger::{SessionConfig, DEFAULT_PAYLOAD_SIZE, DEFAULT_TIMEOUT, REQUEST_INTERVAL};

/// Long options that are also accepted with a single dash (`-ip4`).
const SINGLE_DASH_LONGS: &[&str] = &["ip4", "ip6", "ttl", "size"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingArgs {
    pub target: String,
    pub family: FamilyPreference,
    pub timeout: Duration,
    pub payload_size: usize,
}

impl PingArgs {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            timeout: self.timeout,
            interval: REQUEST_INTERVAL,
            payload_size: self.payload_size,
        }
    }
}

pub fn build_cli() -> Command {
    Command::new("icmpecho")
        .version("0.1.0")
        .about("Send ICMP echo requests to a host and report each reply")
        .override_usage("icmpecho [-ip4] [-ip6] [-ttl <milliseconds>] [-size <bytes>] <target_host>")
        .arg(
            Arg::new("target")
                .help("Target hostname or IP address")
                .required(true)
                .index(1)
        )
        .arg(
            Arg::new("ip4")
                .long("ip4")
                .help("Use IPv4 only")
                .action(ArgAction::SetTrue)
                .conflicts_with("ip6")
        )
        .arg(
            Arg::new("ip6")
                .long("ip6")
                .help("Use IPv6 only")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("ttl")
                .long("ttl")
                .help("Timeout in milliseconds to wait for each reply")
                .value_name("milliseconds")
                .value_parser(clap::value_parser!(u64).range(1..))
        )
        .arg(
            Arg::new("size")
                .long("size")
                .help("Echo payload size in bytes")
                .value_name("bytes")
                .value_parser(clap::value_parser!(u32).range(0..=65500))
        )
}

/// Rewrites `-ip4`-style options into the `--ip4` form clap understands.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-').filter(|rest| !rest.starts_with('-')) else {
                return arg;
            };
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            if SINGLE_DASH_LONGS.contains(&name) {
                OsString::from(format!("-{}", text))
            } else {
                arg
            }
        })
        .collect()
}

pub fn args_from_matches(matches: &ArgMatches) -> anyhow::Result<PingArgs> {
    let target = matches
        .get_one::<String>("target")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing target host"))?;

    // `ip4` conflicts with `ip6`, so at most one flag is set.
    let family = if matches.get_flag("ip4") {
        FamilyPreference::V4Only
    } else if matches.get_flag("ip6") {
        FamilyPreference::V6Only
    } else {
        FamilyPreference::Any
    };

    let timeout = matches
        .get_one::<u64>("ttl")
        .map_or(DEFAULT_TIMEOUT, |ms| Duration::from_millis(*ms));

    let payload_size = matches
        .get_one::<u32>("size")
        .map_or(DEFAULT_PAYLOAD_SIZE, |size| *size as usize);

    Ok(PingArgs {
        target,
        family,
        timeout,
        payload_size,
    })
}

/// Parses the process arguments; usage errors exit through clap.
pub fn parse_args() -> anyhow::Result<PingArgs> {
    let matches = build_cli().get_matches_from(normalize_args(std::env::args_os()));
    args_from_matches(&matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<PingArgs> {
        let matches = build_cli().try_get_matches_from(normalize_args(args.iter().copied()))?;
        args_from_matches(&matches)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["icmpecho", "example.org"]).unwrap();
        assert_eq!(args.target, "example.org");
        assert_eq!(args.family, FamilyPreference::Any);
        assert_eq!(args.timeout, Duration::from_micros(1_000_000));
        assert_eq!(args.payload_size, 20);
        assert_eq!(args.session_config(), SessionConfig::default());
    }

    #[test]
    fn test_single_dash_options() {
        let args = parse(&["icmpecho", "-ip6", "-ttl", "250", "::1"]).unwrap();
        assert_eq!(args.family, FamilyPreference::V6Only);
        assert_eq!(args.timeout, Duration::from_millis(250));
        assert_eq!(args.target, "::1");

        let args = parse(&["icmpecho", "-ip4", "-size=56", "192.0.2.1"]).unwrap();
        assert_eq!(args.family, FamilyPreference::V4Only);
        assert_eq!(args.payload_size, 56);
    }

    #[test]
    fn test_double_dash_options() {
        let args = parse(&["icmpecho", "--ttl", "5", "host"]).unwrap();
        assert_eq!(args.timeout, Duration::from_millis(5));
        assert_eq!(args.session_config().timeout, Duration::from_millis(5));
    }

    #[test]
    fn test_families_are_exclusive() {
        assert!(parse(&["icmpecho", "-ip4", "-ip6", "host"]).is_err());

        let err = build_cli()
            .try_get_matches_from(normalize_args(["icmpecho", "-ip6", "-ip4", "host"]))
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_usage_errors() {
        assert!(parse(&["icmpecho"]).is_err());
        assert!(parse(&["icmpecho", "-ttl", "0", "host"]).is_err());
        assert!(parse(&["icmpecho", "-ttl", "soon", "host"]).is_err());
        assert!(parse(&["icmpecho", "-size", "70000", "host"]).is_err());
    }

    #[test]
    fn test_normalize_leaves_other_args_alone() {
        let args = normalize_args(["icmpecho", "-ip4", "--ip6", "-x", "-ttlx", "host"]);
        assert_eq!(args, vec!["icmpecho", "--ip4", "--ip6", "-x", "-ttlx", "host"]);
    }
}
