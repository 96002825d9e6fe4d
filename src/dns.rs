use anyhow::Context;
use dns_lookup::{getaddrinfo, AddrFamily, AddrInfoHints, SockType};
use std::io;
use std::net::{IpAddr, SocketAddr};

use crate::icmp::AddressFamily;

/// Which address families the user allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilyPreference {
    /// IPv4 first, IPv6 if IPv4 resolution fails.
    #[default]
    Any,
    V4Only,
    V6Only,
}

/// One resolved address with the socket parameters it was resolved for.
/// The address keeps its IPv6 scope id, which link-local targets need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub address: SocketAddr,
    pub family: AddressFamily,
    pub socktype: i32,
    pub protocol: i32,
}

impl Candidate {
    /// Candidate for a raw ICMP socket of the address's family.
    pub fn raw(address: SocketAddr) -> Self {
        let family = AddressFamily::of(address.ip());
        Self {
            address,
            family,
            socktype: SockType::Raw.into(),
            protocol: family.protocol() as i32,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.address.ip()
    }
}

/// Resolves a host for a single address family.
pub trait FamilyLookup {
    fn lookup(&self, host: &str, family: AddressFamily) -> anyhow::Result<Vec<Candidate>>;
}

/// Blocking `getaddrinfo` lookup asking for raw ICMP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl FamilyLookup for SystemResolver {
    fn lookup(&self, host: &str, family: AddressFamily) -> anyhow::Result<Vec<Candidate>> {
        let hints = AddrInfoHints {
            socktype: SockType::Raw.into(),
            protocol: family.protocol() as i32,
            address: match family {
                AddressFamily::V4 => AddrFamily::Inet.into(),
                AddressFamily::V6 => AddrFamily::Inet6.into(),
            },
            flags: 0,
        };

        let candidates = getaddrinfo(Some(host), None, Some(hints))
            .map_err(io::Error::from)
            .context("getaddrinfo")?
            .map(|info| {
                info.map(|info| Candidate {
                    address: info.sockaddr,
                    family: AddressFamily::of(info.sockaddr.ip()),
                    socktype: info.socktype,
                    protocol: info.protocol,
                })
            })
            .collect::<io::Result<Vec<_>>>()
            .context("getaddrinfo")?;

        if candidates.is_empty() {
            return Err(anyhow::anyhow!("getaddrinfo: no {} addresses found for {}", family, host));
        }

        log::debug!("Resolved {} to {} {} candidate(s)", host, candidates.len(), family);
        Ok(candidates)
    }
}

/// Resolves `host` into raw-socket candidates, in resolver order.
pub async fn resolve_host(host: &str, preference: FamilyPreference) -> anyhow::Result<Vec<Candidate>> {
    let host = host.to_string();
    tokio::task::spawn_blocking(move || resolve_with(&SystemResolver, &host, preference)).await?
}

/// Applies the family preference on top of `resolver`. Literal addresses
/// never reach the resolver.
pub fn resolve_with<R: FamilyLookup>(
    resolver: &R,
    host: &str,
    preference: FamilyPreference,
) -> anyhow::Result<Vec<Candidate>> {
    // First try to parse as IP address
    if let Ok(ip) = host.parse::<IpAddr>() {
        return match (ip, preference) {
            (IpAddr::V4(_), FamilyPreference::V6Only) => {
                Err(anyhow::anyhow!("getaddrinfo: IPv4 address provided but IPv6 forced"))
            }
            (IpAddr::V6(_), FamilyPreference::V4Only) => {
                Err(anyhow::anyhow!("getaddrinfo: IPv6 address provided but IPv4 forced"))
            }
            _ => Ok(vec![Candidate::raw(SocketAddr::new(ip, 0))]),
        };
    }

    match preference {
        FamilyPreference::V4Only => resolver.lookup(host, AddressFamily::V4),
        FamilyPreference::V6Only => resolver.lookup(host, AddressFamily::V6),
        FamilyPreference::Any => match resolver.lookup(host, AddressFamily::V4) {
            Ok(candidates) => Ok(candidates),
            Err(e) => {
                log::debug!("IPv4 resolution of {} failed ({:#}), trying IPv6", host, e);
                resolver.lookup(host, AddressFamily::V6)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers IPv6 lookups only and records every family asked for.
    struct Ipv6OnlyResolver {
        asked: Mutex<Vec<AddressFamily>>,
    }

    impl Ipv6OnlyResolver {
        fn new() -> Self {
            Self {
                asked: Mutex::new(Vec::new()),
            }
        }

        fn asked(&self) -> Vec<AddressFamily> {
            self.asked.lock().unwrap().clone()
        }
    }

    impl FamilyLookup for Ipv6OnlyResolver {
        fn lookup(&self, host: &str, family: AddressFamily) -> anyhow::Result<Vec<Candidate>> {
            self.asked.lock().unwrap().push(family);
            match family {
                AddressFamily::V4 => Err(anyhow::anyhow!("getaddrinfo: no IPv4 addresses found for {}", host)),
                AddressFamily::V6 => Ok(vec![Candidate::raw("[2001:db8::9]:0".parse().unwrap())]),
            }
        }
    }

    #[test]
    fn test_any_falls_back_to_ipv6() {
        let resolver = Ipv6OnlyResolver::new();
        let candidates = resolve_with(&resolver, "v6.example", FamilyPreference::Any).unwrap();

        assert_eq!(resolver.asked(), vec![AddressFamily::V4, AddressFamily::V6]);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].family, AddressFamily::V6);
        assert_eq!(candidates[0].ip(), "2001:db8::9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_v4_only_does_not_fall_back() {
        let resolver = Ipv6OnlyResolver::new();
        let err = resolve_with(&resolver, "v6.example", FamilyPreference::V4Only).unwrap_err();

        assert_eq!(resolver.asked(), vec![AddressFamily::V4]);
        assert!(format!("{:#}", err).starts_with("getaddrinfo: "));
    }

    #[test]
    fn test_literals_skip_the_resolver() {
        let resolver = Ipv6OnlyResolver::new();
        resolve_with(&resolver, "192.0.2.7", FamilyPreference::Any).unwrap();
        assert!(resolver.asked().is_empty());
    }

    #[tokio::test]
    async fn test_ipv4_literal() {
        let candidates = resolve_host("192.0.2.7", FamilyPreference::Any).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].ip(), "192.0.2.7".parse::<IpAddr>().unwrap());
        assert_eq!(candidates[0].family, AddressFamily::V4);
        assert_eq!(candidates[0].protocol, 1);
    }

    #[tokio::test]
    async fn test_ipv6_literal() {
        let candidates = resolve_host("2001:db8::7", FamilyPreference::V6Only).await.unwrap();
        assert_eq!(candidates[0].family, AddressFamily::V6);
        assert_eq!(candidates[0].protocol, 58);
    }

    #[tokio::test]
    async fn test_literal_respects_family_override() {
        assert!(resolve_host("192.0.2.7", FamilyPreference::V6Only).await.is_err());
        assert!(resolve_host("2001:db8::7", FamilyPreference::V4Only).await.is_err());
    }

    #[tokio::test]
    async fn test_scoped_link_local_keeps_scope_id() {
        let candidates = resolve_host("fe80::1%1", FamilyPreference::V6Only).await.unwrap();
        match candidates[0].address {
            SocketAddr::V6(addr) => {
                assert_eq!(*addr.ip(), "fe80::1".parse::<std::net::Ipv6Addr>().unwrap());
                assert_eq!(addr.scope_id(), 1);
            }
            SocketAddr::V4(addr) => panic!("unexpected IPv4 candidate {}", addr),
        }
    }

    #[tokio::test]
    async fn test_localhost_resolution() {
        // Depends on the resolver configuration of the host running the tests
        match resolve_host("localhost", FamilyPreference::Any).await {
            Ok(candidates) => assert!(candidates.iter().all(|c| c.ip().is_loopback())),
            Err(e) => println!("localhost resolution failed: {:#}", e),
        }
    }
}
