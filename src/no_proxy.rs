//! `NO_PROXY` bypass list

use std::net::IpAddr;

use ipnet::IpNet;

use crate::{
    text::{eq_ignore_case, trim_trailing},
    Environment,
};

/// Decides whether a resolved proxy may be used for a given target host.
///
/// A `false` answer discards the proxy whatever resolution produced.
pub trait ProxyPolicy {
    fn is_proxy_permitted_for_host(&self, host: &str) -> bool;
}

impl<F: Fn(&str) -> bool> ProxyPolicy for F {
    fn is_proxy_permitted_for_host(&self, host: &str) -> bool {
        self(host)
    }
}

/**
Hosts that must be reached directly

Parsed from a comma-separated list such as `localhost,.corp.example,10.0.0.1:8080`:
- `*` alone bypasses the proxy for every host
- IP addresses and CIDR blocks (`10.0.0.0/8`, `fd00::/8`) match target IP literals inside them
- any other entry matches the host itself and all of its subdomains, a leading `.` or `*.` is ignored
- a `:port` suffix on an entry is ignored
- matching is ASCII case-insensitive, IPv6 brackets are stripped
*/
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoProxy {
    everything: bool,
    networks: Vec<IpNet>,
    domains: Vec<String>,
}

impl NoProxy {
    /// Read `NO_PROXY` from `env`; empty when unset
    pub fn from_env(env: &Environment) -> Self {
        env.lookup("NO_PROXY").map(Self::parse).unwrap_or_default()
    }

    pub fn parse(list: &str) -> Self {
        let mut no_proxy = Self::default();
        for entry in list.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            if entry == "*" {
                no_proxy.everything = true;
                continue;
            }
            if let Ok(network) = entry.parse::<IpNet>() {
                no_proxy.networks.push(network);
                continue;
            }
            let host = strip_port(entry);
            if let Ok(ip) = unbracket(host).parse::<IpAddr>() {
                no_proxy.networks.push(IpNet::from(ip));
                continue;
            }
            let domain = host
                .trim_start_matches("*.")
                .trim_start_matches('.')
                .to_ascii_lowercase();
            if !domain.is_empty() {
                no_proxy.domains.push(domain);
            }
        }
        no_proxy
    }

    pub fn is_empty(&self) -> bool {
        !self.everything && self.networks.is_empty() && self.domains.is_empty()
    }

    pub fn matches(&self, host: &str) -> bool {
        if self.everything {
            return true;
        }
        if let Ok(ip) = unbracket(host).parse::<IpAddr>() {
            return self.networks.iter().any(|network| network.contains(&ip));
        }
        let host = trim_trailing(host, ".").to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            eq_ignore_case(&host, domain)
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }
}

impl ProxyPolicy for NoProxy {
    fn is_proxy_permitted_for_host(&self, host: &str) -> bool {
        !self.matches(host)
    }
}

fn unbracket(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|host| host.strip_suffix(']'))
        .unwrap_or(host)
}

fn strip_port(entry: &str) -> &str {
    if let Some(rest) = entry.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }
    match entry.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host,
        _ => entry,
    }
}
