//! Host classification: decides whether a host literal is safe to contact.
//!
//! Classification is a pure function of the string. No DNS lookup is ever
//! made, so an ordinary hostname that resolves to a private address is
//! reported as [`HostVerdict::Public`].
//!
//! Rules are evaluated in a fixed order:
//!
//! 1. literal blocklist (`localhost`, `[::1]`, `[::]`)
//! 2. bracketed IPv6 literals: IPv4-mapped (re-classified as IPv4), 6to4,
//!    Teredo, NAT64, documentation, multicast, link-local, unique-local,
//!    loopback, unspecified, then IPv4-compatible (re-classified as IPv4)
//! 3. everything else against the IPv4 pattern table, which also covers the
//!    IETF special-purpose blocks and catches octal, hexadecimal, decimal and
//!    short-form encodings

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::Ipv6Net;
use once_cell::sync::Lazy;
use regex::Regex;

/// Literals restricted regardless of policy, compared case-insensitively.
const ALWAYS_BLOCKED: &[(&str, &str)] = &[
    ("localhost", "localhost"),
    ("[::1]", "IPv6 loopback"),
    ("[::]", "IPv6 unspecified address"),
];

/// IPv4 patterns in priority order. The literal is matched as text so that
/// encodings some resolvers expand into an address are caught too.
const IPV4_PATTERNS: &[(&str, &str)] = &[
    (r"^127\.", "IPv4 loopback (127.0.0.0/8)"),
    (r"^10\.", "private IPv4 range (10.0.0.0/8)"),
    (r"^172\.(1[6-9]|2\d|3[01])\.", "private IPv4 range (172.16.0.0/12)"),
    (r"^192\.168\.", "private IPv4 range (192.168.0.0/16)"),
    (r"^169\.254\.", "IPv4 link-local (169.254.0.0/16)"),
    (
        r"^100\.(6[4-9]|[7-9]\d|1[01]\d|12[0-7])\.",
        "shared address space (100.64.0.0/10)",
    ),
    (r"^0\.", "this network (0.0.0.0/8)"),
    (r"^192\.0\.0\.", "IETF protocol assignments (192.0.0.0/24)"),
    (r"^192\.0\.2\.", "documentation range (192.0.2.0/24)"),
    (r"^198\.1[89]\.", "benchmarking range (198.18.0.0/15)"),
    (r"^198\.51\.100\.", "documentation range (198.51.100.0/24)"),
    (r"^203\.0\.113\.", "documentation range (203.0.113.0/24)"),
    (r"^(22[4-9]|23\d)\.", "IPv4 multicast (224.0.0.0/4)"),
    (r"^(24\d|25[0-5])\.", "reserved IPv4 range (240.0.0.0/4)"),
    (r"^(\d+\.)*0\d+(\.\d+)*$", "octal-encoded IPv4"),
    (
        r"^((0x[0-9a-f]*|\d+)\.)*0x[0-9a-f]*(\.(0x[0-9a-f]*|\d+))*$",
        "hex-encoded IPv4",
    ),
    (r"^\d+$", "decimal-encoded IPv4"),
    (r"^\d+\.\d+(\.\d+)?$", "short-form IPv4"),
];

/// IPv6 prefixes in priority order.
const IPV6_PREFIXES: &[(&str, &str)] = &[
    ("2002::/16", "6to4 tunnel"),
    ("2001::/32", "Teredo tunnel"),
    // NAT64 gateways translate the low 32 bits to any IPv4 address
    ("64:ff9b::/96", "NAT64 prefix"),
    ("64:ff9b:1::/48", "NAT64 local-use prefix"),
    ("2001:db8::/32", "IPv6 documentation range"),
    ("100::/64", "IPv6 discard-only range"),
    ("ff00::/8", "IPv6 multicast"),
    ("fe80::/10", "IPv6 link-local"),
    ("fc00::/7", "IPv6 unique-local"),
    ("::1/128", "IPv6 loopback"),
    ("::/128", "IPv6 unspecified address"),
];

struct Rule<P> {
    pattern: P,
    reason: &'static str,
}

static IPV4_RULES: Lazy<Vec<Rule<Regex>>> = Lazy::new(|| {
    IPV4_PATTERNS
        .iter()
        .map(|&(pattern, reason)| Rule {
            pattern: Regex::new(pattern).expect("static IPv4 pattern"),
            reason,
        })
        .collect()
});

static IPV6_RULES: Lazy<Vec<Rule<Ipv6Net>>> = Lazy::new(|| {
    IPV6_PREFIXES
        .iter()
        .map(|&(cidr, reason)| Rule {
            pattern: cidr.parse().expect("static IPv6 prefix"),
            reason,
        })
        .collect()
});

/// Outcome of classifying one host literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostVerdict {
    /// No rule matched.
    Public,
    /// A rule matched; carries the rule's name.
    Restricted(String),
}

impl HostVerdict {
    pub fn is_public(&self) -> bool {
        matches!(self, HostVerdict::Public)
    }

    /// The matched rule, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            HostVerdict::Public => None,
            HostVerdict::Restricted(reason) => Some(reason),
        }
    }

    fn restricted(reason: impl Into<String>) -> Self {
        HostVerdict::Restricted(reason.into())
    }
}

/// Classify the host part of a URL as public or restricted.
///
/// `host` is taken as URL parsing returns it: IPv6 literals keep their
/// brackets (`[::1]`), everything else is treated as a possible IPv4 literal.
pub fn classify(host: &str) -> HostVerdict {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if host.is_empty() {
        return HostVerdict::restricted("empty host");
    }

    if let Some(&(_, reason)) = ALWAYS_BLOCKED.iter().find(|(literal, _)| *literal == host) {
        return HostVerdict::restricted(reason);
    }

    if let Some(bare) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        return classify_ipv6(bare);
    }

    classify_ipv4(&host)
}

/// Match a hostname against a blocklist. Entries also block their subdomains.
///
/// Returns the entry that matched.
pub fn is_hostname_blocked<'a>(host: &str, blocked: &'a BTreeSet<String>) -> Option<&'a str> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    blocked
        .iter()
        .find(|entry| {
            host == entry.as_str()
                || host
                    .strip_suffix(entry.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
        .map(String::as_str)
}

fn classify_ipv4(literal: &str) -> HostVerdict {
    IPV4_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(literal))
        .map_or(HostVerdict::Public, |rule| HostVerdict::restricted(rule.reason))
}

fn classify_ipv6(bare: &str) -> HostVerdict {
    let Ok(ip) = bare.parse::<Ipv6Addr>() else {
        return HostVerdict::restricted("malformed IPv6 literal");
    };

    if let Some(v4) = ip.to_ipv4_mapped() {
        return classify_embedded(v4, "IPv4-mapped");
    }

    if let Some(rule) = IPV6_RULES.iter().find(|rule| rule.pattern.contains(&ip)) {
        return HostVerdict::restricted(rule.reason);
    }

    if let Some(v4) = ipv4_compatible(ip) {
        return classify_embedded(v4, "IPv4-compatible");
    }

    HostVerdict::Public
}

fn classify_embedded(v4: Ipv4Addr, label: &str) -> HostVerdict {
    match classify_ipv4(&v4.to_string()) {
        HostVerdict::Public => HostVerdict::Public,
        HostVerdict::Restricted(reason) => {
            HostVerdict::restricted(format!("{} {}: {}", label, v4, reason))
        }
    }
}

/// Deprecated `::a.b.c.d` form: first 96 bits zero.
/// `::` and `::1` are matched earlier by the prefix table.
fn ipv4_compatible(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let segments = ip.segments();
    if segments[..6] != [0; 6] {
        return None;
    }
    Some(Ipv4Addr::new(
        (segments[6] >> 8) as u8,
        segments[6] as u8,
        (segments[7] >> 8) as u8,
        segments[7] as u8,
    ))
}
