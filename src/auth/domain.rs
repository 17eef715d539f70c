// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hostname normalization and classification.
//!
//! Classification is purely suffix-based. The suffix table is operationally
//! owned by the identity platform, so it is configuration
//! ([`DomainSuffixes`]) rather than a hard-coded list; [`Default`] holds the
//! current one.

use std::sync::LazyLock;

use serde::Serialize;
use url::Url;

/// The DNS label every CNAME-based frontend API host starts with.
pub const CLERK_PREFIX: &str = "clerk.";

/// Hosts under the managed accounts domain are never CNAME-prefixed.
pub const MANAGED_ACCOUNTS_MARKER: &str = ".clerk.accounts";

static DEFAULT_SUFFIXES: LazyLock<DomainSuffixes> = LazyLock::new(DomainSuffixes::default);

/// Environment a hostname belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    Production,
    Staging,
    Development,
    Local,
}

impl DomainKind {
    /// Everything except production is served by a development instance.
    pub fn is_production(&self) -> bool {
        matches!(self, DomainKind::Production)
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainClassification {
    pub kind: DomainKind,
    /// Lowercased host, scheme/path/trailing dot removed, port kept.
    pub canonical_host: String,
}

/// Suffix table used for classification.
///
/// Entries are bare domains (no leading dot). A host matches an entry when it
/// equals it or ends with `.` + entry. Lists are checked local, then
/// staging, then development.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSuffixes {
    pub local: Vec<String>,
    pub staging: Vec<String>,
    pub development: Vec<String>,
}

impl Default for DomainSuffixes {
    fn default() -> Self {
        fn owned(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            local: owned(&["localhost", "127.0.0.1", "lcl.dev", "lclstage.dev", "lclclerk.com"]),
            staging: owned(&["accountsstage.dev", "clerkstage.dev", "stgstage.dev", "stg.dev"]),
            development: owned(&["accounts.dev"]),
        }
    }
}

impl DomainSuffixes {
    /// The built-in table.
    pub fn builtin() -> &'static DomainSuffixes {
        &DEFAULT_SUFFIXES
    }

    /// Classify a hostname against this table.
    pub fn classify(&self, hostname: &str) -> DomainClassification {
        let canonical_host = canonical_host(hostname);
        let (host, _) = split_port(&canonical_host);

        let kind = if matches_any(host, &self.local) {
            DomainKind::Local
        } else if matches_any(host, &self.staging) {
            DomainKind::Staging
        } else if matches_any(host, &self.development) {
            DomainKind::Development
        } else {
            DomainKind::Production
        };

        DomainClassification {
            kind,
            canonical_host,
        }
    }
}

/// Classify a hostname against the default suffix table.
pub fn classify(hostname: &str) -> DomainClassification {
    DomainSuffixes::builtin().classify(hostname)
}

/// Normalize a host or URL-ish string down to `host[:port]`.
pub fn canonical_host(input: &str) -> String {
    let mut host = input.trim();
    if let Some((_, rest)) = host.split_once("://") {
        host = rest;
    }
    if let Some(end) = host.find(['/', '?', '#']) {
        host = &host[..end];
    }
    if let Some((_, rest)) = host.rsplit_once('@') {
        host = rest;
    }

    let (name, port) = split_port(host);
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    match port {
        Some(port) => format!("{name}:{port}"),
        None => name,
    }
}

/// Ensure the hostname carries exactly one leading `clerk.` label.
///
/// Hosts under the managed accounts domain are returned unchanged, and a
/// chain of `clerk.` labels collapses to a single prefix. Idempotent.
pub fn add_clerk_prefix(hostname: &str) -> String {
    if hostname.is_empty() {
        return String::new();
    }
    if hostname.to_ascii_lowercase().contains(MANAGED_ACCOUNTS_MARKER) {
        return hostname.to_string();
    }

    let prefix_len = CLERK_PREFIX.len();
    let mut rest = hostname;
    while rest.len() >= prefix_len
        && rest.as_bytes()[..prefix_len].eq_ignore_ascii_case(CLERK_PREFIX.as_bytes())
    {
        rest = &rest[prefix_len..];
    }

    format!("{CLERK_PREFIX}{rest}")
}

/// True when `host` is `domain` or one of its subdomains. Ports are ignored.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = canonical_host(host);
    let domain = canonical_host(domain);
    let (host, _) = split_port(&host);
    let (domain, _) = split_port(&domain);

    if domain.is_empty() {
        return false;
    }
    host == domain || is_label_suffix(host, domain)
}

/// True when the `Origin` header names the same host and port as the request.
///
/// Missing ports default from `proto` (the forwarded proto when known,
/// otherwise the origin's own scheme).
pub fn same_origin(origin: &str, host: &str, proto: Option<&str>) -> bool {
    let Ok(origin) = Url::parse(origin) else {
        return false;
    };
    let Some(origin_host) = origin.host_str() else {
        return false;
    };

    let host = canonical_host(host);
    let (host_name, host_port) = split_port(&host);
    let proto = proto.unwrap_or(origin.scheme());
    let host_port = host_port
        .and_then(|p| p.parse::<u16>().ok())
        .or_else(|| default_port(proto));

    origin_host.eq_ignore_ascii_case(host_name) && origin.port_or_known_default() == host_port
}

/// Split `host[:port]`, understanding bracketed IPv6 literals.
pub(crate) fn split_port(host: &str) -> (&str, Option<&str>) {
    if host.starts_with('[') {
        if let Some(end) = host.find(']') {
            let port = host[end + 1..].strip_prefix(':');
            return (&host[..=end], port.filter(|p| !p.is_empty()));
        }
        return (host, None);
    }

    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (name, Some(port))
        }
        _ => (host, None),
    }
}

fn default_port(proto: &str) -> Option<u16> {
    match proto.trim().to_ascii_lowercase().as_str() {
        "https" | "wss" => Some(443),
        "http" | "ws" => Some(80),
        _ => None,
    }
}

fn matches_any(host: &str, suffixes: &[String]) -> bool {
    suffixes.iter().any(|suffix| {
        let suffix = suffix.trim_start_matches('.');
        !suffix.is_empty() && (host == suffix || is_label_suffix(host, suffix))
    })
}

fn is_label_suffix(host: &str, suffix: &str) -> bool {
    host.len() > suffix.len()
        && host.ends_with(suffix)
        && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
}
