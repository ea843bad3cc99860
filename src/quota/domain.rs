//! Registrable-domain keys for quota grouping.

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

/// The ledger key for a host: its last two dot-separated labels.
///
/// `foo.bar.example.com` and `example.com` share the key `example.com`.
/// Single-label hosts and IP literals are keyed by the whole host, which
/// degrades grouping to per-address tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DomainKey(String);

impl DomainKey {
    pub fn of(host: &str) -> Self {
        let host = host.trim_end_matches('.');
        if host.parse::<IpAddr>().is_ok() {
            return Self(host.to_string());
        }

        let key = match host.rfind('.') {
            Some(tld_dot) => {
                let sld_start = host[..tld_dot].rfind('.').map_or(0, |dot| dot + 1);
                &host[sld_start..]
            }
            None => host,
        };
        Self(key.to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
