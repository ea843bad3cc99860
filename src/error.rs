//! Error taxonomy for the proxy.
//!
//! Every variant except [`ProxyError::Bind`] is local to a single connection:
//! the handler logs it and closes the connection, the accept loop never sees it.

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::quota::DomainKey;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The opening request line could not be parsed. The connection is
    /// dropped without a response.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// DNS resolution or TCP connect to the origin failed.
    #[error("Upstream {target} unreachable: {source}")]
    UpstreamUnreachable {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The domain's quota was already exhausted when the request arrived.
    #[error("Usage over limit for {0}")]
    QuotaExceeded(DomainKey),

    /// The listening socket could not be bound. Fatal at startup.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MalformedRequest(_) => "malformed_request",
            ProxyError::UpstreamUnreachable { .. } => "upstream_unreachable",
            ProxyError::QuotaExceeded(_) => "quota_exceeded",
            ProxyError::Bind { .. } => "bind",
            ProxyError::Config(_) => "config",
            ProxyError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = ProxyError::UpstreamUnreachable {
            target: "example.com:443".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "Upstream example.com:443 unreachable: refused");
        assert_eq!(err.kind(), "upstream_unreachable");

        let err = ProxyError::QuotaExceeded(DomainKey::of("www.example.com"));
        assert_eq!(err.to_string(), "Usage over limit for example.com");
    }
}
