//! Configuration validation.
//!
//! Returns all validation errors, not just the first. Runs before a config
//! is accepted into the system.

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut fail = |field: &'static str, message: String| {
        errors.push(ValidationError { field, message });
    };

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        fail(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        );
    }
    if config.listener.backlog == 0 {
        fail("listener.backlog", "must be greater than 0".into());
    }
    if config.listener.buffer_size == 0 {
        fail("listener.buffer_size", "must be greater than 0".into());
    }

    let timeouts = [
        ("timeouts.idle_secs", config.timeouts.idle_secs),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.first_read_secs", config.timeouts.first_read_secs),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            fail(field, "must be greater than 0".into());
        }
    }

    if config.quotas.limits_mb.keys().any(|domain| domain.trim().is_empty()) {
        fail("quotas.limits_mb", "domain names must not be empty".into());
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        fail(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let mut config = ProxyConfig::default();
        config.timeouts.idle_secs = 0;
        config.timeouts.first_read_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["timeouts.idle_secs", "timeouts.first_read_secs"]);
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.metrics_address");
    }

    #[test]
    fn blank_quota_domain_is_rejected() {
        let mut config = ProxyConfig::default();
        config.quotas.limits_mb.insert("  ".into(), 10);
        assert!(validate_config(&config).is_err());
    }
}
