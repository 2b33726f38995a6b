//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{uri::Scheme, HeaderName, Uri};

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if let Err(message) = check_upstream_url(&config.upstream.url) {
        errors.push(ValidationError::new("upstream.url", message));
    }

    let prefix = &config.offload.header_prefix;
    if prefix.is_empty() {
        errors.push(ValidationError::new("offload.header_prefix", "must not be empty"));
    } else if HeaderName::from_bytes(format!("{prefix}Requested").as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "offload.header_prefix",
            format!("'{prefix}' contains characters not allowed in header names"),
        ));
    }

    if config.offload.timeout_secs == 0 {
        errors.push(ValidationError::new("offload.timeout_secs", "must be greater than 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    // The handler waits for offload response headers under the request timeout.
    if config.timeouts.request_secs < config.offload.timeout_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            format!(
                "{}s is shorter than offload.timeout_secs ({}s)",
                config.timeouts.request_secs, config.offload.timeout_secs
            ),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_upstream_url(url: &str) -> Result<(), String> {
    let uri: Uri = url.parse().map_err(|e| format!("'{url}': {e}"))?;
    if uri.scheme() != Some(&Scheme::HTTP) {
        return Err(format!("'{url}' must use the http scheme"));
    }
    if uri.authority().is_none() {
        return Err(format!("'{url}' has no host"));
    }
    match uri.path_and_query().map(|pq| pq.as_str()) {
        None | Some("/") => Ok(()),
        Some(_) => Err(format!("'{url}' must not carry a path or query")),
    }
}
