//! Offload protocol header names and executor settings.
//!
//! Every control header shares one prefix (default `Offload-`):
//!
//! | Header                  | Effect                                          |
//! |-------------------------|-------------------------------------------------|
//! | `<prefix>Requested`     | presence enables the offload path               |
//! | `<prefix>Method`        | GET, POST or HEAD (case-insensitive)            |
//! | `<prefix>Url`           | offload target, used verbatim                   |
//! | `<prefix>Forward-Body`  | presence forwards the backend body              |
//! | `<prefix>X-<Name>`      | unwrapped to `<Name>` on the offload request    |

use std::time::Duration;

use crate::config::OffloadConfig;

/// Default header prefix.
pub const DEFAULT_HEADER_PREFIX: &str = "Offload-";

/// Default time to wait for the offload target's response headers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable offload settings shared by every intercepted response.
///
/// Header names are stored lowercase, the form `HeaderMap` keeps them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadPolicy {
    enabled: bool,
    timeout: Duration,
    requested: String,
    method: String,
    url: String,
    forward_body: String,
    custom_prefix: String,
}

impl OffloadPolicy {
    /// Create a policy for the given header prefix.
    pub fn new(prefix: &str, timeout: Duration) -> Self {
        let prefix = prefix.to_ascii_lowercase();
        Self {
            enabled: true,
            timeout,
            requested: format!("{prefix}requested"),
            method: format!("{prefix}method"),
            url: format!("{prefix}url"),
            forward_body: format!("{prefix}forward-body"),
            custom_prefix: format!("{prefix}x-"),
        }
    }

    /// Build the policy described by the `[offload]` config section.
    pub fn from_config(config: &OffloadConfig) -> Self {
        Self::new(&config.header_prefix, Duration::from_secs(config.timeout_secs))
            .with_enabled(config.enabled)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn requested_header(&self) -> &str {
        &self.requested
    }

    pub fn method_header(&self) -> &str {
        &self.method
    }

    pub fn url_header(&self) -> &str {
        &self.url
    }

    pub fn forward_body_header(&self) -> &str {
        &self.forward_body
    }

    /// Prefix of headers unwrapped onto the offload request.
    pub fn custom_header_prefix(&self) -> &str {
        &self.custom_prefix
    }
}

impl Default for OffloadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_HEADER_PREFIX, DEFAULT_TIMEOUT)
    }
}
