//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy handler and offloader produce:
//!     → logging.rs (structured tracing events, request ID as a field)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
