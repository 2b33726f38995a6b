//! Offload proxy library.
//!
//! A reverse proxy that lets a backend hand a slow operation to another
//! service: when the backend response carries `Offload-*` control headers,
//! the proxy calls the offload target and serves its response instead.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod offload;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use offload::{OffloadError, OffloadPolicy, Offloader, Outcome};
