//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → request.rs (request ID)
//!     → server.rs (forward to upstream backend)
//!     → offload (decide / execute / splice on the backend response)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{request_id, X_REQUEST_ID};
pub use server::HttpServer;
