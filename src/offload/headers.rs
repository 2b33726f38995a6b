//! Header translation from a backend response to an offload request.
//!
//! # Rules
//! - `<prefix>X-<Name>: v` becomes `<Name>: v` (first value only)
//! - every other backend header is dropped
//! - `content-type` is inherited from the backend unless a custom header overrides it
//! - framing headers (`host`, `content-length`, `transfer-encoding`,
//!   `connection`, `trailer`) are never unwrapped; the client derives them
//!   from the request itself
//! - the backend header map is left empty

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRAILER,
    TRANSFER_ENCODING,
};

use super::policy::OffloadPolicy;

const FRAMING_HEADERS: [HeaderName; 5] = [HOST, CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION, TRAILER];

/// Drain `backend` and return the headers for the offload request.
pub fn translate_headers(backend: &mut HeaderMap, policy: &OffloadPolicy) -> HeaderMap {
    let backend = std::mem::take(backend);
    let prefix = policy.custom_header_prefix();

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        backend
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("")),
    );

    // Custom headers go in last so they win over the inherited content-type.
    for name in backend.keys() {
        let Some(unwrapped) = name.as_str().strip_prefix(prefix) else {
            continue;
        };
        let Some(value) = backend.get(name) else {
            continue;
        };
        match HeaderName::from_bytes(unwrapped.as_bytes()) {
            Ok(target) if FRAMING_HEADERS.contains(&target) => {
                tracing::warn!(header = %name, "Skipping custom offload header that would alter message framing");
            }
            Ok(target) => {
                headers.insert(target, value.clone());
            }
            Err(_) => {
                tracing::warn!(header = %name, "Skipping custom offload header with empty or invalid name");
            }
        }
    }

    headers
}
