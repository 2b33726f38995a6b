//! Response splicing.

use axum::body::Body;
use axum::http::Response;

/// Replace status, headers and body of `response` with those of `offload`.
///
/// Nothing the backend set survives; this is a replace, not a merge.
pub fn splice(response: &mut Response<Body>, offload: Response<Body>) {
    let (parts, body) = offload.into_parts();
    *response.status_mut() = parts.status;
    *response.headers_mut() = parts.headers;
    *response.body_mut() = body;
}
