//! Offload decision and request construction.
//!
//! # Responsibilities
//! - Detect the offload marker on a backend response
//! - Resolve method and target URL from control headers
//! - Move the backend body onto the request when asked to forward it
//! - Translate headers (see [`headers`](super::headers))
//!
//! # Design Decisions
//! - All validation runs before the response is touched; a failed build
//!   leaves the backend response as it was
//! - The forwarded body is moved, never buffered

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Response, Uri};

use super::error::OffloadError;
use super::headers::translate_headers;
use super::policy::OffloadPolicy;

/// Result of inspecting a backend response.
#[derive(Debug)]
pub enum Decision {
    /// No offload requested; the response goes to the client as is.
    Passthrough,
    /// Send this request and splice its response in.
    Offload(OffloadRequest),
}

/// Request to be sent to the offload target.
#[derive(Debug)]
pub struct OffloadRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<Body>,
}

impl OffloadRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// True when the backend body is forwarded.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Convert into an `http::Request` ready for a client.
    pub fn into_request(self) -> Request<Body> {
        let mut request = Request::new(self.body.unwrap_or_else(Body::empty));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.headers_mut() = self.headers;
        request
    }
}

/// Inspect `response` and build the offload request it asks for.
///
/// Returns [`Decision::Passthrough`] without touching the response when the
/// marker header is absent.
pub fn decide(response: &mut Response<Body>, policy: &OffloadPolicy) -> Result<Decision, OffloadError> {
    let headers = response.headers();
    if !headers.contains_key(policy.requested_header()) {
        return Ok(Decision::Passthrough);
    }

    let method = headers
        .get(policy.method_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let method = resolve_method(method)?;

    let url = match headers.get(policy.url_header()) {
        Some(v) if !v.is_empty() => v.as_bytes(),
        _ => return Err(OffloadError::MissingUrl),
    };
    let uri = Uri::try_from(url).map_err(axum::http::Error::from)?;

    let forward_body = headers.contains_key(policy.forward_body_header());

    // Past this point nothing can fail; the response is consumed.
    let body = forward_body.then(|| std::mem::take(response.body_mut()));
    let headers = translate_headers(response.headers_mut(), policy);

    Ok(Decision::Offload(OffloadRequest {
        method,
        uri,
        headers,
        body,
    }))
}

/// Map a method header value onto one of the supported verbs.
pub fn resolve_method(value: &str) -> Result<Method, OffloadError> {
    match value.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "HEAD" => Ok(Method::HEAD),
        _ => Err(OffloadError::InvalidVerb),
    }
}
