//! Response offloading subsystem.
//!
//! # Data Flow
//! ```text
//! Backend response
//!     → decision.rs (marker? method, URL, body, headers → OffloadRequest)
//!     → executor.rs (send via OffloadClient, bounded by timeout)
//!     → splice.rs (overwrite status, headers, body in place)
//!     → back to the proxy, which streams the response to the client
//!
//! Per invocation:
//!     Start → Declined
//!           → BuildingRequest → BuildFailed
//!                             → Executing → Spliced | ExecutionFailed
//! ```
//!
//! # Design Decisions
//! - Two-phase API: `decide` reads, `splice` overwrites via `&mut`
//! - The HTTP client is injected, never global
//! - Policy lives behind `ArcSwap` so config reloads need no lock
//! - Errors are returned untouched; the caller must not serve the backend body

pub mod decision;
pub mod error;
pub mod executor;
pub mod headers;
pub mod policy;
pub mod splice;

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{Response, StatusCode};

pub use decision::{decide, resolve_method, Decision, OffloadRequest};
pub use error::{BoxError, OffloadError};
pub use executor::{execute, HyperOffloadClient, OffloadClient};
pub use headers::translate_headers;
pub use policy::OffloadPolicy;
pub use splice::splice;

use crate::observability::metrics;

/// What happened to an intercepted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Passed through unmodified.
    Declined,
    /// Replaced by the offload target's response.
    Spliced { status: StatusCode },
}

/// Response interception hook: decides, executes and splices.
pub struct Offloader<C> {
    client: C,
    policy: ArcSwap<OffloadPolicy>,
}

impl<C: OffloadClient> Offloader<C> {
    pub fn new(client: C, policy: OffloadPolicy) -> Self {
        Self {
            client,
            policy: ArcSwap::from_pointee(policy),
        }
    }

    /// Current policy snapshot.
    pub fn policy(&self) -> Arc<OffloadPolicy> {
        self.policy.load_full()
    }

    /// Swap in a new policy; responses already in flight keep the old one.
    pub fn reload(&self, policy: OffloadPolicy) {
        tracing::info!(
            enabled = policy.enabled(),
            timeout = ?policy.timeout(),
            "Offload policy reloaded"
        );
        self.policy.store(Arc::new(policy));
    }

    /// Process one backend response in place.
    ///
    /// On `Ok`, `response` holds exactly what the client must receive. On
    /// `Err`, the caller must not serve `response`.
    pub async fn handle(&self, response: &mut Response<Body>) -> Result<Outcome, OffloadError> {
        let result = self.run(response).await;
        match &result {
            Ok(Outcome::Declined) => metrics::record_offload("declined"),
            Ok(Outcome::Spliced { .. }) => metrics::record_offload("spliced"),
            Err(e) => metrics::record_offload(e.label()),
        }
        result
    }

    async fn run(&self, response: &mut Response<Body>) -> Result<Outcome, OffloadError> {
        let policy = self.policy.load_full();
        if !policy.enabled() {
            return Ok(Outcome::Declined);
        }

        let request = match decide(response, &policy)? {
            Decision::Passthrough => return Ok(Outcome::Declined),
            Decision::Offload(request) => request,
        };

        tracing::debug!(
            method = %request.method(),
            url = %request.uri(),
            forward_body = request.has_body(),
            "Offloading backend response"
        );

        let start = Instant::now();
        let offloaded = execute(&self.client, request, policy.timeout()).await?;
        let status = offloaded.status();
        metrics::record_offload_duration(start);

        splice(response, offloaded);
        Ok(Outcome::Spliced { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use axum::http::{HeaderName, HeaderValue, Method, Request};

    type Respond = Box<dyn Fn(Request<Body>) -> Result<Response<Body>, BoxError> + Send + Sync>;

    /// Client that records calls and answers from a closure.
    struct MockClient {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        respond: Respond,
    }

    impl MockClient {
        fn new(respond: Respond) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let client = Self {
                calls: calls.clone(),
                delay: Duration::ZERO,
                respond,
            };
            (client, calls)
        }
    }

    impl OffloadClient for MockClient {
        fn send(
            &self,
            request: Request<Body>,
        ) -> impl Future<Output = Result<Response<Body>, BoxError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = (self.respond)(request);
            let delay = self.delay;
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
        }
    }

    fn ok_response(status: StatusCode, body: &'static str) -> Respond {
        Box::new(move |_| {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert("offloadserver-header", HeaderValue::from_static("1"));
            Ok(response)
        })
    }

    fn backend_response(headers: &[(&str, &str)], body: &'static str) -> Response<Body> {
        let mut response = Response::new(Body::from(body));
        for (k, v) in headers {
            response.headers_mut().append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        response
    }

    #[tokio::test]
    async fn test_declines_without_marker() {
        let (client, calls) = MockClient::new(ok_response(StatusCode::OK, "offloaded"));
        let offloader = Offloader::new(client, OffloadPolicy::default());
        let mut response = backend_response(&[("X-Backend", "1")], "backend");

        let outcome = offloader.handle(&mut response).await.unwrap();

        assert_eq!(outcome, Outcome::Declined);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(response.headers().get("x-backend").unwrap(), "1");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"backend");
    }

    #[tokio::test]
    async fn test_splices_offload_response() {
        let (client, calls) = MockClient::new(Box::new(|request: Request<Body>| {
            assert_eq!(request.method(), Method::POST);
            assert_eq!(request.uri().to_string(), "http://offload.local/work");
            assert_eq!(request.headers().get("foo").unwrap(), "bar");
            assert!(request.headers().get("ignore-header").is_none());
            let mut response = Response::new(Body::from("offloaded"));
            *response.status_mut() = StatusCode::CREATED;
            Ok(response)
        }));
        let offloader = Offloader::new(client, OffloadPolicy::default());
        let mut response = backend_response(
            &[
                ("Offload-Requested", "1"),
                ("Offload-Method", "post"),
                ("Offload-Url", "http://offload.local/work"),
                ("Offload-X-Foo", "bar"),
                ("Ignore-Header", "1"),
            ],
            "backend",
        );

        let outcome = offloader.handle(&mut response).await.unwrap();

        assert_eq!(outcome, Outcome::Spliced { status: StatusCode::CREATED });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("ignore-header").is_none());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"offloaded");
    }

    #[tokio::test]
    async fn test_missing_method_never_calls_client() {
        let (client, calls) = MockClient::new(ok_response(StatusCode::OK, "offloaded"));
        let offloader = Offloader::new(client, OffloadPolicy::default());
        let mut response = backend_response(
            &[("Offload-Requested", "1"), ("Offload-Url", "http://offload.local/")],
            "backend",
        );

        let err = offloader.handle(&mut response).await.unwrap_err();

        assert!(matches!(err, OffloadError::InvalidVerb));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let (client, calls) = MockClient::new(Box::new(|_| Err("connection refused".into())));
        let offloader = Offloader::new(client, OffloadPolicy::default());
        let mut response = backend_response(
            &[
                ("Offload-Requested", "1"),
                ("Offload-Method", "GET"),
                ("Offload-Url", "http://offload.local/"),
            ],
            "backend",
        );

        let err = offloader.handle(&mut response).await.unwrap_err();

        assert!(matches!(err, OffloadError::Transport(_)));
        assert!(err.is_transport());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let (mut client, _calls) = MockClient::new(ok_response(StatusCode::OK, "late"));
        client.delay = Duration::from_secs(5);
        let policy = OffloadPolicy::default().with_timeout(Duration::from_millis(50));
        let offloader = Offloader::new(client, policy);
        let mut response = backend_response(
            &[
                ("Offload-Requested", "1"),
                ("Offload-Method", "GET"),
                ("Offload-Url", "http://offload.local/"),
            ],
            "backend",
        );

        let err = offloader.handle(&mut response).await.unwrap_err();

        assert!(matches!(err, OffloadError::Timeout(d) if d == Duration::from_millis(50)));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_disabled_policy_declines() {
        let (client, calls) = MockClient::new(ok_response(StatusCode::OK, "offloaded"));
        let offloader = Offloader::new(client, OffloadPolicy::default().with_enabled(false));
        let mut response = backend_response(
            &[
                ("Offload-Requested", "1"),
                ("Offload-Method", "GET"),
                ("Offload-Url", "http://offload.local/"),
            ],
            "backend",
        );

        let outcome = offloader.handle(&mut response).await.unwrap();

        assert_eq!(outcome, Outcome::Declined);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(response.headers().get("offload-requested").unwrap(), "1");
    }

    #[tokio::test]
    async fn test_reload_switches_prefix() {
        let (client, calls) = MockClient::new(ok_response(StatusCode::OK, "offloaded"));
        let offloader = Offloader::new(client, OffloadPolicy::default());
        offloader.reload(OffloadPolicy::new("Delegate-", Duration::from_secs(5)));
        assert_eq!(offloader.policy().url_header(), "delegate-url");

        let mut old_style = backend_response(
            &[
                ("Offload-Requested", "1"),
                ("Offload-Method", "GET"),
                ("Offload-Url", "http://offload.local/"),
            ],
            "backend",
        );
        assert_eq!(offloader.handle(&mut old_style).await.unwrap(), Outcome::Declined);

        let mut new_style = backend_response(
            &[
                ("Delegate-Requested", "1"),
                ("Delegate-Method", "GET"),
                ("Delegate-Url", "http://offload.local/"),
            ],
            "backend",
        );
        let outcome = offloader.handle(&mut new_style).await.unwrap();
        assert_eq!(outcome, Outcome::Spliced { status: StatusCode::OK });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
