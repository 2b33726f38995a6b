//! Offload request execution.
//!
//! # Responsibilities
//! - Send the offload request through an injected client
//! - Bound the whole exchange, response body included, with one deadline
//!
//! # Design Decisions
//! - No retries; a failed send yields no response
//! - Cancellation comes from the caller: dropping the future drops the
//!   outbound request

use std::future::Future;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::{stream, StreamExt};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time::{self, Instant};

use super::decision::OffloadRequest;
use super::error::{BoxError, OffloadError};

/// HTTP client capability used to reach the offload target.
pub trait OffloadClient: Send + Sync {
    /// Send `request` and resolve once response headers have arrived.
    fn send(
        &self,
        request: Request<Body>,
    ) -> impl Future<Output = Result<Response<Body>, BoxError>> + Send;
}

/// Production client backed by hyper's pooled connector. Plain `http://` only.
#[derive(Clone)]
pub struct HyperOffloadClient {
    client: Client<HttpConnector, Body>,
}

impl HyperOffloadClient {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

impl OffloadClient for HyperOffloadClient {
    fn send(
        &self,
        request: Request<Body>,
    ) -> impl Future<Output = Result<Response<Body>, BoxError>> + Send {
        let pending = self.client.request(request);
        async move {
            let response: Response<Incoming> = pending.await.map_err(BoxError::from)?;
            Ok::<_, BoxError>(response.map(Body::new))
        }
    }
}

/// Send `request` via `client`. Headers and body must both arrive within `timeout`.
pub async fn execute<C: OffloadClient>(
    client: &C,
    request: OffloadRequest,
    timeout: Duration,
) -> Result<Response<Body>, OffloadError> {
    let deadline = Instant::now() + timeout;
    match time::timeout_at(deadline, client.send(request.into_request())).await {
        Ok(Ok(response)) => Ok(response.map(|body| bounded_body(body, deadline, timeout))),
        Ok(Err(e)) => Err(OffloadError::Transport(e)),
        Err(_) => Err(OffloadError::Timeout(timeout)),
    }
}

/// Ends the stream with an error once `deadline` passes.
fn bounded_body(body: Body, deadline: Instant, timeout: Duration) -> Body {
    let chunks = stream::unfold(Some(body.into_data_stream()), move |state| async move {
        let Some(mut data) = state else {
            return None;
        };
        match time::timeout_at(deadline, data.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(data))),
            Ok(Some(Err(e))) => Some((Err(BoxError::from(e)), None)),
            Ok(None) => None,
            Err(_) => {
                tracing::warn!(timeout = ?timeout, "Offload response body timed out");
                Some((Err(BoxError::from(OffloadError::Timeout(timeout))), None))
            }
        }
    });
    Body::from_stream(chunks)
}
