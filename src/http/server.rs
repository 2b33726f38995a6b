//! HTTP server setup and request forwarding.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, request timeout)
//! - Forward requests to the upstream backend
//! - Run every backend response through the offloader
//! - Apply offload policy reloads

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header::HOST, uri::PathAndQuery, Request, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::validation::{validate_config, ValidationError};
use crate::config::{ConfigError, ProxyConfig};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::observability::metrics;
use crate::offload::{HyperOffloadClient, OffloadPolicy, Offloader, Outcome};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Uri,
    pub offloader: Arc<Offloader<HyperOffloadClient>>,
}

/// HTTP server for the offload proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    offloader: Arc<Offloader<HyperOffloadClient>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let upstream: Uri = config.upstream.url.parse().map_err(|e| {
            ConfigError::Validation(vec![ValidationError::new(
                "upstream.url",
                format!("{e}"),
            )])
        })?;

        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let offloader = Arc::new(Offloader::new(
            HyperOffloadClient::new(connect_timeout),
            OffloadPolicy::from_config(&config.offload),
        ));

        let state = AppState {
            client,
            upstream,
            offloader: offloader.clone(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            offloader,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(propagate_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` replace the offload policy live.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            "HTTP server starting"
        );

        tokio::spawn(apply_config_updates(
            self.offloader.clone(),
            self.config.clone(),
            config_updates,
        ));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                // Closed: every trigger handle is gone, so shutdown can never be requested.
                if let Err(broadcast::error::RecvError::Closed) = shutdown.recv().await {
                    std::future::pending::<()>().await;
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn offloader(&self) -> &Arc<Offloader<HyperOffloadClient>> {
        &self.offloader
    }
}

async fn apply_config_updates(
    offloader: Arc<Offloader<HyperOffloadClient>>,
    running: ProxyConfig,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
) {
    while let Some(config) = updates.recv().await {
        if config.listener != running.listener
            || config.upstream != running.upstream
            || config.timeouts != running.timeouts
        {
            tracing::warn!("Listener, upstream and timeout changes take effect after a restart");
        }
        if config.offload.timeout_secs > running.timeouts.request_secs {
            tracing::warn!(
                offload_timeout_secs = config.offload.timeout_secs,
                request_timeout_secs = running.timeouts.request_secs,
                "Offload timeout exceeds the running request timeout"
            );
        }
        offloader.reload(OffloadPolicy::from_config(&config.offload));
    }
}

/// Main proxy handler.
/// Forwards to the upstream backend, then lets the offloader rewrite the response.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Proxying request"
    );

    let upstream_request = match upstream_request(&state.upstream, request) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
            metrics::record_request(&method, 502, start);
            return (StatusCode::BAD_GATEWAY, "Invalid upstream request").into_response();
        }
    };

    let mut response = match state.client.request(upstream_request).await {
        Ok(response) => Response::<Incoming>::map(response, Body::new),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_request(&method, 502, start);
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    match state.offloader.handle(&mut response).await {
        Ok(Outcome::Declined) => {}
        Ok(Outcome::Spliced { status }) => {
            tracing::info!(request_id = %request_id, status = %status, "Served offload response");
        }
        Err(e) => {
            // The backend response is dropped here; its body must never reach the client.
            if e.is_transport() {
                tracing::warn!(request_id = %request_id, error = %e, "Offload target failed");
            } else {
                tracing::error!(request_id = %request_id, error = %e, "Backend sent an invalid offload request");
            }
            let status = e.status_code();
            metrics::record_request(&method, status.as_u16(), start);
            return (status, "Offload request failed").into_response();
        }
    }

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

/// Rewrite a client request so it targets the upstream backend.
fn upstream_request(upstream: &Uri, request: Request<Body>) -> Result<Request<Body>, axum::http::Error> {
    let (mut parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    let mut uri = Uri::builder().path_and_query(path_and_query);
    if let Some(scheme) = upstream.scheme() {
        uri = uri.scheme(scheme.clone());
    }
    if let Some(authority) = upstream.authority() {
        uri = uri.authority(authority.clone());
    }

    parts.uri = uri.build()?;
    parts.version = Version::HTTP_11;
    parts.headers.remove(HOST);

    Ok(Request::from_parts(parts, body))
}
