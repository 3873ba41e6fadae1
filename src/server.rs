//! HTTP host for the agent.
//!
//! Every request on the listener, whatever its path or method, becomes an
//! outgoing-request event for the agent. The path and query are resolved
//! against the configured origin.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use reqwest::Url;
use tower_http::limit::RequestBodyLimitLayer;

use crate::agent::Agent;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::interceptor::Intercepted;
use crate::request::{CachedResponse, Request, parse_origin};

/// Header naming the branch that served a response.
pub const SOURCE_HEADER: &str = "x-precache-source";

/// Largest request body forwarded on a miss.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

struct AppState<F: Fetcher> {
    agent: Arc<Agent<F>>,
    origin: Url,
}

impl<F: Fetcher> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            agent: Arc::clone(&self.agent),
            origin: self.origin.clone(),
        }
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copies end-to-end headers, dropping hop-by-hop ones and anything in `extra`.
fn forwardable(headers: &HeaderMap, extra: &[HeaderName]) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) && !extra.contains(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Maps a request URI on the listener to the same path on the origin.
fn target_url(origin: &Url, uri: &Uri) -> Url {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url
}

fn into_response(intercepted: Intercepted) -> Response {
    let Intercepted { response, source } = intercepted;
    let CachedResponse {
        status,
        headers,
        body,
    } = response;

    let mut out = Response::new(Body::from(body));
    *out.status_mut() = status;
    *out.headers_mut() = forwardable(&headers, &[]);
    out.headers_mut()
        .insert(SOURCE_HEADER, HeaderValue::from_static(source.as_str()));
    out
}

async fn intercept<F: Fetcher + 'static>(
    State(state): State<AppState<F>>,
    request: axum::extract::Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Rejected request body for {}: {e}", parts.uri);
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
    };

    let request = Request {
        method: parts.method,
        url: target_url(&state.origin, &parts.uri),
        headers: forwardable(&parts.headers, &[header::HOST, header::CONTENT_LENGTH]),
        body,
    };

    match state.agent.handle_fetch(&request).await {
        Ok(intercepted) => {
            log::debug!(
                "{} {} served from {}",
                request.method,
                request.url,
                intercepted.source
            );
            into_response(intercepted)
        }
        Err(e) => {
            log::warn!("{} {} failed: {e}", request.method, request.url);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Builds a router that hands every request to `agent`.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the agent's origin does not parse.
pub fn router<F: Fetcher + 'static>(agent: Arc<Agent<F>>) -> Result<Router> {
    let origin = parse_origin(&agent.installer().config().origin)?;
    let state = AppState { agent, origin };

    Ok(Router::new()
        .fallback(intercept::<F>)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state))
}

/// Resolves on SIGINT or SIGTERM (systemd sends SIGTERM).
#[allow(clippy::missing_panics_doc)]
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        log::info!("Received SIGINT");
    }
}

/// Serves `agent` on the configured address until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if the address is invalid or the listener cannot bind.
pub async fn serve<F: Fetcher + 'static>(agent: Arc<Agent<F>>, config: &ServerConfig) -> Result<()> {
    let app = router(agent)?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("bind address {}:{}: {e}", config.host, config.port)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Shutdown complete");
    Ok(())
}
