//! Request-scoped middleware: client identity, per-route quota gates, and
//! structured request logging.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::limiter::SlidingWindowLimiter;

use super::error::ServerError;
use super::state::ServerState;

/// Rate-limit subject for one request.
///
/// Taken from the trusted proxy header when present, otherwise the peer
/// address. Falling back to the raw connection address is a deployment
/// decision: behind a proxy that strips `CF-Connecting-IP`, every client
/// would share the proxy's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

pub fn client_identity(request: &Request) -> ClientIdentity {
    let from_header = request
        .headers()
        .get("cf-connecting-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let identity = from_header
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_owned());
    ClientIdentity(identity)
}

async fn enforce_quota(
    limiter: &SlidingWindowLimiter,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let identity = client_identity(&request);
    if !limiter.allow(&identity.0) {
        tracing::warn!(identity = %identity.0, "request rejected by quota");
        return Err(ServerError::RateLimitExceeded);
    }
    Ok(next.run(request).await)
}

/// Quota gate for the embed endpoint.
pub async fn embed_quota(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    enforce_quota(&state.embed_quota, request, next).await
}

/// Quota gate for the detect endpoint.
pub async fn detect_quota(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    enforce_quota(&state.detect_quota, request, next).await
}

/// Structured request logging.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        "request completed"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn identity_prefers_the_proxy_header() {
        let request = Request::builder()
            .header("cf-connecting-ip", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_identity(&request), ClientIdentity("203.0.113.9".into()));
    }

    #[test]
    fn identity_falls_back_to_the_peer_address() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        let peer: SocketAddr = "198.51.100.4:55012".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(client_identity(&request), ClientIdentity("198.51.100.4".into()));
    }

    #[test]
    fn identity_without_header_or_peer_is_unknown() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_identity(&request), ClientIdentity("unknown".into()));
    }
}
