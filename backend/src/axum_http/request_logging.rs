use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header::USER_AGENT},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use tracing::{error, info, warn};

use crate::config::config_model::RequestLogging;

pub const X_REQUEST_ID: &str = "x-request-id";

/// One access log line per request. Optionally carries the head of the request body.
pub async fn log_requests(
    State(settings): State<Arc<RequestLogging>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    let request_id = header_str(&request, X_REQUEST_ID);
    let user_agent = header_str(&request, USER_AGENT.as_str());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();

    let (request, body) = if settings.log_body {
        let (parts, body) = request.into_parts();
        // The body limit layer sits outside this middleware, so this read is bounded.
        let bytes = match to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(err) if exceeds_body_limit(&err) => {
                warn!(%request_id, %method, %path, error = %err, "http: request body over limit");
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
            Err(err) => {
                warn!(%request_id, %method, %path, error = %err, "http: failed to read request body");
                return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
            }
        };
        let logged = preview(&bytes, settings.max_body_bytes);
        (Request::from_parts(parts, Body::from(bytes)), logged)
    } else {
        (request, String::new())
    };

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        error!(
            %request_id,
            %method,
            %path,
            %query,
            status,
            latency_ms,
            %client_ip,
            %user_agent,
            %body,
            "http_request"
        );
    } else {
        info!(
            %request_id,
            %method,
            %path,
            %query,
            status,
            latency_ms,
            %client_ip,
            %user_agent,
            %body,
            "http_request"
        );
    }

    response
}

/// True when the body limit layer cut the stream short (no content-length to reject up front).
fn exceeds_body_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}

fn header_str(request: &Request, name: &str) -> String {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Lossy UTF-8 view of at most `max` bytes.
fn preview(bytes: &[u8], max: usize) -> String {
    let end = bytes.len().min(max);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limited_body_errors_are_recognised() {
        let limited = http_body_util::Limited::new(Body::from(vec![b'x'; 64]), 16);
        let err = to_bytes(Body::new(limited), usize::MAX).await.unwrap_err();
        assert!(exceeds_body_limit(&err));

        let other = axum::Error::new(std::io::Error::other("connection reset"));
        assert!(!exceeds_body_limit(&other));
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = vec![b'a'; 2048];
        assert_eq!(preview(&body, 1024).len(), 1024);
        assert_eq!(preview(b"{\"price\":1}", 1024), "{\"price\":1}");
    }

    #[test]
    fn preview_tolerates_split_utf8() {
        let body = "цена".as_bytes();
        let preview = preview(body, 3);
        assert!(preview.starts_with('ц'));
    }
}
