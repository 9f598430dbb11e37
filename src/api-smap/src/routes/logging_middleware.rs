use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Logs each request with its status: errors at error level, not-found and other client
/// errors at warn, everything else at info.
pub async fn log_route_access(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();
    if response.status().is_server_error() {
        tracing::error!(method = %method, uri = %uri, status = %status, duration_ms = %duration_ms);
    } else if response.status().is_client_error() {
        tracing::warn!(method = %method, uri = %uri, status = %status, duration_ms = %duration_ms);
    } else {
        tracing::info!(method = %method, uri = %uri, status = %status, duration_ms = %duration_ms);
    }

    response
}
