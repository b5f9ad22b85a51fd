//! Request-logging middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    tracing::info!(%method, %uri, "request");
    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();
    tracing::info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "response"
    );
    response
}
