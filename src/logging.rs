use std::time::Instant;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = started_at.elapsed().as_millis(),
        "request summary"
    );

    match status {
        StatusCode::UNAUTHORIZED => warn!(method = %method, path = %path, "authentication failure"),
        StatusCode::INTERNAL_SERVER_ERROR => {
            warn!(method = %method, path = %path, "request ended with internal error")
        }
        _ => {}
    }

    response
}
