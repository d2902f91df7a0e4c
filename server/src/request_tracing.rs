use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Caller-supplied request id, or a fresh one from the state's counter.
pub(crate) fn request_id(headers: &HeaderMap, state: &AppState) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| {
            let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
            format!("req-{id:016x}")
        })
}

pub(crate) async fn request_tracing_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request.uri().path().to_string();
    let request_id = request_id(request.headers(), &state);

    let span = tracing::info_span!(
        "http.request",
        request_id = %request_id,
        method = %method,
        route = %route,
    );

    let started = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    span.in_scope(|| {
        tracing::info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rallyd_engine::{FakeRally, Workdir};

    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let state = AppState::new(
            Arc::new(FakeRally::new(Workdir::new("/nonexistent"))),
            Workdir::new("/nonexistent"),
        );
        let headers = HeaderMap::new();
        let first = request_id(&headers, &state);
        let second = request_id(&headers, &state);
        assert!(first.starts_with("req-"));
        assert_ne!(first, second);
    }

    #[test]
    fn caller_id_is_kept() {
        let state = AppState::new(
            Arc::new(FakeRally::new(Workdir::new("/nonexistent"))),
            Workdir::new("/nonexistent"),
        );
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static(" abc-123 "));
        assert_eq!(request_id(&headers, &state), "abc-123");
    }
}
