//! HTTP observability middleware
//!
//! A Tower Layer/Service that propagates request IDs and records request
//! metrics.

use crate::service::confirmation::is_well_formed_key;
use axum::{body::Body, http::Request, response::Response};
use metrics::{counter, histogram};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct ObservabilityLayer;

impl<S> Layer<S> for ObservabilityLayer {
    type Service = ObservabilityMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObservabilityMiddleware { inner }
    }
}

#[derive(Clone)]
pub struct ObservabilityMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for ObservabilityMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let method = request.method().to_string();
        let path = normalize_path(request.uri().path());

        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let start = Instant::now();
        let mut inner = self.inner.clone();
        let span = tracing::info_span!("request", request_id = %request_id);

        Box::pin(
            async move {
                let mut response = inner.call(request).await?;

                let status = response.status().as_u16().to_string();
                counter!("rollcall_http_requests_total", "method" => method.clone(), "path" => path.clone(), "status" => status)
                    .increment(1);
                histogram!("rollcall_http_request_duration_seconds", "method" => method, "path" => path)
                    .record(start.elapsed().as_secs_f64());

                if let Ok(val) = request_id.parse() {
                    response.headers_mut().insert("x-request-id", val);
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// Collapse ids and confirmation keys so labels stay low-cardinality.
///
/// Keys are credentials and never reach a metric label.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if looks_like_uuid(seg) {
                "{id}"
            } else if is_well_formed_key(seg) {
                "{key}"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn looks_like_uuid(s: &str) -> bool {
    s.len() == 36 && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_with_uuid() {
        let path = "/api/v1/invites/550e8400-e29b-41d4-a716-446655440000/resend";
        assert_eq!(normalize_path(path), "/api/v1/invites/{id}/resend");
    }

    #[test]
    fn test_normalize_path_with_key() {
        assert_eq!(
            normalize_path("/join/abcdefghijklmnopqrstuvwx/"),
            "/join/{key}/"
        );
        assert_eq!(
            normalize_path("/api/v1/register/abcdefghijklmnopqrstuvwx"),
            "/api/v1/register/{key}"
        );
    }

    #[test]
    fn test_normalize_path_untouched() {
        assert_eq!(normalize_path("/api/v1/invites"), "/api/v1/invites");
        assert_eq!(normalize_path("/api/v1/invites/multiuse"), "/api/v1/invites/multiuse");
    }

    #[test]
    fn test_looks_like_uuid() {
        assert!(looks_like_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!looks_like_uuid("invites"));
        assert!(!looks_like_uuid(""));
    }
}
