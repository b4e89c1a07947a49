//! TraceLayer span maker that keeps confirmation keys out of logs.

use crate::service::confirmation::is_well_formed_key;
use axum::http::Request;
use tower_http::trace::MakeSpan;
use tracing::Span;

/// Query parameter names whose values are redacted.
const SENSITIVE_PARAMS: &[&str] = &["key", "token", "access_token"];

#[derive(Clone, Debug)]
pub struct SanitizedMakeSpan;

impl<B> MakeSpan<B> for SanitizedMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %sanitize_uri(request.uri()),
            version = ?request.version(),
        )
    }
}

/// Redact key-shaped path segments and sensitive query values.
///
/// `/join/abcdefghijklmnopqrstuvwx/?token=x` becomes
/// `/join/[REDACTED]/?token=[REDACTED]`.
fn sanitize_uri(uri: &axum::http::Uri) -> String {
    let path = uri
        .path()
        .split('/')
        .map(|seg| if is_well_formed_key(seg) { "[REDACTED]" } else { seg })
        .collect::<Vec<_>>()
        .join("/");

    let Some(query) = uri.query() else {
        return path;
    };

    let sanitized_pairs: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if SENSITIVE_PARAMS.contains(&key.to_ascii_lowercase().as_str()) => {
                format!("{key}=[REDACTED]")
            }
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", path, sanitized_pairs.join("&"))
}
