//! HTTP middleware for Rollcall Core
//!
//! - Bearer token `AuthUser` extractor
//! - Request ID propagation and HTTP metrics
//! - Trace spans with confirmation keys redacted

pub mod auth;
pub mod metrics;
pub mod trace;

pub use auth::{AuthError, AuthUser};
pub use metrics::ObservabilityLayer;
pub use trace::SanitizedMakeSpan;
