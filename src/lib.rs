//! Rollcall Core - invitations and confirmation links
//!
//! Issues and redeems single-use and multi-use confirmation keys, parses
//! invitee lists, enforces who may invite whom and how often, and completes
//! registrations started from emailed links.

pub mod api;
pub mod config;
pub mod domain;
pub mod email;
pub mod error;
pub mod invitee;
pub mod jwt;
pub mod middleware;
pub mod migration;
pub mod policy;
pub mod repository;
pub mod server;
pub mod service;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
