//! HTTP API server for ferry.
//!
//! This crate provides:
//! - The upload orchestrator: transmit, verify, record or compensate
//! - Upload ledger endpoints (list, delete, per-day stats)
//! - Bearer-token authentication against stored sessions
//! - A TTL cache for default-channel and delegated-identity lookups
//! - The retention sweeper and Prometheus metrics

pub mod auth;
pub mod cache;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sweep;
pub mod upload;

pub use auth::{AuthenticatedUser, TraceId};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
