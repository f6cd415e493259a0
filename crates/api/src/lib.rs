// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Crewdesk API Library
//!
//! HTTP server components: configuration, hosted-auth session verification,
//! the navigation route guard, and the billing/trial endpoints.

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use guard::{evaluate, GuardContext, GuardOutcome, RoutePolicy};
pub use state::AppState;
