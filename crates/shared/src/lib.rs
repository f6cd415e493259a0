//! Crewdesk Shared Types and Utilities
//!
//! Types, errors, and database helpers shared across the Crewdesk platform.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
