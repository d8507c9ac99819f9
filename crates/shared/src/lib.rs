//! Authgate Shared Types and Errors
//!
//! This crate contains the principal model, identifiers, and the authentication
//! error taxonomy shared across the Authgate crates.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
