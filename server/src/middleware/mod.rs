//! Middleware for the marketplace API
//!
//! Authentication is done with extractors rather than a layer, so each
//! handler states the caller it needs.

pub mod auth;

pub use auth::{AdminUser, AuthenticatedUser};
