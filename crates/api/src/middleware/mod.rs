//! Request extractors that guard handlers.
//!
//! - [`auth::RequireAdmin`] -- requires the operator bearer token.

pub mod auth;
