//! Request extractors.
//!
//! - [`auth::AuthUser`] -- Resolves the calling principal from a JWT Bearer
//!   token (or a trusted `X-User-Id` header).

pub mod auth;
