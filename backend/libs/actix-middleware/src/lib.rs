//! # Actix Middleware Library
//!
//! Shared middleware components for Nova Actix services
//!
//! ## Modules
//! - `jwt_auth`: JWT bearer authentication producing a [`CallerId`]

pub mod jwt_auth;

pub use jwt_auth::{CallerId, Claims, JwtAuthMiddleware, JwtVerifier};
