//! # parley-auth
//!
//! Bearer credential validation for the Parley gateway.
//!
//! Tokens are minted elsewhere; this crate only checks the signature and
//! expiry of a presented JWT and extracts the subject.
//!
//! ## Modules
//!
//! - `jwt`: claims structure and HS256 decoder

pub mod jwt;

pub use jwt::{Claims, JwtDecoder};
