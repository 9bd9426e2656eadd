//! Shared types for the Kegbot core.
//!
//! - [`objects`]: wire objects exchanged between the core, its device feeds and
//!   its downstream consumers.
//! - [`config`]: validated runtime configuration shared across crates.
//! - `client` (feature `client`): typed HTTP client for the kegweb API.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

pub mod config;
pub mod objects;

#[cfg(feature = "client")]
pub mod client;
