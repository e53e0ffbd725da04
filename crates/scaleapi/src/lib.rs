//! # Scaleapi
//!
//! Blocking HTTP client for the cluster scaling API.
//!
//! - [`HttpResourceApi`] implements [`staging::ResourceApi`]: single HPA and
//!   node-pool updates plus the sequential node-pool group call
//! - [`HttpSessionStore`] implements [`staging::SessionStore`]
//!
//! Every call carries a global deadline from [`Config`]. Transport-level
//! retries are left to the caller; [`Error::is_retryable`] tells whether
//! one makes sense.

pub mod client;
pub mod error;
pub mod resources;
pub mod sessions;

pub use client::{Client, Config, DEFAULT_API_BASE, DEFAULT_TIMEOUT};
pub use error::{Error, ErrorCategory, Result};
pub use resources::HttpResourceApi;
pub use sessions::HttpSessionStore;
