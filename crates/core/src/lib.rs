//! Core types and shared functionality for settee.
//!
//! This crate provides:
//! - Size-bounded disk cache for server responses
//! - Unified error types
//! - Configuration structures

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;

pub use auth::AuthScheme;
pub use cache::{CacheStore, DiskCache};
pub use config::AppConfig;
pub use error::Error;
