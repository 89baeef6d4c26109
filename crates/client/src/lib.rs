//! Client for settee.
//!
//! This crate provides the blocking HTTP/1.0 transport, Basic authentication,
//! and the document-store operations built on top of them. Error,
//! configuration, and cache types live in `settee-core`.

pub mod auth;
pub mod couch;
pub mod http;

pub use auth::{AuthProvider, Credentials};
pub use couch::{AllDocsQuery, Client};
pub use http::{Body, CancelHandle, Headers, Method, Request, RequestBuilder, Response, ResponseParser, Transport, TransportConfig};

pub use settee_core::{AppConfig, CacheStore, DiskCache, Error};
