//! HTTP/1.0 over plain TCP.
//!
//! ### Wire contract
//!
//! - One connection per request; the response ends when the server closes it.
//! - Requests carry `Host`, `User-Agent`, and, when credentials are set,
//!   `Authorization: Basic`. Bodies are JSON with an exact `Content-Length`.
//! - Any response whose body is a JSON object with a non-empty `error` field
//!   fails with `Error::Remote`, whatever the status code.

pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod transport;

pub use headers::Headers;
pub use parser::{ParseState, ParsedResponse, ResponseParser, StatusLine};
pub use request::{Method, Request, RequestBuilder, escape_path};
pub use response::{Body, Response};
pub use transport::{CancelHandle, Transport, TransportConfig};
