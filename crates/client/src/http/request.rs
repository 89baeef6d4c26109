//! HTTP/1.0 request serialization.
//!
//! Wire layout: `<METHOD> <path> HTTP/1.0\r\n`, one `<Name>: <Value>\r\n` per
//! header in insertion order, a blank line, then the body followed by
//! `\r\n\r\n` when there is one.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use settee_core::Error;

use super::headers::Headers;
use crate::auth::{AUTHORIZATION, AuthProvider};

pub const HOST: &str = "Host";
pub const USER_AGENT: &str = "User-Agent";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Copy,
    Other(&'static str),
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Copy => "COPY",
            Method::Other(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request before serialization. Built fresh for every call.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: Headers,
    /// Empty bodies are treated as absent.
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: Headers::new(), body: None }
    }

    /// Add or replace a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.body = Some(data.into());
        self
    }

    /// Set the body to the JSON encoding of `payload`.
    pub fn json<T: Serialize + ?Sized>(self, payload: &T) -> Result<Self, Error> {
        let data = serde_json::to_vec(payload)?;
        Ok(self.body(data))
    }

    fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref().filter(|b| !b.is_empty())
    }
}

/// Escape the characters the wire format cannot carry in a request line.
///
/// Only spaces and double quotes are rewritten; this is not a general URL
/// encoder.
pub fn escape_path(path: &str) -> String {
    path.replace(' ', "%20").replace('"', "%22")
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

/// Serializes requests for a fixed host with the client's User-Agent.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    host: String,
    user_agent: String,
}

impl RequestBuilder {
    pub fn new(host: &str, port: u16, user_agent: impl Into<String>) -> Self {
        Self { host: format!("{host}:{port}"), user_agent: user_agent.into() }
    }

    /// Serialize `request`, applying the transport's header rules:
    ///
    /// - `Host` and `User-Agent` are always set.
    /// - `Authorization` comes from `auth`; a caller-supplied one is dropped
    ///   when no credentials are configured.
    /// - With a body, `Content-Length` and `Content-Type: application/json`
    ///   replace caller values; without one, both are stripped.
    pub fn build(&self, request: Request, auth: &AuthProvider) -> Result<Bytes, Error> {
        if !request.path.starts_with('/') {
            return Err(Error::InvalidInput(format!("path must begin with '/': {}", request.path)));
        }
        if has_line_break(&request.path) {
            return Err(Error::InvalidInput("path must not contain line breaks".into()));
        }

        let path = escape_path(&request.path);
        let body = request.body_bytes();
        let mut headers = request.headers.clone();

        headers.set(HOST, self.host.as_str());
        headers.set(USER_AGENT, self.user_agent.as_str());

        match auth.header() {
            Some((name, value)) => {
                headers.set(name, value);
            }
            None => {
                headers.remove(AUTHORIZATION);
            }
        }

        match body {
            Some(data) => {
                headers.set(CONTENT_LENGTH, data.len().to_string());
                headers.set(CONTENT_TYPE, "application/json");
            }
            None => {
                headers.remove(CONTENT_LENGTH);
                headers.remove(CONTENT_TYPE);
            }
        }

        if let Some((name, _)) = headers.iter().find(|(k, v)| has_line_break(k) || has_line_break(v)) {
            return Err(Error::InvalidInput(format!("header {name} must not contain line breaks")));
        }

        let mut buf = BytesMut::with_capacity(256 + body.map_or(0, <[u8]>::len));
        buf.put_slice(request.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(path.as_bytes());
        buf.put_slice(b" HTTP/1.0\r\n");
        for (name, value) in headers.iter() {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        if let Some(data) = body {
            buf.put_slice(data);
            buf.put_slice(b"\r\n\r\n");
        }

        Ok(buf.freeze())
    }
}
