//! Response value returned by the transport.

use bytes::Bytes;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use settee_core::Error;

use super::parser::ParsedResponse;

/// Body as handed to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// JSON value, when decoding is enabled and the body parsed.
    Json(Value),
    /// Body text, when decoding is disabled or the body is not JSON.
    Raw(String),
}

impl Body {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(v) => Some(v),
            Body::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub http_version: String,
    pub status_code: u16,
    pub reason: Option<String>,
    /// Names as received; a repeated name keeps the last value.
    pub headers: IndexMap<String, String>,
    pub body: Bytes,
    pub decoded_body: Body,
}

impl Response {
    /// Build a response from parser output, checking the server's error
    /// contract first.
    ///
    /// The body is always tried as JSON for the `error` check; `decode` only
    /// controls what ends up in `decoded_body`.
    pub fn from_parsed(parsed: ParsedResponse, decode: bool) -> Result<Self, Error> {
        let ParsedResponse { status, headers, body } = parsed;
        let body = body.freeze();
        let json = serde_json::from_slice::<Value>(&body).ok();

        if let Some(err) = json.as_ref().and_then(|v| remote_error(v, status.code)) {
            return Err(err);
        }

        let decoded_body = match json {
            Some(value) if decode => Body::Json(value),
            _ => Body::Raw(String::from_utf8_lossy(&body).into_owned()),
        };

        Ok(Self {
            http_version: status.version,
            status_code: status.code,
            reason: status.reason,
            headers,
            body,
            decoded_body,
        })
    }

    /// Response for a value served from a local cache. Carries no headers.
    pub fn from_cached(value: Value, decode: bool) -> Result<Self, Error> {
        let body = Bytes::from(serde_json::to_vec(&value)?);
        let decoded_body =
            if decode { Body::Json(value) } else { Body::Raw(String::from_utf8_lossy(&body).into_owned()) };
        Ok(Self {
            http_version: "1.0".into(),
            status_code: 200,
            reason: Some("OK".into()),
            headers: IndexMap::new(),
            body,
            decoded_body,
        })
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn json(&self) -> Option<&Value> {
        self.decoded_body.as_json()
    }

    /// Body as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// `Error::Remote` if `value` is an object with a non-empty `error` field.
///
/// Strings count when non-empty; any other value counts unless it is `null`
/// or `false`.
pub fn remote_error(value: &Value, status: u16) -> Option<Error> {
    let error = match value.as_object()?.get("error")? {
        Value::Null | Value::Bool(false) => return None,
        Value::String(s) if s.is_empty() => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let reason = value.get("reason").and_then(|r| match r {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    });
    Some(Error::Remote { error, reason, status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parser::ResponseParser;
    use serde_json::json;
    use std::io::Cursor;

    fn parsed(raw: &str) -> ParsedResponse {
        ResponseParser::new()
            .parse_from(&mut Cursor::new(raw.as_bytes().to_vec()), |e| Error::Read(e.to_string()))
            .unwrap()
    }

    #[test]
    fn test_decoded_json() {
        let resp =
            Response::from_parsed(parsed("HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n{\"ok\":true}"), true)
                .unwrap();
        assert_eq!(resp.status_code, 200);
        assert!(resp.is_success());
        assert_eq!(resp.json().and_then(|v| v["ok"].as_bool()), Some(true));
        assert_eq!(resp.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_raw_when_decode_disabled() {
        let resp = Response::from_parsed(parsed("HTTP/1.0 200 OK\r\n\r\n{\"ok\":true}"), false).unwrap();
        assert_eq!(resp.decoded_body, Body::Raw("{\"ok\":true}".into()));
        assert!(resp.json().is_none());
    }

    #[test]
    fn test_raw_when_not_json() {
        let resp = Response::from_parsed(parsed("HTTP/1.0 200 OK\r\n\r\nhello"), true).unwrap();
        assert_eq!(resp.decoded_body, Body::Raw("hello".into()));
        assert_eq!(resp.text(), "hello");
    }

    #[test]
    fn test_remote_error_with_reason() {
        let result = Response::from_parsed(
            parsed("HTTP/1.0 404 Object Not Found\r\n\r\n{\"error\":\"not_found\",\"reason\":\"missing\"}"),
            true,
        );
        match result {
            Err(Error::Remote { error, reason, status }) => {
                assert_eq!(error, "not_found");
                assert_eq!(reason.as_deref(), Some("missing"));
                assert_eq!(status, 404);
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_remote_error_checked_when_decode_disabled() {
        let result = Response::from_parsed(parsed("HTTP/1.0 409 Conflict\r\n\r\n{\"error\":\"conflict\"}"), false);
        assert!(matches!(result, Err(Error::Remote { status: 409, reason: None, .. })));
    }

    #[test]
    fn test_remote_error_regardless_of_status() {
        let result = Response::from_parsed(parsed("HTTP/1.0 200 OK\r\n\r\n{\"error\":\"odd\"}"), true);
        assert!(matches!(result, Err(Error::Remote { status: 200, .. })));
    }

    #[test]
    fn test_empty_error_field_is_not_remote_error() {
        assert!(remote_error(&json!({"error": ""}), 200).is_none());
        assert!(remote_error(&json!({"error": null}), 200).is_none());
        assert!(remote_error(&json!({"error": false}), 200).is_none());
        assert!(remote_error(&json!(["error"]), 200).is_none());
        assert!(remote_error(&json!({"error": true}), 500).is_some());
    }

    #[test]
    fn test_parse_typed() {
        #[derive(serde::Deserialize)]
        struct Reply {
            ok: bool,
        }
        let resp = Response::from_parsed(parsed("HTTP/1.0 201 Created\r\n\r\n{\"ok\":true}"), true).unwrap();
        assert!(resp.parse::<Reply>().unwrap().ok);
    }
}
