//! Authentication schemes understood by the transport.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Authentication scheme for outgoing requests. Only HTTP Basic is supported.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    Basic,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Basic => "basic",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("basic") {
            Ok(AuthScheme::Basic)
        } else {
            Err(Error::UnsupportedAuthScheme(s.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        assert_eq!("basic".parse::<AuthScheme>().unwrap(), AuthScheme::Basic);
        assert_eq!("BASIC".parse::<AuthScheme>().unwrap(), AuthScheme::Basic);
    }

    #[test]
    fn test_parse_unsupported() {
        let result = "digest".parse::<AuthScheme>();
        assert!(matches!(result, Err(Error::UnsupportedAuthScheme(s)) if s == "digest"));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&AuthScheme::Basic).unwrap();
        assert_eq!(json, "\"basic\"");
        assert!(serde_json::from_str::<AuthScheme>("\"cookie\"").is_err());
    }
}
