//! Credentials and the `Authorization` header they produce.
//!
//! An absent user and an empty-string user are different: authentication is
//! active as soon as either the user or the password is set, even to `""`.
//! Only "both absent" means unauthenticated.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use settee_core::{AuthScheme, Error};

/// Header name used for credentials.
pub const AUTHORIZATION: &str = "Authorization";

/// Username/password pair with its scheme. Replaced wholesale, never patched.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub pass: Option<String>,
    pub scheme: AuthScheme,
}

impl Credentials {
    pub fn new(user: Option<String>, pass: Option<String>, scheme: AuthScheme) -> Self {
        Self { user, pass, scheme }
    }

    /// True unless both user and password are absent.
    pub fn is_active(&self) -> bool {
        self.user.is_some() || self.pass.is_some()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "<redacted>"))
            .field("scheme", &self.scheme)
            .finish()
    }
}

/// Holds the current credentials and renders the `Authorization` header.
#[derive(Debug, Clone, Default)]
pub struct AuthProvider {
    credentials: Credentials,
}

impl AuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the credentials. `scheme` is parsed case-insensitively and
    /// defaults to Basic.
    pub fn login(&mut self, user: Option<&str>, pass: Option<&str>, scheme: Option<&str>) -> Result<(), Error> {
        let scheme = match scheme {
            Some(s) => s.parse::<AuthScheme>()?,
            None => AuthScheme::Basic,
        };
        self.configure(Credentials::new(user.map(str::to_string), pass.map(str::to_string), scheme));
        Ok(())
    }

    /// Replace the credentials with an already-validated set.
    pub fn configure(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    /// Drop back to unauthenticated requests.
    pub fn logout(&mut self) {
        self.credentials = Credentials::default();
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_active()
    }

    /// Header to attach to requests, or `None` when unauthenticated.
    pub fn header(&self) -> Option<(&'static str, String)> {
        header_for(&self.credentials)
    }
}

/// `("Authorization", "Basic base64(user:pass)")`, or `None` if both user and
/// password are absent.
pub fn header_for(credentials: &Credentials) -> Option<(&'static str, String)> {
    if !credentials.is_active() {
        return None;
    }
    match credentials.scheme {
        AuthScheme::Basic => {
            let user = credentials.user.as_deref().unwrap_or("");
            let pass = credentials.pass.as_deref().unwrap_or("");
            let token = STANDARD.encode(format!("{user}:{pass}"));
            Some((AUTHORIZATION, format!("Basic {token}")))
        }
    }
}
