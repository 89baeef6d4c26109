//! Request bodies and query parameters for document-store endpoints.

use serde::Serialize;
use serde_json::Value;

use settee_core::Error;

/// Default language of design document views.
pub const DEFAULT_VIEW_LANGUAGE: &str = "javascript";

fn is_false(b: &bool) -> bool {
    !*b
}

/// Fail with `InvalidInput` when `value` is empty.
pub(crate) fn require_non_empty(value: &str, what: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{what} cannot be empty")));
    }
    Ok(())
}

/// Fail with `InvalidInput` unless `doc` is a JSON object.
pub(crate) fn require_object(doc: &Value, what: &str) -> Result<(), Error> {
    if !doc.is_object() {
        return Err(Error::InvalidInput(format!("{what} must be a JSON object")));
    }
    Ok(())
}

/// `POST /<db>/_bulk_docs` body. `all_or_nothing` is only sent when set.
#[derive(Debug, Clone, Serialize)]
pub struct BulkDocs<'a> {
    #[serde(skip_serializing_if = "is_false")]
    pub all_or_nothing: bool,
    pub docs: &'a [Value],
}

/// `POST /_replicate` body. `continuous` is only sent when set.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicateRequest<'a> {
    pub source: &'a str,
    pub target: &'a str,
    #[serde(skip_serializing_if = "is_false")]
    pub continuous: bool,
}

impl ReplicateRequest<'_> {
    pub fn validate(&self) -> Result<(), Error> {
        require_non_empty(self.source, "replication source")?;
        require_non_empty(self.target, "replication target")
    }
}

/// `POST /<db>/_temp_view` body.
#[derive(Debug, Clone, Serialize)]
pub struct TempView<'a> {
    pub map: &'a str,
}

/// Design document holding view definitions.
#[derive(Debug, Clone, Serialize)]
pub struct DesignDoc<'a> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<&'a str>,
    pub language: &'a str,
    pub views: &'a Value,
}

impl<'a> DesignDoc<'a> {
    /// Design document `_design/<name>`.
    pub fn new(name: &str, views: &'a Value, rev: Option<&'a str>, language: Option<&'a str>) -> Result<Self, Error> {
        require_non_empty(name, "design document id")?;
        require_object(views, "views")?;
        if let Some(rev) = rev {
            require_non_empty(rev, "revision")?;
        }
        Ok(Self {
            id: format!("_design/{name}"),
            rev,
            language: language.unwrap_or(DEFAULT_VIEW_LANGUAGE),
            views,
        })
    }
}

/// Options for `_all_docs`.
///
/// `startkey` and `endkey` are JSON literals placed in the query as given,
/// e.g. `"\"a\""`. With `keys`, the request becomes a `POST` carrying
/// `{"keys": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllDocsQuery {
    pub include_docs: bool,
    pub startkey: Option<String>,
    pub endkey: Option<String>,
    pub limit: Option<u64>,
    pub keys: Option<Vec<String>>,
}

/// `{"keys": [...]}` body for `_all_docs`.
#[derive(Debug, Clone, Serialize)]
pub struct KeysBody<'a> {
    pub keys: &'a [String],
}

impl AllDocsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_docs(mut self, include: bool) -> Self {
        self.include_docs = include;
        self
    }

    pub fn startkey(mut self, key: impl Into<String>) -> Self {
        self.startkey = Some(key.into());
        self
    }

    pub fn endkey(mut self, key: impl Into<String>) -> Self {
        self.endkey = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Query string without the leading `?`; empty when no option is set.
    pub fn query_string(&self) -> String {
        let mut params = Vec::new();
        if self.include_docs {
            params.push("include_docs=true".to_string());
        }
        if let Some(key) = &self.startkey {
            params.push(format!("startkey={key}"));
        }
        if let Some(key) = &self.endkey {
            params.push(format!("endkey={key}"));
        }
        if let Some(limit) = self.limit {
            params.push(format!("limit={limit}"));
        }
        params.join("&")
    }

    pub fn keys_body(&self) -> Option<KeysBody<'_>> {
        self.keys.as_deref().map(|keys| KeysBody { keys })
    }
}
