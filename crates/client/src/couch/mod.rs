//! Document-store client.
//!
//! Wraps a [`Transport`] with the server's REST endpoints: documents, bulk
//! updates, `_all_docs`, databases, replication, compaction, and views.
//! Every operation validates its arguments before any I/O and fails with
//! `Error::InvalidInput` when they are unusable.
//!
//! A [`CacheStore`] can be attached to serve repeated `get` calls locally.
//! Only successful `get` bodies are cached; writes (`put`, `delete`, `bulk`,
//! `copy`, view updates) drop the cached copy of the documents they touch.

pub mod request;

pub use request::{AllDocsQuery, BulkDocs, DesignDoc, KeysBody, ReplicateRequest, TempView};

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::Value;

use settee_core::cache::CacheStore;
use settee_core::{AppConfig, DiskCache, Error};

use crate::http::{CancelHandle, Headers, Method, Request, Response, Transport, TransportConfig};
use request::{require_non_empty, require_object};

/// Header naming the target of a `COPY`.
pub const DESTINATION: &str = "Destination";

/// Response cache attached to a client.
#[derive(Clone)]
struct AttachedCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

/// Client for one server, optionally scoped to a database.
pub struct Client {
    transport: Transport,
    database: Option<String>,
    cache: Option<AttachedCache>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("database", &self.database)
            .field("cache_ttl", &self.cache.as_ref().map(|c| c.ttl))
            .finish()
    }
}

impl Client {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_transport(Transport::new(config))
    }

    pub fn with_transport(transport: Transport) -> Self {
        Self { transport, database: None, cache: None }
    }

    /// Client built from loaded configuration: server, credentials, the
    /// database name (stored without a round-trip), and a disk cache when
    /// `cache_dir` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be opened.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let mut client = Self::with_transport(Transport::from_app_config(config));
        client.database = config.database.clone();
        if config.cache_dir.is_some() {
            let cache = DiskCache::from_config(config)?;
            tracing::debug!(dir = %cache.directory().display(), capacity = cache.capacity(), "response cache attached");
            client = client.with_cache(Arc::new(cache), config.cache_ttl());
        }
        Ok(client)
    }

    /// Serve `get` from `store`, keeping fresh entries for `ttl`.
    pub fn with_cache(mut self, store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        self.cache = Some(AttachedCache { store, ttl });
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.transport.cancel_handle()
    }

    pub fn login(&mut self, user: Option<&str>, pass: Option<&str>, scheme: Option<&str>) -> Result<(), Error> {
        self.transport.login(user, pass, scheme)
    }

    pub fn set_decode(&mut self, decode: bool) {
        self.transport.set_decode(decode);
    }

    /// Scope document operations to `name`, then fetch `/<name>/`.
    ///
    /// The name is kept even if the fetch fails, so a missing database
    /// surfaces as `Error::Remote` here and on later calls.
    pub fn set_database(&mut self, name: &str) -> Result<Response, Error> {
        require_non_empty(name, "database name")?;
        self.database = Some(name.to_string());
        self.transport.execute(Method::Get, &format!("/{name}/"), None, Headers::new())
    }

    fn db(&self) -> Result<&str, Error> {
        self.database.as_deref().ok_or_else(|| Error::InvalidInput("no database specified".into()))
    }

    fn doc_path(&self, id: &str) -> Result<String, Error> {
        let db = self.db()?;
        require_non_empty(id, "document id")?;
        Ok(format!("/{db}/{id}"))
    }

    fn send_json<T: serde::Serialize + ?Sized>(&self, method: Method, path: &str, body: &T) -> Result<Response, Error> {
        self.transport.send(Request::new(method, path).json(body)?)
    }

    fn invalidate(&self, key: &str) {
        if let Some(cache) = &self.cache
            && let Err(e) = cache.store.remove(key)
        {
            tracing::warn!(key, "failed to drop cached entry: {e}");
        }
    }

    /// `GET /<db><path>`; a missing leading `/` is added.
    pub fn get(&self, path: &str) -> Result<Response, Error> {
        let db = self.db()?;
        let path = if path.starts_with('/') { format!("/{db}{path}") } else { format!("/{db}/{path}") };
        let decode = self.transport.config().decode;

        if let Some(cache) = &self.cache {
            match cache.store.get(&path) {
                Ok(Some(value)) => {
                    tracing::debug!(path = %path, "served from cache");
                    return Response::from_cached(value, decode);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path, "cache read failed: {e}"),
            }
        }

        let response = self.transport.execute(Method::Get, &path, None, Headers::new())?;

        if let Some(cache) = &self.cache
            && response.is_success()
        {
            Self::store(cache, &path, &response);
        }
        Ok(response)
    }

    fn store(cache: &AttachedCache, key: &str, response: &Response) {
        if cache.ttl.is_zero() {
            return;
        }
        let Ok(value) = serde_json::from_slice::<Value>(&response.body) else {
            return;
        };
        let Some(expires_at) = TimeDelta::from_std(cache.ttl).ok().and_then(|ttl| Utc::now().checked_add_signed(ttl))
        else {
            return;
        };
        match cache.store.set(key, &value, Some(expires_at)) {
            Ok(true) => tracing::debug!(key, "response cached"),
            Ok(false) => tracing::warn!(key, "cache full, response not cached"),
            Err(e) => tracing::warn!(key, "failed to cache response: {e}"),
        }
    }

    /// `PUT /<db>/<id>` with `doc` as the body.
    pub fn put(&self, id: &str, doc: &Value) -> Result<Response, Error> {
        let path = self.doc_path(id)?;
        require_object(doc, "document")?;
        let response = self.send_json(Method::Put, &path, doc)?;
        self.invalidate(&path);
        Ok(response)
    }

    /// `POST /<db>`; the server assigns the id.
    pub fn post(&self, doc: &Value) -> Result<Response, Error> {
        let db = self.db()?;
        require_object(doc, "document")?;
        self.send_json(Method::Post, &format!("/{db}"), doc)
    }

    /// `DELETE /<db>/<id>?rev=<rev>`.
    pub fn delete(&self, id: &str, rev: &str) -> Result<Response, Error> {
        let path = self.doc_path(id)?;
        require_non_empty(rev, "revision")?;
        let response = self.transport.execute(Method::Delete, &format!("{path}?rev={rev}"), None, Headers::new())?;
        self.invalidate(&path);
        Ok(response)
    }

    /// `POST /<db>/_bulk_docs`. Cached copies of documents carrying an
    /// `_id` are dropped.
    pub fn bulk(&self, docs: &[Value], all_or_nothing: bool) -> Result<Response, Error> {
        let db = self.db()?;
        let response = self.send_json(Method::Post, &format!("/{db}/_bulk_docs"), &BulkDocs { all_or_nothing, docs })?;
        for id in docs.iter().filter_map(|doc| doc.get("_id").and_then(Value::as_str)).filter(|id| !id.is_empty()) {
            self.invalidate(&format!("/{db}/{id}"));
        }
        Ok(response)
    }

    /// `COPY /<db>/<src_id>` to `dst_id`, overwriting revision `dst_rev` if given.
    pub fn copy(&self, src_id: &str, dst_id: &str, dst_rev: Option<&str>) -> Result<Response, Error> {
        let path = self.doc_path(src_id)?;
        require_non_empty(dst_id, "destination id")?;
        let destination = match dst_rev {
            Some(rev) => {
                require_non_empty(rev, "destination revision")?;
                format!("{dst_id}?rev={rev}")
            }
            None => dst_id.to_string(),
        };
        let mut headers = Headers::new();
        headers.set(DESTINATION, destination);
        let response = self.transport.execute(Method::Copy, &path, None, headers)?;
        self.invalidate(&self.doc_path(dst_id)?);
        Ok(response)
    }

    /// `GET /<db>/_all_docs`, or `POST` with a keys body when `query.keys` is set.
    pub fn all_docs(&self, query: &AllDocsQuery) -> Result<Response, Error> {
        let db = self.db()?;
        let qs = query.query_string();
        let path = if qs.is_empty() { format!("/{db}/_all_docs") } else { format!("/{db}/_all_docs?{qs}") };
        match query.keys_body() {
            Some(body) => self.send_json(Method::Post, &path, &body),
            None => self.transport.execute(Method::Get, &path, None, Headers::new()),
        }
    }

    /// `GET /_all_dbs`.
    pub fn all_databases(&self) -> Result<Response, Error> {
        self.transport.execute(Method::Get, "/_all_dbs", None, Headers::new())
    }

    /// `GET /_uuids?count=<count>`.
    pub fn generate_ids(&self, count: u32) -> Result<Response, Error> {
        self.transport.execute(Method::Get, &format!("/_uuids?count={count}"), None, Headers::new())
    }

    /// `PUT /<name>`.
    pub fn create_database(&self, name: &str) -> Result<Response, Error> {
        require_non_empty(name, "database name")?;
        self.transport.execute(Method::Put, &format!("/{name}"), None, Headers::new())
    }

    /// `DELETE /<name>`.
    pub fn delete_database(&self, name: &str) -> Result<Response, Error> {
        require_non_empty(name, "database name")?;
        self.transport.execute(Method::Delete, &format!("/{name}"), None, Headers::new())
    }

    /// `POST /_replicate`. Independent of the selected database.
    pub fn replicate(&self, source: &str, target: &str, continuous: bool) -> Result<Response, Error> {
        let body = ReplicateRequest { source, target, continuous };
        body.validate()?;
        self.send_json(Method::Post, "/_replicate", &body)
    }

    /// `POST /<db>/_compact`, or `/<db>/_compact/<view>` for one design document's views.
    pub fn compact(&self, view: Option<&str>) -> Result<Response, Error> {
        let db = self.db()?;
        let path = match view.filter(|v| !v.is_empty()) {
            Some(view) => format!("/{db}/_compact/{view}"),
            None => format!("/{db}/_compact"),
        };
        self.transport.execute(Method::Post, &path, None, Headers::new())
    }

    /// `POST /<db>/_temp_view` with `map_fn` as the map function.
    pub fn temp_view(&self, map_fn: &str) -> Result<Response, Error> {
        let db = self.db()?;
        require_non_empty(map_fn, "map function")?;
        self.send_json(Method::Post, &format!("/{db}/_temp_view"), &TempView { map: map_fn })
    }

    /// `PUT /<db>/_design/<id>` with a new design document.
    pub fn create_view(&self, id: &str, views: &Value, language: Option<&str>) -> Result<Response, Error> {
        self.put_design(DesignDoc::new(id, views, None, language)?)
    }

    /// `PUT /<db>/_design/<id>`, replacing revision `rev` when given.
    pub fn update_view(
        &self, id: &str, views: &Value, rev: Option<&str>, language: Option<&str>,
    ) -> Result<Response, Error> {
        self.put_design(DesignDoc::new(id, views, rev, language)?)
    }

    fn put_design(&self, doc: DesignDoc<'_>) -> Result<Response, Error> {
        let path = self.doc_path(&doc.id)?;
        let response = self.send_json(Method::Put, &path, &doc)?;
        self.invalidate(&path);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    const OK: &[u8] = b"HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n{\"ok\":true}";

    fn read_request(stream: &TcpStream) -> String {
        let mut reader = BufReader::new(stream);
        let mut raw = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 {
                break;
            }
            if let Some(v) = line.strip_prefix("Content-Length: ") {
                content_length = v.trim().parse().unwrap();
            }
            raw.push_str(&line);
            if line == "\r\n" {
                break;
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();
        raw.push_str(&String::from_utf8(body).unwrap());
        raw
    }

    /// Serves `replies` to consecutive connections and reports each request.
    fn serve(replies: Vec<&'static [u8]>) -> (u16, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for reply in replies {
                let (mut stream, _) = listener.accept().unwrap();
                let request = read_request(&stream);
                stream.write_all(reply).unwrap();
                tx.send(request).unwrap();
            }
        });
        (port, rx)
    }

    fn client(port: u16) -> Client {
        Client::new(TransportConfig::new("127.0.0.1", port).with_timeout(Some(Duration::from_secs(5))))
    }

    fn client_with_db(port: u16, db: &str) -> Client {
        let mut client = client(port);
        client.database = Some(db.to_string());
        client
    }

    fn request_line(request: &str) -> &str {
        request.lines().next().unwrap()
    }

    fn request_body(request: &str) -> Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_operations_require_database() {
        let client = client(1);
        let doc = json!({"a": 1});
        let checks = [
            client.get("/x").err(),
            client.put("x", &doc).err(),
            client.post(&doc).err(),
            client.delete("x", "1-a").err(),
            client.bulk(&[], false).err(),
            client.copy("a", "b", None).err(),
            client.all_docs(&AllDocsQuery::new()).err(),
            client.compact(None).err(),
            client.temp_view("function(doc) {}").err(),
            client.create_view("v", &json!({}), None).err(),
        ];
        for err in checks {
            assert!(matches!(err, Some(Error::InvalidInput(msg)) if msg == "no database specified"));
        }
    }

    #[test]
    fn test_argument_validation() {
        let client = client_with_db(1, "albums");
        assert!(matches!(client.put("", &json!({})), Err(Error::InvalidInput(_))));
        assert!(matches!(client.put("x", &json!([1, 2])), Err(Error::InvalidInput(_))));
        assert!(matches!(client.delete("x", ""), Err(Error::InvalidInput(_))));
        assert!(matches!(client.copy("a", "", None), Err(Error::InvalidInput(_))));
        assert!(matches!(client.copy("a", "b", Some("")), Err(Error::InvalidInput(_))));
        assert!(matches!(client.create_database(""), Err(Error::InvalidInput(_))));
        assert!(matches!(client.replicate("", "b", false), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_set_database_fetches_root() {
        let (port, rx) = serve(vec![b"HTTP/1.0 200 OK\r\n\r\n{\"db_name\":\"albums\"}"]);
        let mut client = client(port);
        let resp = client.set_database("albums").unwrap();
        assert_eq!(resp.json().unwrap()["db_name"], "albums");
        assert_eq!(client.database(), Some("albums"));
        assert_eq!(request_line(&rx.recv().unwrap()), "GET /albums/ HTTP/1.0");
    }

    #[test]
    fn test_set_database_missing() {
        let (port, _rx) =
            serve(vec![b"HTTP/1.0 404 Object Not Found\r\n\r\n{\"error\":\"not_found\",\"reason\":\"no_db_file\"}"]);
        let mut client = client(port);
        let result = client.set_database("nope");
        assert!(matches!(result, Err(Error::Remote { status: 404, .. })));
        assert_eq!(client.database(), Some("nope"));
    }

    #[test]
    fn test_get_adds_leading_slash() {
        let (port, rx) = serve(vec![OK, OK]);
        let client = client_with_db(port, "albums");
        client.get("kob").unwrap();
        client.get("/kob").unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "GET /albums/kob HTTP/1.0");
        assert_eq!(request_line(&rx.recv().unwrap()), "GET /albums/kob HTTP/1.0");
    }

    #[test]
    fn test_put_and_delete() {
        let (port, rx) = serve(vec![OK, OK]);
        let client = client_with_db(port, "albums");

        client.put("kob", &json!({"title": "Kind of Blue"})).unwrap();
        let request = rx.recv().unwrap();
        assert_eq!(request_line(&request), "PUT /albums/kob HTTP/1.0");
        assert!(request.contains("Content-Type: application/json\r\n"));
        assert_eq!(request_body(&request), json!({"title": "Kind of Blue"}));

        client.delete("kob", "1-abc").unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "DELETE /albums/kob?rev=1-abc HTTP/1.0");
    }

    #[test]
    fn test_post_and_bulk() {
        let (port, rx) = serve(vec![OK, OK]);
        let client = client_with_db(port, "albums");

        client.post(&json!({"title": "Blue Train"})).unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "POST /albums HTTP/1.0");

        client.bulk(&[json!({"_id": "a"}), json!({"_id": "b"})], true).unwrap();
        let request = rx.recv().unwrap();
        assert_eq!(request_line(&request), "POST /albums/_bulk_docs HTTP/1.0");
        assert_eq!(request_body(&request), json!({"all_or_nothing": true, "docs": [{"_id": "a"}, {"_id": "b"}]}));
    }

    #[test]
    fn test_copy_sets_destination() {
        let (port, rx) = serve(vec![OK, OK]);
        let client = client_with_db(port, "albums");

        client.copy("kob", "kob-copy", None).unwrap();
        let request = rx.recv().unwrap();
        assert_eq!(request_line(&request), "COPY /albums/kob HTTP/1.0");
        assert!(request.contains("Destination: kob-copy\r\n"));
        assert!(!request.contains("Content-Length"));

        client.copy("kob", "kob-copy", Some("2-def")).unwrap();
        assert!(rx.recv().unwrap().contains("Destination: kob-copy?rev=2-def\r\n"));
    }

    #[test]
    fn test_all_docs_get_and_keys() {
        let (port, rx) = serve(vec![OK, OK]);
        let client = client_with_db(port, "albums");

        client.all_docs(&AllDocsQuery::new().include_docs(true).limit(5)).unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "GET /albums/_all_docs?include_docs=true&limit=5 HTTP/1.0");

        client.all_docs(&AllDocsQuery::new().keys(["a", "b"])).unwrap();
        let request = rx.recv().unwrap();
        assert_eq!(request_line(&request), "POST /albums/_all_docs HTTP/1.0");
        assert_eq!(request_body(&request), json!({"keys": ["a", "b"]}));
    }

    #[test]
    fn test_server_operations() {
        let (port, rx) = serve(vec![OK, OK, OK, OK, OK]);
        let client = client(port);

        client.all_databases().unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "GET /_all_dbs HTTP/1.0");

        client.generate_ids(3).unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "GET /_uuids?count=3 HTTP/1.0");

        client.create_database("albums").unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "PUT /albums HTTP/1.0");

        client.delete_database("albums").unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "DELETE /albums HTTP/1.0");

        client.replicate("albums", "albums-backup", false).unwrap();
        let request = rx.recv().unwrap();
        assert_eq!(request_line(&request), "POST /_replicate HTTP/1.0");
        assert_eq!(request_body(&request), json!({"source": "albums", "target": "albums-backup"}));
    }

    #[test]
    fn test_compact_and_views() {
        let (port, rx) = serve(vec![OK, OK, OK, OK]);
        let client = client_with_db(port, "albums");

        client.compact(None).unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "POST /albums/_compact HTTP/1.0");

        client.compact(Some("by_year")).unwrap();
        assert_eq!(request_line(&rx.recv().unwrap()), "POST /albums/_compact/by_year HTTP/1.0");

        client.temp_view("function(doc) { emit(null, doc); }").unwrap();
        let request = rx.recv().unwrap();
        assert_eq!(request_line(&request), "POST /albums/_temp_view HTTP/1.0");
        assert_eq!(request_body(&request), json!({"map": "function(doc) { emit(null, doc); }"}));

        let views = json!({"by_year": {"map": "function(doc) { emit(doc.year, null); }"}});
        client.update_view("stats", &views, Some("3-aaa"), None).unwrap();
        let request = rx.recv().unwrap();
        assert_eq!(request_line(&request), "PUT /albums/_design/stats HTTP/1.0");
        assert_eq!(
            request_body(&request),
            json!({"_id": "_design/stats", "_rev": "3-aaa", "language": "javascript", "views": views})
        );
    }

    #[test]
    fn test_get_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(DiskCache::open(dir.path(), 1024 * 1024).unwrap());
        let (port, rx) = serve(vec![b"HTTP/1.0 200 OK\r\n\r\n{\"_id\":\"kob\",\"year\":1959}"]);
        let client = client_with_db(port, "albums").with_cache(cache.clone(), Duration::from_secs(60));

        let first = client.get("/kob").unwrap();
        assert_eq!(first.json().unwrap()["year"], 1959);
        rx.recv().unwrap();
        assert!(cache.get("/albums/kob").unwrap().is_some());

        let second = client.get("/kob").unwrap();
        assert_eq!(second.json().unwrap()["year"], 1959);
        assert!(second.headers.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_put_invalidates_cached_document() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(DiskCache::open(dir.path(), 1024 * 1024).unwrap());
        cache.set("/albums/kob", &json!({"year": 1958}), None).unwrap();
        let (port, _rx) = serve(vec![OK]);
        let client = client_with_db(port, "albums").with_cache(cache.clone(), Duration::from_secs(60));

        client.put("kob", &json!({"year": 1959})).unwrap();
        assert!(cache.get("/albums/kob").unwrap().is_none());
    }

    #[test]
    fn test_bulk_invalidates_cached_documents() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(DiskCache::open(dir.path(), 1024 * 1024).unwrap());
        cache.set("/albums/a", &json!({"n": 1}), None).unwrap();
        cache.set("/albums/b", &json!({"n": 2}), None).unwrap();
        cache.set("/albums/c", &json!({"n": 3}), None).unwrap();
        let (port, _rx) = serve(vec![OK]);
        let client = client_with_db(port, "albums").with_cache(cache.clone(), Duration::from_secs(60));

        client.bulk(&[json!({"_id": "a", "n": 10}), json!({"_id": "b", "_deleted": true}), json!({"n": 0})], false).unwrap();
        assert!(cache.get("/albums/a").unwrap().is_none());
        assert!(cache.get("/albums/b").unwrap().is_none());
        assert_eq!(cache.get("/albums/c").unwrap(), Some(json!({"n": 3})));
    }

    #[test]
    fn test_from_app_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            database: Some("albums".into()),
            user: Some("admin".into()),
            cache_dir: Some(dir.path().to_path_buf()),
            ..AppConfig::default()
        };
        let client = Client::from_app_config(&config).unwrap();
        assert_eq!(client.database(), Some("albums"));
        assert!(client.transport().auth().is_authenticated());
        assert!(client.cache.is_some());

        let missing = AppConfig { cache_dir: Some(dir.path().join("missing")), ..AppConfig::default() };
        assert!(matches!(Client::from_app_config(&missing), Err(Error::InvalidCacheLocation(_))));
    }
}
