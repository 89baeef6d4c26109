//! Blocking HTTP/1.0 transport: one TCP connection per request.
//!
//! `execute` builds the request, connects, writes it, reads until the server
//! closes the connection, and parses the result. The socket is closed on every
//! exit path. Calls are independent; a `Transport` can be shared across
//! threads once configured, and each call is tracked separately for
//! cancellation.

use std::collections::HashMap;
use std::io::{self, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use settee_core::{AppConfig, Error};

use super::headers::Headers;
use super::parser::ResponseParser;
use super::request::{Method, Request, RequestBuilder};
use super::response::Response;
use crate::auth::{AuthProvider, Credentials};

const CANCELLED: &str = "request cancelled";

/// Connection settings for a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub user_agent: String,
    /// Applied to connect, write, and read. `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    /// Decode response bodies as JSON.
    pub decode: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Self::default() }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user_agent: config.user_agent.clone(),
            timeout: Some(config.timeout()),
            decode: config.decode,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_decode(mut self, decode: bool) -> Self {
        self.decode = decode;
        self
    }

    fn socket_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

#[derive(Debug)]
struct InFlight {
    stream: Option<TcpStream>,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct CancelState {
    next_id: AtomicU64,
    requests: Mutex<HashMap<u64, InFlight>>,
}

/// Aborts the requests currently in flight on the owning transport.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Shut down every in-flight socket. Each pending `execute` fails with
    /// `Error::Read("request cancelled")`. Requests started afterwards are
    /// unaffected; no effect when idle.
    pub fn cancel(&self) {
        for (id, request) in self.requests().iter_mut() {
            request.cancelled = true;
            if let Some(stream) = &request.stream
                && let Err(e) = stream.shutdown(Shutdown::Both)
            {
                tracing::debug!(request = *id, "shutdown on cancel failed: {e}");
            }
        }
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.requests().len()
    }

    fn requests(&self) -> MutexGuard<'_, HashMap<u64, InFlight>> {
        self.state.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> RequestGuard<'_> {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        self.requests().insert(id, InFlight { stream: None, cancelled: false });
        RequestGuard { handle: self, id }
    }
}

/// Cancellation slot of one `send`; removed from the handle on drop.
struct RequestGuard<'a> {
    handle: &'a CancelHandle,
    id: u64,
}

impl RequestGuard<'_> {
    fn is_cancelled(&self) -> bool {
        self.handle.requests().get(&self.id).is_some_and(|r| r.cancelled)
    }

    fn register(&self, stream: &TcpStream) -> Result<(), Error> {
        let mut requests = self.handle.requests();
        let Some(request) = requests.get_mut(&self.id) else {
            return Ok(());
        };
        if request.cancelled {
            return Err(Error::Read(CANCELLED.into()));
        }
        match stream.try_clone() {
            Ok(clone) => request.stream = Some(clone),
            Err(e) => tracing::debug!(request = self.id, "request cannot be cancelled: {e}"),
        }
        Ok(())
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.handle.requests().remove(&self.id);
    }
}

/// HTTP transport bound to one server.
#[derive(Debug)]
pub struct Transport {
    config: TransportConfig,
    auth: AuthProvider,
    builder: RequestBuilder,
    cancel: CancelHandle,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        let builder = RequestBuilder::new(&config.host, config.port, config.user_agent.clone());
        Self { config, auth: AuthProvider::new(), builder, cancel: CancelHandle::default() }
    }

    /// Transport for the configured server, with credentials applied.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let mut transport = Self::new(TransportConfig::from_app_config(config));
        if config.credentials_configured() {
            transport.auth.configure(Credentials::new(config.user.clone(), config.pass.clone(), config.auth_scheme));
        }
        transport
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthProvider {
        &self.auth
    }

    /// Replace the credentials used for subsequent requests.
    pub fn login(&mut self, user: Option<&str>, pass: Option<&str>, scheme: Option<&str>) -> Result<(), Error> {
        self.auth.login(user, pass, scheme)
    }

    pub fn logout(&mut self) {
        self.auth.logout();
    }

    pub fn set_decode(&mut self, decode: bool) {
        self.config.decode = decode;
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Perform one request/response exchange.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a bad path or header before any I/O.
    /// - `Connection`, `Write`, `Read`, or `Timeout` on the network leg.
    /// - `MalformedStatusLine` if the response does not start with a status line.
    /// - `Remote` if the body is a JSON object with a non-empty `error` field.
    pub fn execute(
        &self, method: Method, path: &str, body: Option<Vec<u8>>, headers: Headers,
    ) -> Result<Response, Error> {
        let mut request = Request::new(method, path).headers(headers);
        request.body = body;
        self.send(request)
    }

    /// Like [`execute`](Self::execute), for a prepared [`Request`].
    pub fn send(&self, request: Request) -> Result<Response, Error> {
        let method = request.method;
        let path = request.path.clone();
        let wire = self.builder.build(request, &self.auth)?;

        let guard = self.cancel.begin();
        let started = Instant::now();
        tracing::debug!(%method, path = %path, bytes = wire.len(), "sending request");

        let stream = self.connect()?;
        let result = self.exchange(&guard, &stream, &wire);
        drop(guard);
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            tracing::trace!("socket shutdown: {e}");
        }
        drop(stream);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(response) => {
                tracing::debug!(%method, path = %path, status = response.status_code, elapsed_ms, "received response");
                Ok(response)
            }
            Err(e @ Error::Remote { .. }) => {
                tracing::warn!(%method, path = %path, elapsed_ms, "server reported error: {e}");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn exchange(&self, guard: &RequestGuard<'_>, stream: &TcpStream, wire: &[u8]) -> Result<Response, Error> {
        guard.register(stream)?;

        let mut writer = stream;
        writer.write_all(wire).and_then(|()| writer.flush()).map_err(|e| io_error(guard, e, Error::Write))?;

        let mut reader = BufReader::new(stream);
        let parsed = ResponseParser::new().parse_from(&mut reader, |e| io_error(guard, e, Error::Read));

        if guard.is_cancelled() {
            return Err(Error::Read(CANCELLED.into()));
        }
        Response::from_parsed(parsed?, self.config.decode)
    }

    fn connect(&self) -> Result<TcpStream, Error> {
        let host = self.config.host.as_str();
        let port = self.config.port;
        let timeout = self.config.socket_timeout();
        let connection_error =
            |message: String| Error::Connection { host: host.to_string(), port, message };

        let addrs: Vec<SocketAddr> =
            (host, port).to_socket_addrs().map_err(|e| connection_error(e.to_string()))?.collect();

        let mut last_error = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_read_timeout(timeout).map_err(|e| connection_error(e.to_string()))?;
                    stream.set_write_timeout(timeout).map_err(|e| connection_error(e.to_string()))?;
                    return Ok(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(Error::Timeout(format!("connecting to {host}:{port}")));
                }
                Err(e) => {
                    tracing::debug!(%addr, "connect failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        let message = last_error.map_or_else(|| "no addresses resolved".to_string(), |e| e.to_string());
        Err(connection_error(message))
    }
}

fn io_error(guard: &RequestGuard<'_>, e: io::Error, wrap: fn(String) -> Error) -> Error {
    if guard.is_cancelled() {
        return Error::Read(CANCELLED.into());
    }
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout(e.to_string()),
        _ => wrap(e.to_string()),
    }
}
