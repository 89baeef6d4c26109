//! HTTP/1.0 response parser: status line, headers, then body until EOF.
//!
//! Lines are fed one at a time (bytes up to and including `\n`). The parser
//! starts in `ReadingHeaders`; the first non-blank line must be the status
//! line, later lines are `Name: value` headers, and a blank line switches to
//! `ReadingBody`, where every byte is kept verbatim. `finish` consumes the
//! parser, so one instance handles exactly one response.

use std::io::BufRead;
use std::sync::LazyLock;

use bytes::{BufMut, BytesMut};
use indexmap::IndexMap;
use regex::Regex;

use settee_core::Error;

static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HTTP/(?P<version>\d+\.\d+)\s+(?P<status>\d+)(?:\s+(?P<reason>.*))?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    ReadingHeaders,
    ReadingBody,
}

/// Parsed status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub code: u16,
    pub reason: Option<String>,
}

impl StatusLine {
    pub fn parse(line: &str) -> Result<Self, Error> {
        let caps = STATUS_LINE.captures(line).ok_or_else(|| Error::MalformedStatusLine(line.to_string()))?;
        let code = caps["status"].parse::<u16>().map_err(|_| Error::MalformedStatusLine(line.to_string()))?;
        let reason = caps.name("reason").map(|m| m.as_str().trim()).filter(|r| !r.is_empty()).map(str::to_string);
        Ok(Self { version: caps["version"].to_string(), code, reason })
    }
}

/// Raw parse result before any body decoding.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub status: StatusLine,
    /// Names as received; a repeated name keeps the last value.
    pub headers: IndexMap<String, String>,
    pub body: BytesMut,
}

/// Line-driven response parser.
#[derive(Debug)]
pub struct ResponseParser {
    state: ParseState,
    status: Option<StatusLine>,
    headers: IndexMap<String, String>,
    body: BytesMut,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self { state: ParseState::ReadingHeaders, status: None, headers: IndexMap::new(), body: BytesMut::new() }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Feed one line, including its trailing newline if it had one.
    pub fn feed_line(&mut self, line: &[u8]) -> Result<(), Error> {
        match self.state {
            ParseState::ReadingHeaders => {
                let text = String::from_utf8_lossy(line);
                let text = text.trim();

                if self.status.is_none() {
                    if !text.is_empty() {
                        self.status = Some(StatusLine::parse(text)?);
                    }
                    return Ok(());
                }

                if text.is_empty() {
                    self.state = ParseState::ReadingBody;
                    return Ok(());
                }

                match text.split_once(':') {
                    Some((name, value)) => {
                        self.headers.insert(name.trim().to_string(), value.trim().to_string());
                    }
                    None => {
                        self.headers.insert(text.to_string(), String::new());
                    }
                }
            }
            ParseState::ReadingBody => self.body.put_slice(line),
        }
        Ok(())
    }

    /// Complete the parse at end of stream.
    pub fn finish(self) -> Result<ParsedResponse, Error> {
        let status = self.status.ok_or_else(|| Error::MalformedStatusLine("empty response".into()))?;
        Ok(ParsedResponse { status, headers: self.headers, body: self.body })
    }

    /// Read lines from `reader` until EOF and parse them.
    ///
    /// I/O failures are handed to `on_io_error` so the caller decides how
    /// they are classified.
    pub fn parse_from<R, F>(mut self, reader: &mut R, on_io_error: F) -> Result<ParsedResponse, Error>
    where
        R: BufRead,
        F: Fn(std::io::Error) -> Error,
    {
        let mut line = Vec::with_capacity(256);
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line).map_err(&on_io_error)?;
            if n == 0 {
                break;
            }
            self.feed_line(&line)?;
        }
        self.finish()
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}
