//! Structured result of an HTTP fetch.

use std::fmt;

/// Classifies why a fetch did not produce a usable body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Read or connect timeout after all retries
    Timeout,
    /// Connection-level failure after all retries
    Connect,
    /// Non-success HTTP status (retries exhausted for retriable codes)
    HttpStatus,
    /// Per-host circuit breaker is open
    CircuitOpen,
    /// URL previously answered 404/410 in this run
    Tombstone,
    /// Body was not decodable as the expected format
    Decode,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::Connect => "connect",
            ErrorClass::HttpStatus => "http_status",
            ErrorClass::CircuitOpen => "circuit_open",
            ErrorClass::Tombstone => "tombstone",
            ErrorClass::Decode => "decode",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one logical GET, after rate limiting, retries and breaker
/// checks. `ok` implies a 2xx status and a fully-read body.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub ok: bool,
    pub status: Option<u16>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub error_class: Option<ErrorClass>,
}

impl FetchOutcome {
    pub fn success(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            ok: true,
            status: Some(status),
            body,
            content_type,
            error_class: None,
        }
    }

    pub fn failure(status: Option<u16>, error_class: ErrorClass) -> Self {
        Self {
            ok: false,
            status,
            body: Vec::new(),
            content_type: None,
            error_class: Some(error_class),
        }
    }

    /// The URL answered 404/410 either now or earlier in this run.
    pub fn is_tombstone(&self) -> bool {
        matches!(self.error_class, Some(ErrorClass::Tombstone))
            || matches!(self.status, Some(404) | Some(410))
    }

    /// Parse the body as JSON, if there is one.
    pub fn json(&self) -> Option<serde_json::Value> {
        if !self.ok {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }
}
