//! HTTP exchange implementation.
//!
//! The HTTP library is abstracted behind [`HttpClient`] so the engine does
//! not pick one. Bodies are CBOR in both directions.

use crate::config::SyncConfig;
use crate::error::{RemoteErrorKind, SyncError, SyncResult};
use crate::exchange::RemoteExchange;
use parking_lot::RwLock;
use replica_sync_protocol::{ExchangeRequest, ExchangeResponse, Session};
use std::fmt;
use std::time::Duration;

/// A POST request as handed to the client.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Full URL.
    pub url: String,
    /// `Authorization` header value, if the session supplied one.
    pub authorization: Option<String>,
    /// CBOR body.
    pub body: Vec<u8>,
    /// Give up after this long.
    pub timeout: Duration,
}

/// Why an HTTP request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The connection could not be made or broke.
    Connect(String),
    /// The deadline passed.
    Timeout,
    /// The server answered with a non-success status.
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body or reason phrase.
        message: String,
    },
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Connect(message) => write!(f, "connection failed: {message}"),
            HttpError::Timeout => f.write_str("request timed out"),
            HttpError::Status { code, message } => write!(f, "HTTP {code}: {message}"),
        }
    }
}

impl From<HttpError> for SyncError {
    fn from(e: HttpError) -> Self {
        let kind = match &e {
            HttpError::Connect(_) => RemoteErrorKind::Network,
            HttpError::Timeout => RemoteErrorKind::Timeout,
            HttpError::Status { code: 401 | 403, .. } => RemoteErrorKind::Auth,
            HttpError::Status { .. } => RemoteErrorKind::Server,
        };
        SyncError::remote(kind, e.to_string())
    }
}

/// HTTP client abstraction.
///
/// Implement this trait over reqwest, ureq, hyper or anything else that can
/// POST bytes.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body of a 2xx answer.
    fn post(&self, request: HttpRequest) -> Result<Vec<u8>, HttpError>;
}

/// Exchange over HTTP.
pub struct HttpExchange<C: HttpClient> {
    url: String,
    timeout: Duration,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpExchange<C> {
    /// Creates an exchange posting to `config.exchange_url()`.
    pub fn new(config: &SyncConfig, client: C) -> Self {
        Self {
            url: config.exchange_url(),
            timeout: config.timeout,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the exchange URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the message of the most recent failed request.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: HttpClient> RemoteExchange for HttpExchange<C> {
    fn exchange(
        &self,
        session: &dyn Session,
        request: &ExchangeRequest,
    ) -> SyncResult<ExchangeResponse> {
        let body = request.encode()?;
        let http_request = HttpRequest {
            url: self.url.clone(),
            authorization: session.authorization(),
            body,
            timeout: self.timeout,
        };

        let response_body = self.client.post(http_request).map_err(|e| {
            *self.last_error.write() = Some(e.to_string());
            SyncError::from(e)
        })?;
        *self.last_error.write() = None;

        Ok(ExchangeResponse::decode(&response_body)?)
    }
}

/// Something that can answer exchange requests in process.
pub trait ExchangeHandler: Send + Sync {
    /// Handles a POST to `path` and returns the response body.
    fn handle_post(
        &self,
        path: &str,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<Vec<u8>, HttpError>;
}

/// A client that routes requests straight to an in-process handler.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<H: ExchangeHandler> {
    handler: H,
}

impl<H: ExchangeHandler> LoopbackClient<H> {
    /// Creates a client connected to `handler`.
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: ExchangeHandler> HttpClient for LoopbackClient<H> {
    fn post(&self, request: HttpRequest) -> Result<Vec<u8>, HttpError> {
        // Strip scheme and authority.
        let after_scheme = request
            .url
            .find("://")
            .map_or(request.url.as_str(), |i| &request.url[i + 3..]);
        let path = after_scheme.find('/').map_or("/", |i| &after_scheme[i..]);

        self.handler
            .handle_post(path, request.authorization.as_deref(), &request.body)
    }
}

impl<H: ExchangeHandler + ?Sized> ExchangeHandler for std::sync::Arc<H> {
    fn handle_post(
        &self,
        path: &str,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<Vec<u8>, HttpError> {
        (**self).handle_post(path, authorization, body)
    }
}
