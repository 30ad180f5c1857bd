//! The core error taxonomy.
//!
//! Transport and protocol failures are reported as [`Error`]. HTTP application
//! errors (status >= 400) are *not* part of this enum: they are ordinary
//! [`Response`][crate::plan::Response] values, and the caller opts into turning
//! them into an error via [`Response::raise_for_status`][crate::plan::Response::raise_for_status],
//! which produces an [`HttpError`].

use std::fmt;
use std::io;

/// Transport and protocol failures.
///
/// Each variant corresponds to one of the classified failure kinds from the
/// core's error taxonomy. The taxonomy is deliberately flat: there is no
/// nested "caused by" chain beyond what [`std::error::Error::source`] exposes
/// for the I/O and URL-parsing variants.
#[derive(Debug)]
pub enum Error {
    /// The URL could not be parsed.
    InvalidUrl(String),
    /// The URL scheme is not `http` or `https`.
    InvalidScheme(String),
    /// DNS resolution failed for the request's host.
    ResolveFailed(String),
    /// The TCP connection could not be established.
    ConnectionFailed(String),
    /// The TLS handshake did not complete.
    TlsHandshakeFailed(String),
    /// The request's deadline elapsed before completion.
    Timeout,
    /// More redirects were required than `max_redirects` allows.
    TooManyRedirects,
    /// A response body (or header block) exceeded its configured limit.
    BodyTooLarge,
    /// The response could not be parsed as HTTP/1.x.
    InvalidResponse(String),
    /// The connection was closed by the peer mid-message.
    ConnectionClosed,
    /// The caller dropped the future or otherwise cancelled the request.
    Cancelled,
    /// A feature the core intentionally does not implement (see spec Non-goals).
    NotImplemented(&'static str),
    /// Low-level I/O error not otherwise classified above.
    Io(io::Error),
}

impl Error {
    /// A stable numeric identifier for the error kind, independent of the
    /// associated detail string. Useful for callers that want to match on
    /// kind without string comparison.
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidUrl(_) => 1,
            Error::InvalidScheme(_) => 2,
            Error::ResolveFailed(_) => 3,
            Error::ConnectionFailed(_) => 4,
            Error::TlsHandshakeFailed(_) => 5,
            Error::Timeout => 6,
            Error::TooManyRedirects => 7,
            Error::BodyTooLarge => 8,
            Error::InvalidResponse(_) => 9,
            Error::ConnectionClosed => 10,
            Error::Cancelled => 11,
            Error::NotImplemented(_) => 12,
            Error::Io(_) => 13,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidUrl(u) => write!(f, "invalid url: {u}"),
            Error::InvalidScheme(s) => write!(f, "unsupported scheme: {s}"),
            Error::ResolveFailed(host) => write!(f, "dns resolution failed for {host}"),
            Error::ConnectionFailed(detail) => write!(f, "connection failed: {detail}"),
            Error::TlsHandshakeFailed(detail) => write!(f, "tls handshake failed: {detail}"),
            Error::Timeout => write!(f, "request timed out"),
            Error::TooManyRedirects => write!(f, "too many redirects"),
            Error::BodyTooLarge => write!(f, "response body exceeded the configured limit"),
            Error::InvalidResponse(detail) => write!(f, "invalid response: {detail}"),
            Error::ConnectionClosed => write!(f, "connection closed unexpectedly"),
            Error::Cancelled => write!(f, "request cancelled"),
            Error::NotImplemented(what) => write!(f, "not implemented: {what}"),
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::TimedOut {
            Error::Timeout
        } else {
            Error::Io(e)
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Error {
        Error::InvalidUrl(e.to_string())
    }
}

/// A structured HTTP application error, raised on demand by
/// [`Response::raise_for_status`][crate::plan::Response::raise_for_status] when
/// `status >= 400`.
///
/// This is intentionally not a variant of [`Error`]: an error-status response
/// is a complete, well-formed response (headers, body, history, cookies all
/// populated as usual), not a transport failure.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// The response's numeric status code.
    pub status: u16,
    /// The response's reason phrase, as sent by the server.
    pub reason: String,
    /// The URL of the final hop that produced this response.
    pub final_url: url::Url,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} for url: {}", self.status, self.reason, self.final_url)
    }
}

impl std::error::Error for HttpError {}
