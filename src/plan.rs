//! The request/response data model (spec §3: "RequestPlan", "Response").
//!
//! The teacher spreads this across `request.rs` (a call-site builder) and
//! `response.rs` (the returned value); this core keeps that split but names
//! the resolved, in-flight intent `RequestPlan` to match the spec's
//! vocabulary, since it is mutated in place by the redirect engine rather
//! than being a one-shot builder.

use std::time::Duration;

use url::Url;

use crate::auth::Auth;
use crate::error::{Error, HttpError};
use crate::header::HeaderMap;

/// The body a caller wants to send, before it is resolved into bytes plus an
/// implied `Content-Type` (spec §6: "json", "data").
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    None,
    /// Raw bytes, sent as-is with no implied `Content-Type`.
    Raw(Vec<u8>),
    /// A JSON string body; implies `Content-Type: application/json`.
    Json(String),
    /// A form-encoded string body; implies
    /// `Content-Type: application/x-www-form-urlencoded`.
    Form(String),
}

impl RequestBody {
    fn resolve(&self) -> (Option<Vec<u8>>, Option<&'static str>) {
        match self {
            RequestBody::None => (None, None),
            RequestBody::Raw(bytes) => (Some(bytes.clone()), None),
            RequestBody::Json(s) => (Some(s.clone().into_bytes()), Some("application/json")),
            RequestBody::Form(s) => {
                (Some(s.clone().into_bytes()), Some("application/x-www-form-urlencoded"))
            }
        }
    }
}

/// Per-call overrides layered onto the session/agent defaults (spec §6:
/// "Request options").
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Additional/overriding headers for this call.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
    /// Per-call timeout override.
    pub timeout: Option<Duration>,
    /// Per-call max-redirects override.
    pub max_redirects: Option<u32>,
    /// Per-call redirect-following override.
    pub allow_redirects: Option<bool>,
    /// Per-call TLS verification override.
    pub verify: Option<bool>,
    /// Per-call auth override.
    pub auth: Option<Auth>,
}

impl RequestOptions {
    /// A default set of options (no overrides).
    pub fn new() -> Self {
        RequestOptions::default()
    }

    /// Set a header, overriding any session default of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Send `body` as a JSON request body.
    pub fn json(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Json(body.into());
        self
    }

    /// Send `body` as a form-encoded request body.
    pub fn form(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Form(body.into());
        self
    }

    /// Send raw bytes as the request body.
    pub fn raw_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = RequestBody::Raw(body.into());
        self
    }

    /// Override the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the maximum number of redirects followed.
    pub fn max_redirects(mut self, n: u32) -> Self {
        self.max_redirects = Some(n);
        self
    }

    /// Override whether redirects are followed at all.
    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = Some(allow);
        self
    }

    /// Override TLS verification for this call.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    /// Override the auth scheme for this call.
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// The resolved, mutable intent for one outgoing request, threaded through
/// the redirect engine (spec §3 "RequestPlan", §4.7).
#[derive(Debug, Clone)]
pub struct RequestPlan {
    /// HTTP method, e.g. `"GET"`.
    pub method: String,
    /// Current target URL; rewritten in place by the redirect engine.
    pub url: Url,
    /// Merged headers (session defaults overridden by per-call options).
    pub headers: HeaderMap,
    /// Resolved request body, if any.
    pub body: Option<Vec<u8>>,
    /// Overall per-request deadline.
    pub timeout: Duration,
    /// Redirect ceiling for this request.
    pub max_redirects: u32,
    /// Whether redirects are followed at all.
    pub allow_redirects: bool,
    /// Whether the TLS peer certificate is verified.
    pub verify_tls: bool,
    /// Whether caller explicitly opted into carrying `Authorization` across
    /// a cross-origin redirect hop (spec §4.7 "Header scrubbing", default
    /// off).
    pub allow_cross_origin_auth: bool,
    /// Auth scheme applied to each hop, if any.
    pub auth: Option<Auth>,
    /// Responses from completed prior hops, most recent last.
    pub history: Vec<Response>,
}

impl RequestPlan {
    pub(crate) fn resolve_body(body: &RequestBody, headers: &mut HeaderMap) -> Option<Vec<u8>> {
        let (bytes, content_type) = body.resolve();
        if let Some(ct) = content_type {
            if !headers.contains("Content-Type") {
                headers.set("Content-Type", ct);
            }
        }
        bytes
    }

    /// `path?query`, the wire-format request target (spec §4.6 step 1).
    pub fn target(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{q}", self.url.path()),
            None => self.url.path().to_string(),
        }
    }
}

/// A completed response (spec §3 "Response").
#[derive(Debug, Clone)]
pub struct Response {
    /// Numeric status code.
    pub status: u16,
    /// Reason phrase as sent by the server.
    pub reason: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// Fully buffered response body.
    pub body: Vec<u8>,
    /// URL of the hop that produced this response.
    pub final_url: Url,
    /// Wall-clock time spent on this hop.
    pub elapsed: Duration,
    /// Prior hop responses, in order, for a redirect chain (spec §3: "may be
    /// empty" bodies are still populated here; we keep full bodies since we
    /// do not discard protocol data).
    pub history: Vec<Response>,
}

impl Response {
    /// Whether this status is one of the redirect codes the engine follows
    /// (spec §3: `301, 302, 303, 307, 308`).
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// Turn a `status >= 400` response into an [`HttpError`] (spec §4.1,
    /// §7). Leaves the response itself untouched — this is a read-only
    /// check the caller opts into.
    pub fn raise_for_status(&self) -> Result<(), HttpError> {
        if self.status >= 400 {
            Err(HttpError {
                status: self.status,
                reason: self.reason.clone(),
                final_url: self.final_url.clone(),
            })
        } else {
            Ok(())
        }
    }
}

/// Resolve `location` against `base` per RFC 3986 §5.3 (spec §4.7).
pub fn resolve_redirect_target(base: &Url, location: &str) -> Result<Url, Error> {
    base.join(location)
        .map_err(|e| Error::InvalidResponse(format!("bad redirect location {location:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_sets_content_type_when_absent() {
        let mut headers = HeaderMap::new();
        let bytes = RequestPlan::resolve_body(&RequestBody::Json("{}".into()), &mut headers);
        assert_eq!(bytes, Some(b"{}".to_vec()));
        assert_eq!(headers.get("Content-Type"), Some("application/json"));
    }

    #[test]
    fn explicit_content_type_is_not_overridden() {
        let mut headers = HeaderMap::new();
        headers.set("Content-Type", "text/plain");
        RequestPlan::resolve_body(&RequestBody::Json("{}".into()), &mut headers);
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn form_body_sets_url_encoded_content_type() {
        let mut headers = HeaderMap::new();
        let bytes = RequestPlan::resolve_body(&RequestBody::Form("k=v".into()), &mut headers);
        assert_eq!(bytes, Some(b"k=v".to_vec()));
        assert_eq!(headers.get("Content-Type"), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn redirect_status_codes_are_recognized() {
        let mk = |status| Response {
            status,
            reason: String::new(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            final_url: Url::parse("http://h/").unwrap(),
            elapsed: Duration::default(),
            history: Vec::new(),
        };
        for status in [301, 302, 303, 307, 308] {
            assert!(mk(status).is_redirect());
        }
        for status in [200, 404, 500] {
            assert!(!mk(status).is_redirect());
        }
    }

    #[test]
    fn relative_location_inherits_scheme_and_host() {
        let base = Url::parse("http://h/a/b").unwrap();
        let next = resolve_redirect_target(&base, "/next").unwrap();
        assert_eq!(next.as_str(), "http://h/next");
    }
}
