//! An asynchronous, session-oriented HTTP/HTTPS client core.
//!
//! [`Agent`] owns a pooled set of connections and a cookie jar; cloning it
//! shares both. [`Agent::request`] (or the `get`/`post`/... convenience
//! methods) drives one logical request through redirects, cookie handling,
//! and optional auth challenge retries, returning a buffered [`Response`].
//!
//! ```no_run
//! # async fn go() -> Result<(), reqflow::Error> {
//! let agent = reqflow::Agent::new();
//! let resp = agent.get("https://example.com").await?;
//! resp.raise_for_status()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod agent;
mod auth;
mod body;
mod connect;
mod cookies;
mod error;
mod header;
mod plan;
mod pool;
mod redirect;
mod run;
mod tls;
mod wire;

pub use agent::{Agent, AgentBuilder};
pub use auth::Auth;
pub use body::{BodyStream, StreamedResponse};
pub use cookies::{Cookie, Jar, SameSite};
pub use error::{Error, HttpError};
pub use header::{Header, HeaderMap};
pub use plan::{RequestBody, RequestOptions, Response};
pub use tls::TlsConfig;

/// `GET` a URL with a one-off default-configured agent.
///
/// Convenience wrapper matching the teacher's top-level `ureq::get(...)`
/// style; for anything beyond a single call, build an [`Agent`] and reuse
/// it so connections and cookies are shared.
pub async fn get(url: &str) -> Result<Response, Error> {
    Agent::new().get(url).await
}

/// `POST` a URL with a one-off default-configured agent.
pub async fn post(url: &str, options: RequestOptions) -> Result<Response, Error> {
    Agent::new().post(url, options).await
}

/// `PUT` a URL with a one-off default-configured agent.
pub async fn put(url: &str, options: RequestOptions) -> Result<Response, Error> {
    Agent::new().put(url, options).await
}

/// `DELETE` a URL with a one-off default-configured agent.
pub async fn delete(url: &str) -> Result<Response, Error> {
    Agent::new().delete(url).await
}
