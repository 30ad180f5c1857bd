//! The session-level entry point: [`Agent`] and [`AgentBuilder`] (spec §6).
//!
//! The teacher's `Agent` is an `Arc<AgentInner>` wrapping a connection pool,
//! a cookie store, and default configuration, built through an
//! `AgentBuilder` (teacher's `config.rs`/old `agent.rs`). This module keeps
//! that exact shape: an `Arc`-shared inner so cloning an `Agent` shares one
//! pool and one jar, per spec §6 "Cloning an Agent shares pool and jar".

use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use crate::auth::Auth;
use crate::body::StreamedResponse;
use crate::cookies::Jar;
use crate::error::Error;
use crate::header::HeaderMap;
use crate::plan::{RequestOptions, RequestPlan, Response};
use crate::pool::{Connection, Pool, PoolConfig};
use crate::redirect;
use crate::run::HopLimits;
use crate::tls::TlsConfig;
use crate::wire::DEFAULT_MAX_HEADER_BYTES;

const DEFAULT_MAX_REDIRECTS: u32 = 30;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IDLE_WINDOW: Duration = Duration::from_secs(90);
const DEFAULT_POOL_CAP_PER_ORIGIN: usize = 8;

struct AgentInner {
    pool: Pool,
    jar: Mutex<Jar>,
    default_headers: HeaderMap,
    default_auth: Option<Auth>,
    max_redirects: u32,
    timeout: Duration,
    verify_tls: bool,
    allow_cross_origin_auth: bool,
    max_body_bytes: Option<usize>,
}

/// A shared HTTP client session: connection pool, cookie jar, and request
/// defaults (spec §6).
///
/// Cloning is cheap (an `Arc` bump) and shares the pool and jar with the
/// original — exactly the teacher's `Agent::clone` contract.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

/// Builds an [`Agent`] with non-default configuration (spec §6).
pub struct AgentBuilder {
    default_headers: HeaderMap,
    default_auth: Option<Auth>,
    max_redirects: u32,
    timeout: Duration,
    connect_timeout: Duration,
    idle_window: Duration,
    pool_cap_per_origin: usize,
    verify_tls: bool,
    allow_cross_origin_auth: bool,
    max_body_bytes: Option<usize>,
    tls_hostname_override: Option<String>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.set("User-Agent", concat!("reqflow/", env!("CARGO_PKG_VERSION")));
        AgentBuilder {
            default_headers,
            default_auth: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_window: DEFAULT_IDLE_WINDOW,
            pool_cap_per_origin: DEFAULT_POOL_CAP_PER_ORIGIN,
            verify_tls: true,
            allow_cross_origin_auth: false,
            max_body_bytes: None,
            tls_hostname_override: None,
        }
    }
}

impl AgentBuilder {
    /// A builder with the spec's stated defaults.
    pub fn new() -> Self {
        AgentBuilder::default()
    }

    /// Set (overriding) a default header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.set(name, value);
        self
    }

    /// Set the default auth scheme applied to every request that doesn't
    /// override it per-call.
    pub fn auth(mut self, auth: Auth) -> Self {
        self.default_auth = Some(auth);
        self
    }

    /// Default maximum redirect hops (spec §6: default 30).
    pub fn max_redirects(mut self, n: u32) -> Self {
        self.max_redirects = n;
        self
    }

    /// Default per-request deadline (spec §6: default 30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Default connect deadline (spec §4.5: default 30s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Idle window past which a pooled connection is not reused (spec §4.5:
    /// default 90s).
    pub fn idle_window(mut self, window: Duration) -> Self {
        self.idle_window = window;
        self
    }

    /// Max idle connections kept per origin (spec §4.5: default 8).
    pub fn pool_cap_per_origin(mut self, cap: usize) -> Self {
        self.pool_cap_per_origin = cap;
        self
    }

    /// Default TLS certificate verification (spec §6: default true).
    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Override the name used for SNI and certificate verification,
    /// independent of the request URL's host (spec §4.5
    /// `verify_config.hostname`).
    pub fn tls_hostname_override(mut self, hostname: impl Into<String>) -> Self {
        self.tls_hostname_override = Some(hostname.into());
        self
    }

    /// Whether `Authorization` survives a cross-origin redirect hop by
    /// default (spec §4.7 "Header scrubbing", default false).
    pub fn allow_cross_origin_auth(mut self, allow: bool) -> Self {
        self.allow_cross_origin_auth = allow;
        self
    }

    /// Cap on a fully-buffered response body (spec: default unbounded).
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    /// Build the [`Agent`].
    pub fn build(self) -> Agent {
        let tls = Some(TlsConfig::platform_verified());
        let pool = Pool::new(PoolConfig {
            cap_per_origin: self.pool_cap_per_origin,
            idle_window: self.idle_window,
            connect_timeout: self.connect_timeout,
            tls,
            tls_hostname_override: self.tls_hostname_override,
        });
        Agent {
            inner: Arc::new(AgentInner {
                pool,
                jar: Mutex::new(Jar::new()),
                default_headers: self.default_headers,
                default_auth: self.default_auth,
                max_redirects: self.max_redirects,
                timeout: self.timeout,
                verify_tls: self.verify_tls,
                allow_cross_origin_auth: self.allow_cross_origin_auth,
                max_body_bytes: self.max_body_bytes,
            }),
        }
    }
}

impl Agent {
    /// An agent with the spec's stated defaults.
    pub fn new() -> Self {
        AgentBuilder::new().build()
    }

    /// Access the cookie jar shared by every request made through this
    /// agent (and its clones).
    pub fn cookies(&self) -> std::sync::MutexGuard<'_, Jar> {
        self.inner.jar.lock().unwrap()
    }

    /// Issue a request, following redirects per the agent's (or the
    /// option's) policy (spec §4.6, §4.7).
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        let url = Url::parse(url)?;
        let plan = self.build_plan(method, url, options)?;
        let limits = HopLimits {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: self.inner.max_body_bytes,
        };
        redirect::execute(&self.inner.pool, &self.inner.jar, plan, &limits).await
    }

    /// `GET` convenience method.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        self.request("GET", url, RequestOptions::new()).await
    }

    /// `POST` convenience method.
    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<Response, Error> {
        self.request("POST", url, options).await
    }

    /// `PUT` convenience method.
    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<Response, Error> {
        self.request("PUT", url, options).await
    }

    /// `PATCH` convenience method.
    pub async fn patch(&self, url: &str, options: RequestOptions) -> Result<Response, Error> {
        self.request("PATCH", url, options).await
    }

    /// `DELETE` convenience method.
    pub async fn delete(&self, url: &str) -> Result<Response, Error> {
        self.request("DELETE", url, RequestOptions::new()).await
    }

    /// `HEAD` convenience method.
    pub async fn head(&self, url: &str) -> Result<Response, Error> {
        self.request("HEAD", url, RequestOptions::new()).await
    }

    /// `OPTIONS` convenience method.
    pub async fn options(&self, url: &str) -> Result<Response, Error> {
        self.request("OPTIONS", url, RequestOptions::new()).await
    }

    /// Issue a request whose body is streamed lazily instead of buffered
    /// (spec §6 `*_streamed` variants).
    pub async fn request_streamed(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<StreamedResponse, Error> {
        let url = Url::parse(url)?;
        let plan = self.build_plan(method, url, options)?;
        let limits = HopLimits {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: self.inner.max_body_bytes,
        };
        redirect::execute_streamed(&self.inner.pool, &self.inner.jar, plan, &limits, self.clone())
            .await
    }

    /// `GET` convenience method with a streamed body.
    pub async fn get_streamed(&self, url: &str) -> Result<StreamedResponse, Error> {
        self.request_streamed("GET", url, RequestOptions::new()).await
    }

    /// `POST` convenience method with a streamed body.
    pub async fn post_streamed(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<StreamedResponse, Error> {
        self.request_streamed("POST", url, options).await
    }

    /// Close the pool: drop all idle connections and refuse to acquire new
    /// ones (spec §6 `Agent::close`).
    pub fn close(&self) {
        self.inner.pool.close();
    }

    pub(crate) fn release_connection(&self, conn: Connection, clean: bool) {
        self.inner.pool.release(conn, clean);
    }

    fn build_plan(
        &self,
        method: &str,
        url: Url,
        options: RequestOptions,
    ) -> Result<RequestPlan, Error> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::InvalidScheme(url.scheme().to_string()));
        }

        let mut headers = self.inner.default_headers.clone();
        headers.merge_override(&options.headers);

        let body = RequestPlan::resolve_body(&options.body, &mut headers);
        let auth = options.auth.or_else(|| self.inner.default_auth.clone());

        Ok(RequestPlan {
            method: method.to_string(),
            url,
            headers,
            body,
            timeout: options.timeout.unwrap_or(self.inner.timeout),
            max_redirects: options.max_redirects.unwrap_or(self.inner.max_redirects),
            allow_redirects: options.allow_redirects.unwrap_or(true),
            verify_tls: options.verify.unwrap_or(self.inner.verify_tls),
            allow_cross_origin_auth: self.inner.allow_cross_origin_auth,
            auth,
            history: Vec::new(),
        })
    }
}

impl Default for Agent {
    fn default() -> Self {
        Agent::new()
    }
}
