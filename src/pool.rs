//! The per-origin connection pool (spec §4.5).
//!
//! Grounded on the teacher's `pool.rs` (an origin-keyed map with an
//! MRU-ish recycle slot) and `run.rs`'s `cleanup(connection, must_close, now)`
//! call, generalized to the richer lifecycle spec §3/§4.5 demand: a bounded
//! per-origin free list, an idle window, and an explicit known-good flag
//! that is cleared (never re-pooled) on any protocol or I/O error.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::io::BufReader;
use url::Url;

use crate::connect::{self, DialOptions, Transport};
use crate::error::Error;
use crate::tls::TlsConfig;

/// The `(host, port, is_tls)` tuple that partitions the pool (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginKey {
    host: String,
    port: u16,
    is_tls: bool,
}

impl OriginKey {
    /// Derive the origin key for `url`. Host comparison is case-insensitive;
    /// the default port is derived from the scheme when absent.
    pub fn from_url(url: &Url) -> Result<Self, Error> {
        let is_tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(Error::InvalidScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl("missing host".into()))?
            .to_ascii_lowercase();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidUrl("missing port".into()))?;
        Ok(OriginKey { host, port, is_tls })
    }

    /// The lower-cased host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The resolved port (explicit, or the scheme default).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether this origin requires TLS.
    pub fn is_tls(&self) -> bool {
        self.is_tls
    }
}

/// A live connection, exclusively owned by the caller holding it (spec §3).
pub struct Connection {
    pub(crate) reader: BufReader<Transport>,
    origin: OriginKey,
    created_at: Instant,
    last_used: Instant,
    known_good: bool,
}

impl Connection {
    pub(crate) fn new(origin: OriginKey, reader: BufReader<Transport>) -> Self {
        let now = Instant::now();
        Connection {
            reader,
            origin,
            created_at: now,
            last_used: now,
            known_good: true,
        }
    }

    /// The origin this connection was dialed for.
    pub fn origin(&self) -> &OriginKey {
        &self.origin
    }

    /// How long ago this connection was dialed.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Clear the known-good flag. Once cleared, [`Pool::release`] will
    /// always close rather than re-pool this connection (spec: "Known-good").
    pub fn mark_bad(&mut self) {
        self.known_good = false;
    }

    async fn is_reusable(&self, idle_window: Duration) -> bool {
        self.known_good
            && self.last_used.elapsed() <= idle_window
            && !self.reader.get_ref().has_pending_data().await
    }
}

/// Per-origin free lists plus the shared dial configuration.
pub struct Pool {
    free: Mutex<HashMap<OriginKey, Vec<Connection>>>,
    cap_per_origin: usize,
    idle_window: Duration,
    connect_timeout: Duration,
    tls: Option<TlsConfig>,
    tls_hostname_override: Option<String>,
    closed: Mutex<bool>,
}

/// Tunables for [`Pool::new`], resolved from session/agent configuration.
pub struct PoolConfig {
    /// Max idle connections kept per origin (spec §4.5: "default 8").
    pub cap_per_origin: usize,
    /// Idle window past which a pooled connection is not reused (spec §4.5:
    /// "default 90 s").
    pub idle_window: Duration,
    /// Connect deadline for dialing (spec §4.5: "default 30 s").
    pub connect_timeout: Duration,
    /// TLS trust configuration for `https` origins.
    pub tls: Option<TlsConfig>,
    /// SNI / verification name override (spec §4.5 `verify_config.hostname`).
    pub tls_hostname_override: Option<String>,
}

impl Pool {
    /// A new, empty pool.
    pub fn new(config: PoolConfig) -> Self {
        Pool {
            free: Mutex::new(HashMap::new()),
            cap_per_origin: config.cap_per_origin,
            idle_window: config.idle_window,
            connect_timeout: config.connect_timeout,
            tls: config.tls,
            tls_hostname_override: config.tls_hostname_override,
            closed: Mutex::new(false),
        }
    }

    /// Acquire a connection for `origin`: reuse a pooled one if a
    /// still-good, still-fresh one is available, otherwise dial fresh (spec
    /// §4.5 "Acquire(origin)").
    ///
    /// `verify_tls` selects the TLS configuration used for a *fresh* dial: a
    /// pooled connection is reused as-is regardless, since it was already
    /// dialed under whatever verification applied at the time. When
    /// `verify_tls` is `false`, an ephemeral [`TlsConfig::insecure`] is built
    /// for this one dial rather than mutating the pool's shared
    /// configuration (spec §5, §6 "verify").
    pub async fn acquire(&self, origin: &OriginKey, verify_tls: bool) -> Result<Connection, Error> {
        if *self.closed.lock().unwrap() {
            return Err(Error::ConnectionClosed);
        }

        loop {
            let candidate = {
                let mut free = self.free.lock().unwrap();
                free.get_mut(origin).and_then(|list| list.pop())
            };
            match candidate {
                Some(conn) => {
                    if conn.is_reusable(self.idle_window).await {
                        return Ok(conn);
                    }
                    // Stale or no-longer-good: discard and try the next one.
                    continue;
                }
                None => break,
            }
        }

        let insecure;
        let tls = if verify_tls {
            self.tls.as_ref()
        } else {
            insecure = TlsConfig::insecure();
            Some(&insecure)
        };

        connect::dial(
            origin,
            DialOptions {
                connect_timeout: self.connect_timeout,
                tls,
                verify_hostname_override: self.tls_hostname_override.as_deref(),
            },
        )
        .await
    }

    /// Return a connection after use. `clean` reflects whether the hop
    /// completed without protocol/I/O error and both sides allow keep-alive;
    /// otherwise the connection is dropped (never re-pooled) (spec §4.5
    /// "Release(connection, outcome)").
    pub fn release(&self, mut conn: Connection, clean: bool) {
        if !clean || !conn.known_good || *self.closed.lock().unwrap() {
            return;
        }
        conn.last_used = Instant::now();
        let mut free = self.free.lock().unwrap();
        let list = free.entry(conn.origin.clone()).or_default();
        if list.len() < self.cap_per_origin {
            list.push(conn);
        }
        // else: over cap, drop silently (closes on Drop).
    }

    /// Drop all free connections and forbid further acquisition (spec §4.5
    /// invariants, §6 `Agent::close`).
    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
        self.free.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_key_derives_default_ports() {
        let http = OriginKey::from_url(&Url::parse("http://Example.com/a").unwrap()).unwrap();
        assert_eq!(http.host(), "example.com");
        assert_eq!(http.port(), 80);
        assert!(!http.is_tls());

        let https = OriginKey::from_url(&Url::parse("https://example.com/a").unwrap()).unwrap();
        assert_eq!(https.port(), 443);
        assert!(https.is_tls());
    }

    #[test]
    fn origin_key_rejects_unsupported_scheme() {
        let err = OriginKey::from_url(&Url::parse("ftp://example.com/a").unwrap()).unwrap_err();
        assert!(matches!(err, Error::InvalidScheme(_)));
    }

    #[test]
    fn origin_key_is_case_insensitive_on_host() {
        let a = OriginKey::from_url(&Url::parse("http://Example.COM/").unwrap()).unwrap();
        let b = OriginKey::from_url(&Url::parse("http://example.com/").unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
