//! Dialing: DNS resolution, TCP connect, and TLS handshake (spec §4.5
//! "Acquire(origin)" steps 1–3).
//!
//! Grounded on the teacher's old `conn.rs` (`connect_http`/`connect_https`/
//! `connect_host`, a linear resolve-then-connect-then-handshake sequence) and
//! the modern teacher's `resolver.rs` (pluggable, timeout-bounded resolution).
//! Re-architected onto `tokio::net` and `tokio_rustls` per the async
//! suspension points named in spec §5.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadBuf};
use tokio::net::TcpStream;

use crate::error::Error;
use crate::pool::{Connection, OriginKey};
use crate::tls::TlsConfig;

/// A dialed transport: either a plain TCP stream or a TLS stream over one.
pub enum Transport {
    /// Plain `http://` connection.
    Plain(TcpStream),
    /// `https://` connection, TLS-terminated.
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Transport {
    /// The underlying TCP stream, used for non-blocking staleness checks
    /// (spec §4.5: "if the transport indicates readable data or EOF pending,
    /// discard it and retry").
    fn tcp(&self) -> &TcpStream {
        match self {
            Transport::Plain(s) => s,
            Transport::Tls(s) => s.get_ref().0,
        }
    }

    /// Non-blocking check for pending readable bytes or a pending EOF on an
    /// otherwise-idle connection. A pooled connection should never have data
    /// ready to read while idle; if it does, the peer half-closed or sent
    /// something unexpected and the connection must not be reused.
    pub(crate) async fn has_pending_data(&self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_millis(0), self.tcp().readable()).await,
            Ok(Ok(()))
        )
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Options that affect a single dial attempt.
pub struct DialOptions<'a> {
    /// Overall connect deadline (spec §4.5: "connect-timeout (default 30s)").
    pub connect_timeout: Duration,
    /// TLS trust configuration to use for `https` origins.
    pub tls: Option<&'a TlsConfig>,
    /// SNI / certificate verification name override (spec §4.5:
    /// "When `verify_config.hostname` is non-empty, use it ... in place of
    /// the URL host").
    pub verify_hostname_override: Option<&'a str>,
}

/// Resolve, connect, and (for `https`) handshake a fresh connection for
/// `origin`.
pub async fn dial(origin: &OriginKey, opts: DialOptions<'_>) -> Result<Connection, Error> {
    let deadline = opts.connect_timeout;

    let addr = tokio::time::timeout(deadline, resolve(origin.host(), origin.port()))
        .await
        .map_err(|_| Error::Timeout)??;

    let tcp = tokio::time::timeout(deadline, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|e| Error::ConnectionFailed(e.to_string()))?;
    let _ = tcp.set_nodelay(true);

    let transport = if origin.is_tls() {
        let tls = opts
            .tls
            .ok_or_else(|| Error::TlsHandshakeFailed("no tls configuration supplied".into()))?;
        let name = opts.verify_hostname_override.unwrap_or(origin.host());
        let server_name = rustls_pki_types::ServerName::try_from(name.to_string())
            .map_err(|_| Error::TlsHandshakeFailed(format!("invalid server name: {name}")))?;
        let connector = tokio_rustls::TlsConnector::from(tls.client_config.clone());
        let tls_stream = tokio::time::timeout(deadline, connector.connect(server_name, tcp))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| Error::TlsHandshakeFailed(e.to_string()))?;
        Transport::Tls(Box::new(tls_stream))
    } else {
        Transport::Plain(tcp)
    };

    Ok(Connection::new(origin.clone(), BufReader::new(transport)))
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    let target = format!("{host}:{port}");
    let mut addrs = tokio::net::lookup_host(&target)
        .await
        .map_err(|e| Error::ResolveFailed(e.to_string()))?;
    addrs
        .next()
        .ok_or_else(|| Error::ResolveFailed(format!("no addresses for {host}")))
}
