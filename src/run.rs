//! The single-hop request pipeline (spec §4.6): build, send, receive,
//! integrate.
//!
//! Grounded on the teacher's `run.rs` (`run(agent, request) -> Response`,
//! the loop that pairs one `Acquire`/`Release` with a single stale-socket
//! retry) and `unit.rs`'s `send_request`/`do_run` split between writing and
//! reading. The auth challenge-and-retry step is new here (the teacher
//! handles it via a `Middleware`; spec §4.6 step 6 folds it into the hop
//! itself).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;
use tokio::io::BufReader;

use crate::auth::AuthContext;
use crate::connect::Transport;
use crate::cookies::Jar;
use crate::error::Error;
use crate::header::HeaderMap;
use crate::plan::{RequestPlan, Response};
use crate::pool::{Connection, OriginKey, Pool};
use crate::wire;

/// The status line, headers, and body decoder for one hop, with the body
/// not yet read (spec §4.6 step 5: "for streaming mode, expose a lazy
/// sequence of byte chunks"). `response.body` is always empty here.
pub struct RawHop {
    /// The response so far: status, reason, headers — `body` is empty.
    pub response: Response,
    /// The connection the response came in on, still positioned right
    /// after the header block.
    pub conn: Connection,
    /// The body decoder, ready to hand out chunks.
    pub decoder: wire::BodyDecoder,
    /// Whether the connection can be reused once the body is fully drained.
    pub clean: bool,
}

/// Like [`send_one_hop`], but stops right after the header block instead of
/// buffering the body, so the caller can either discard it (redirect/auth
/// retry hops) or stream it to completion (the final hop of a `*_streamed`
/// call).
pub async fn send_one_hop_head(
    pool: &Pool,
    jar: &Mutex<Jar>,
    plan: &RequestPlan,
    limits: &HopLimits,
) -> Result<RawHop, Error> {
    let origin = OriginKey::from_url(&plan.url)?;
    let headers = build_headers(plan, jar);
    let target = plan.target();

    let mut last_err = None;
    for attempt in 0..2 {
        let mut conn = pool.acquire(&origin, plan.verify_tls).await?;
        match try_hop_head(&mut conn, &plan.method, &target, &headers, plan.body.as_deref(), limits)
            .await
        {
            Ok((mut response, decoder, clean)) => {
                response.final_url = plan.url.clone();
                absorb_set_cookies(jar, &response.headers, &plan.url);
                debug!("{} {} -> {}", plan.method, plan.url, response.status);
                return Ok(RawHop { response, conn, decoder, clean });
            }
            Err(err) if attempt == 0 && is_retryable_write_failure(&err) => {
                debug!("stale pooled connection for {}, retrying fresh", origin_display(&plan.url));
                conn.mark_bad();
                pool.release(conn, false);
                last_err = Some(err);
                continue;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or(Error::ConnectionClosed))
}

fn origin_display(url: &url::Url) -> String {
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""))
}

/// Tunables that don't belong on [`RequestPlan`] because they're fixed for
/// the lifetime of the agent, not per-request (spec §4.4, §6).
pub struct HopLimits {
    /// Cap on the combined status-line/header block size.
    pub max_header_bytes: usize,
    /// Cap on a fully-buffered response body, if any (spec: "default
    /// unbounded").
    pub max_body_bytes: Option<usize>,
}

/// Run exactly one request/response exchange against `plan.url` (no
/// redirect following — that's the caller's job, spec §4.7). Integrates
/// `Set-Cookie` into `jar`, retries once transparently on a stale pooled
/// connection, and retries once on a `401` if the auth scheme asks for it.
///
/// `remaining` is the time left on the request's single overall deadline
/// (spec §5: "each request carries a single deadline"), not `plan.timeout`
/// re-armed per hop — the caller (the redirect engine) computes it once and
/// passes down what's left on every call.
pub async fn send_one_hop(
    pool: &Pool,
    jar: &Mutex<Jar>,
    plan: &RequestPlan,
    limits: &HopLimits,
    remaining: Duration,
) -> Result<Response, Error> {
    let origin = OriginKey::from_url(&plan.url)?;
    let start = Instant::now();

    let deadline_fut = async {
        let mut allow_auth_retry = true;
        loop {
            let headers = build_headers(plan, jar);
            match send_and_receive(pool, &origin, plan, &headers, limits).await {
                Ok((response, conn, clean)) => {
                    pool.release(conn, clean);
                    absorb_set_cookies(jar, &response.headers, &plan.url);
                    if allow_auth_retry && response.status == 401 {
                        if let Some(auth) = &plan.auth {
                            if auth.handle_challenge(&response) {
                                log::warn!("401 from {}, retrying once with auth challenge", plan.url);
                                allow_auth_retry = false;
                                continue;
                            }
                        }
                    }
                    return Ok(response);
                }
                Err(err) => return Err(err),
            }
        }
    };

    let mut response = tokio::time::timeout(remaining, deadline_fut)
        .await
        .map_err(|_| Error::Timeout)??;
    response.elapsed = start.elapsed();
    Ok(response)
}

fn build_headers(plan: &RequestPlan, jar: &Mutex<Jar>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.set("Host", host_header_value(&plan.url));
    headers.merge_override(&plan.headers);

    if let Some(body) = &plan.body {
        headers.set("Content-Length", body.len().to_string());
    }

    let cookie_header = jar.lock().unwrap().serialize_header(&plan.url);
    if !cookie_header.is_empty() {
        headers.set("Cookie", cookie_header);
    }

    if let Some(auth) = &plan.auth {
        let target = plan.target();
        auth.apply(&AuthContext { method: &plan.method, uri: &target }, &mut headers);
    }

    headers
}

fn host_header_value(url: &url::Url) -> String {
    match url.port() {
        Some(p) => format!("{}:{p}", url.host_str().unwrap_or_default()),
        None => url.host_str().unwrap_or_default().to_string(),
    }
}

async fn send_and_receive(
    pool: &Pool,
    origin: &OriginKey,
    plan: &RequestPlan,
    headers: &HeaderMap,
    limits: &HopLimits,
) -> Result<(Response, Connection, bool), Error> {
    let target = plan.target();

    // One transparent retry if the pooled connection turns out to be dead
    // (spec §4.5: "if the write fails ... the pipeline may transparently
    // retry once on a freshly dialed connection").
    let mut last_err = None;
    for attempt in 0..2 {
        let mut conn = pool.acquire(origin, plan.verify_tls).await?;
        match try_hop(&mut conn, &plan.method, &target, headers, plan.body.as_deref(), limits)
            .await
        {
            Ok((mut response, clean)) => {
                response.final_url = plan.url.clone();
                return Ok((response, conn, clean));
            }
            Err(err) if attempt == 0 && is_retryable_write_failure(&err) => {
                conn.mark_bad();
                pool.release(conn, false);
                last_err = Some(err);
                continue;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or(Error::ConnectionClosed))
}

fn is_retryable_write_failure(err: &Error) -> bool {
    matches!(err, Error::ConnectionClosed | Error::Io(_))
}

async fn try_hop(
    conn: &mut Connection,
    method: &str,
    target: &str,
    headers: &HeaderMap,
    body: Option<&[u8]>,
    limits: &HopLimits,
) -> Result<(Response, bool), Error> {
    let (mut response, decoder, clean) =
        try_hop_head(conn, method, target, headers, body, limits).await?;
    response.body = wire::read_body_buffered(&mut conn.reader, decoder, limits.max_body_bytes).await?;
    Ok((response, clean))
}

async fn try_hop_head(
    conn: &mut Connection,
    method: &str,
    target: &str,
    headers: &HeaderMap,
    body: Option<&[u8]>,
    limits: &HopLimits,
) -> Result<(Response, wire::BodyDecoder, bool), Error> {
    let reader: &mut BufReader<Transport> = &mut conn.reader;
    wire::write_request(reader, method, target, headers, body).await?;

    let head = wire::read_response_head(reader, limits.max_header_bytes).await?;
    let decoder = wire::BodyDecoder::new(&head.headers, head.status, method)?;
    let requires_close = decoder.requires_close();

    let connection_says_close = head
        .headers
        .get("Connection")
        .map(|v| v.eq_ignore_ascii_case("close"))
        .unwrap_or(head.is_http_1_0);

    let clean = !requires_close && !connection_says_close;

    let response = Response {
        status: head.status,
        reason: head.reason,
        headers: head.headers,
        body: Vec::new(),
        final_url: url::Url::parse("http://placeholder/").unwrap(), // set by caller
        elapsed: Duration::default(),
        history: Vec::new(),
    };
    Ok((response, decoder, clean))
}

fn absorb_set_cookies(jar: &Mutex<Jar>, headers: &HeaderMap, request_url: &url::Url) {
    let mut jar = jar.lock().unwrap();
    for header in headers.iter().filter(|h| h.is_name("Set-Cookie")) {
        jar.set_from_header(header.value(), request_url);
    }
}
