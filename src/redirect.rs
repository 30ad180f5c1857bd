//! The redirect engine (spec §4.7).
//!
//! Grounded on the teacher's `flow.rs` (a `Flow` state machine that walks
//! `RedirectAuthHeaders`/method-rewrite rules hop by hop) and `run.rs`'s outer
//! retry loop around a single hop. This module keeps the teacher's hop-loop
//! shape but drives [`crate::run::send_one_hop`] directly rather than a
//! shared `Flow` type, since each hop here is a fully independent async call.

use std::sync::Mutex;
use std::time::Instant;

use crate::agent::Agent;
use crate::body::{BodyStream, StreamedResponse};
use crate::cookies::Jar;
use crate::error::Error;
use crate::plan::{resolve_redirect_target, RequestPlan, Response};
use crate::pool::Pool;
use crate::run::{self, HopLimits};
use crate::wire;

/// Follow redirects starting from `plan`, up to `plan.max_redirects` hops,
/// returning the final response with `history` populated (spec §3, §4.7).
///
/// `plan.max_redirects` is the number of redirect hops tolerated: a chain of
/// exactly N redirects ending in a non-redirect response succeeds with
/// `history.len() == N`; an (N+1)th redirect is rejected with
/// [`Error::TooManyRedirects`].
pub async fn execute(
    pool: &Pool,
    jar: &Mutex<Jar>,
    mut plan: RequestPlan,
    limits: &HopLimits,
) -> Result<Response, Error> {
    let mut history = Vec::new();
    let deadline = Instant::now() + plan.timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut response = run::send_one_hop(pool, jar, &plan, limits, remaining).await?;

        if !plan.allow_redirects || !response.is_redirect() {
            response.history = history;
            return Ok(response);
        }

        if history.len() as u32 >= plan.max_redirects {
            return Err(Error::TooManyRedirects);
        }

        let Some(location) = response.headers.get("Location").map(str::to_string) else {
            // A redirect status with no Location header is not actionable;
            // return it as-is rather than erroring.
            response.history = history;
            return Ok(response);
        };

        let next_url = resolve_redirect_target(&plan.url, &location)?;
        let origin_changed = next_url.origin() != plan.url.origin();

        rewrite_for_redirect(&mut plan, response.status);
        if origin_changed {
            scrub_cross_origin_headers(&mut plan);
        }
        plan.url = next_url;

        history.push(response);
    }
}

/// Like [`execute`], but the final (non-redirect, non-retried) response's
/// body is a lazy [`BodyStream`] instead of a fully buffered `Vec<u8>` (spec
/// §6 `*_streamed` variants). Intermediate hops (redirects, a retried `401`)
/// still have their bodies read to completion, since they must be drained
/// before the connection can be reused or handed back to the pool.
pub async fn execute_streamed(
    pool: &Pool,
    jar: &Mutex<Jar>,
    mut plan: RequestPlan,
    limits: &HopLimits,
    agent: Agent,
) -> Result<StreamedResponse, Error> {
    let deadline = Instant::now() + plan.timeout;
    let mut redirects_followed = 0u32;
    let mut allow_auth_retry = true;
    let mut history = Vec::new();
    let mut hop_start = Instant::now();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let raw = tokio::time::timeout(remaining, run::send_one_hop_head(pool, jar, &plan, limits))
            .await
            .map_err(|_| Error::Timeout)??;
        let run::RawHop { mut response, mut conn, decoder, clean } = raw;

        if allow_auth_retry && response.status == 401 && plan.auth.is_some() {
            response.body =
                crate::wire::read_body_buffered(&mut conn.reader, decoder, limits.max_body_bytes).await?;
            pool.release(conn, clean);
            let auth = plan.auth.as_ref().unwrap();
            if auth.handle_challenge(&response) {
                allow_auth_retry = false;
                continue;
            }
            response.elapsed = hop_start.elapsed();
            return Ok(as_streamed(response, history));
        }

        if plan.allow_redirects && response.is_redirect() {
            if redirects_followed >= plan.max_redirects {
                pool.release(conn, false);
                return Err(Error::TooManyRedirects);
            }
            crate::wire::read_body_buffered(&mut conn.reader, decoder, limits.max_body_bytes).await?;
            pool.release(conn, clean);

            let Some(location) = response.headers.get("Location").map(str::to_string) else {
                response.elapsed = hop_start.elapsed();
                return Ok(as_streamed(response, history));
            };
            let next_url = resolve_redirect_target(&plan.url, &location)?;
            let origin_changed = next_url.origin() != plan.url.origin();
            rewrite_for_redirect(&mut plan, response.status);
            if origin_changed {
                scrub_cross_origin_headers(&mut plan);
            }
            plan.url = next_url;
            redirects_followed += 1;
            response.elapsed = hop_start.elapsed();
            history.push(response);
            hop_start = Instant::now();
            continue;
        }

        return Ok(StreamedResponse {
            status: response.status,
            reason: response.reason,
            headers: response.headers,
            final_url: response.final_url,
            elapsed: hop_start.elapsed(),
            history,
            body: BodyStream::new(conn, decoder, agent, deadline, clean),
        });
    }
}

fn as_streamed(response: Response, history: Vec<Response>) -> StreamedResponse {
    StreamedResponse {
        status: response.status,
        reason: response.reason,
        headers: response.headers,
        final_url: response.final_url,
        elapsed: response.elapsed,
        history,
        body: BodyStream::already_buffered(response.body),
    }
}

/// Apply the method/body rewrite rules for a given redirect status (spec
/// §4.7 "Method rewrite").
fn rewrite_for_redirect(plan: &mut RequestPlan, status: u16) {
    match status {
        // 301/302 historically rewrite any non-GET/HEAD method to GET and
        // drop the body, matching every mainstream client's behavior rather
        // than the letter of RFC 7231.
        301 | 302 if !matches!(plan.method.as_str(), "GET" | "HEAD") => {
            plan.method = "GET".to_string();
            plan.body = None;
            plan.headers.remove("Content-Length");
            plan.headers.remove("Content-Type");
        }
        // 303 always rewrites to GET regardless of the original method.
        303 => {
            plan.method = "GET".to_string();
            plan.body = None;
            plan.headers.remove("Content-Length");
            plan.headers.remove("Content-Type");
        }
        // 307/308 preserve method and body exactly.
        _ => {}
    }
}

/// Strip credentials that must not cross an origin change (spec §4.7
/// "Header scrubbing"): `Authorization` (unless the caller explicitly opted
/// in) and any `Cookie` header, since the cookie jar recomputes it fresh for
/// the new origin on the next hop.
fn scrub_cross_origin_headers(plan: &mut RequestPlan) {
    if !plan.allow_cross_origin_auth {
        plan.headers.remove("Authorization");
        plan.auth = None;
    }
    plan.headers.remove("Cookie");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderMap;
    use url::Url;

    fn base_plan() -> RequestPlan {
        RequestPlan {
            method: "POST".to_string(),
            url: Url::parse("http://a.example/x").unwrap(),
            headers: HeaderMap::new(),
            body: Some(b"payload".to_vec()),
            timeout: std::time::Duration::from_secs(1),
            max_redirects: 5,
            allow_redirects: true,
            verify_tls: true,
            allow_cross_origin_auth: false,
            auth: None,
            history: Vec::new(),
        }
    }

    #[test]
    fn rewrite_303_drops_body_and_forces_get() {
        let mut plan = base_plan();
        rewrite_for_redirect(&mut plan, 303);
        assert_eq!(plan.method, "GET");
        assert!(plan.body.is_none());
    }

    #[test]
    fn rewrite_307_preserves_method_and_body() {
        let mut plan = base_plan();
        rewrite_for_redirect(&mut plan, 307);
        assert_eq!(plan.method, "POST");
        assert_eq!(plan.body, Some(b"payload".to_vec()));
    }

    #[test]
    fn rewrite_301_on_post_forces_get() {
        let mut plan = base_plan();
        rewrite_for_redirect(&mut plan, 301);
        assert_eq!(plan.method, "GET");
        assert!(plan.body.is_none());
    }

    #[test]
    fn cross_origin_scrub_removes_auth_and_cookie_by_default() {
        let mut plan = base_plan();
        plan.headers.set("Authorization", "Bearer secret");
        plan.headers.set("Cookie", "a=1");
        plan.auth = Some(crate::auth::Auth::bearer("secret"));
        scrub_cross_origin_headers(&mut plan);
        assert!(!plan.headers.contains("Authorization"));
        assert!(!plan.headers.contains("Cookie"));
        assert!(plan.auth.is_none());
    }

    #[test]
    fn cross_origin_scrub_keeps_auth_when_opted_in() {
        let mut plan = base_plan();
        plan.allow_cross_origin_auth = true;
        plan.headers.set("Authorization", "Bearer secret");
        scrub_cross_origin_headers(&mut plan);
        assert!(plan.headers.contains("Authorization"));
    }
}
