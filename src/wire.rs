//! The wire codec: request serialization and incremental response parsing
//! (spec §4.4).
//!
//! The teacher's old `conn.rs` builds the request preamble by hand with
//! `write!` into a `Vec<u8>` and reads a response with a dedicated
//! `Response::from_read`; the modern teacher delegates this to the external
//! `ureq-proto` crate's typestate `Flow`. Since this core must implement the
//! framing rules itself (spec §4.4), this module keeps the teacher's
//! hand-written-`write!` style for serialization and adds an explicit,
//! state-held chunked/content-length body decoder for parsing.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::connect::Transport;
use crate::error::Error;
use crate::header::HeaderMap;

/// Default cap on the combined size of the status line and header block
/// (spec §4.4: "default 1 MiB").
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1024 * 1024;

/// Size of the read buffer used when draining body chunks.
const READ_CHUNK: usize = 16 * 1024;

/// Serialize and write a request line, headers, and body onto `writer`.
///
/// `headers` must already have `Host` and any `Content-Length` /
/// `Content-Type` insertion resolved by the caller (spec §4.6 step 1); this
/// function only performs the wire-format framing.
pub async fn write_request(
    writer: &mut BufReader<Transport>,
    method: &str,
    target: &str,
    headers: &HeaderMap,
    body: Option<&[u8]>,
) -> Result<(), Error> {
    let mut out = Vec::with_capacity(256 + body.map(|b| b.len()).unwrap_or(0));
    out.extend_from_slice(format!("{method} {target} HTTP/1.1\r\n").as_bytes());
    for h in headers.iter() {
        out.extend_from_slice(format!("{}: {}\r\n", h.name(), h.value()).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        out.extend_from_slice(body);
    }
    writer.get_mut().write_all(&out).await?;
    writer.get_mut().flush().await?;
    Ok(())
}

/// The parsed status line and header block of a response.
#[derive(Debug)]
pub struct ResponseHead {
    /// Numeric status code.
    pub status: u16,
    /// Reason phrase as sent by the server.
    pub reason: String,
    /// Parsed response headers.
    pub headers: HeaderMap,
    /// Whether the status line declared `HTTP/1.0`.
    pub is_http_1_0: bool,
}

/// Read a status line and header block from `reader`, enforcing
/// `max_header_bytes` (spec §4.4).
pub async fn read_response_head(
    reader: &mut BufReader<Transport>,
    max_header_bytes: usize,
) -> Result<ResponseHead, Error> {
    let mut budget_used = 0usize;

    let status_line = read_crlf_line(reader, max_header_bytes, &mut budget_used).await?;
    let (is_http_1_0, status, reason) = parse_status_line(&status_line)?;

    let mut headers = HeaderMap::new();
    loop {
        let line = read_crlf_line(reader, max_header_bytes, &mut budget_used).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidResponse(format!("malformed header line: {line}")))?;
        headers.append(name.trim().to_string(), value.trim().to_string());
    }

    Ok(ResponseHead {
        status,
        reason,
        headers,
        is_http_1_0,
    })
}

async fn read_crlf_line(
    reader: &mut BufReader<Transport>,
    max_header_bytes: usize,
    budget_used: &mut usize,
) -> Result<String, Error> {
    let mut raw = Vec::new();
    let n = reader.read_until(b'\n', &mut raw).await?;
    if n == 0 {
        return Err(Error::ConnectionClosed);
    }
    *budget_used += n;
    if *budget_used > max_header_bytes {
        return Err(Error::BodyTooLarge);
    }
    while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw).map_err(|_| Error::InvalidResponse("non-utf8 header line".into()))
}

fn parse_status_line(line: &str) -> Result<(bool, u16, String), Error> {
    let mut parts = line.splitn(3, ' ');
    let version = parts
        .next()
        .ok_or_else(|| Error::InvalidResponse("empty status line".into()))?;
    let is_http_1_0 = match version {
        "HTTP/1.1" => false,
        "HTTP/1.0" => true,
        other => return Err(Error::InvalidResponse(format!("unsupported version: {other}"))),
    };
    let status: u16 = parts
        .next()
        .ok_or_else(|| Error::InvalidResponse("missing status code".into()))?
        .parse()
        .map_err(|_| Error::InvalidResponse("status code not 3 digits".into()))?;
    if !(100..=599).contains(&status) {
        return Err(Error::InvalidResponse("status code out of range".into()));
    }
    let reason = parts.next().unwrap_or("").to_string();
    Ok((is_http_1_0, status, reason))
}

/// Whether the framing rules declare no body at all (spec: "HEAD ... we
/// mandate discard").
fn has_no_body(status: u16, method: &str) -> bool {
    method.eq_ignore_ascii_case("HEAD") || matches!(status, 204 | 304) || (100..200).contains(&status)
}

/// How the response body is framed on the wire.
enum Framing {
    NoBody,
    ContentLength(u64),
    Chunked,
    /// Neither `Content-Length` nor chunked was given: read until EOF.
    UntilClose,
}

fn determine_framing(headers: &HeaderMap, status: u16, method: &str) -> Result<Framing, Error> {
    if has_no_body(status, method) {
        return Ok(Framing::NoBody);
    }
    let is_chunked = headers
        .get("Transfer-Encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    let content_length = headers.get("Content-Length");

    if is_chunked && content_length.is_some() {
        return Err(Error::InvalidResponse(
            "response specifies both Content-Length and chunked Transfer-Encoding".into(),
        ));
    }
    if is_chunked {
        return Ok(Framing::Chunked);
    }
    if let Some(cl) = content_length {
        let n: u64 = cl
            .trim()
            .parse()
            .map_err(|_| Error::InvalidResponse("invalid Content-Length".into()))?;
        return Ok(Framing::ContentLength(n));
    }
    Ok(Framing::UntilClose)
}

/// Incremental body reader: hands back one buffer at a time, so the
/// streaming response (spec §4.6 step 5) and the buffered response share the
/// same decode logic.
pub struct BodyDecoder {
    framing: Framing,
    remaining: u64,
    chunk_remaining: u64,
    finished: bool,
}

impl BodyDecoder {
    /// Build a decoder from the parsed response head, per spec §4.4 framing
    /// rules (and §9's "HEAD ... we mandate discard").
    pub fn new(headers: &HeaderMap, status: u16, method: &str) -> Result<Self, Error> {
        let framing = determine_framing(headers, status, method)?;
        let remaining = match &framing {
            Framing::ContentLength(n) => *n,
            _ => 0,
        };
        let finished = matches!(framing, Framing::NoBody);
        Ok(BodyDecoder {
            framing,
            remaining,
            chunk_remaining: 0,
            finished,
        })
    }

    /// Whether the connection must be closed after this body (no reliable
    /// end-of-message marker, e.g. `UntilClose` framing).
    pub fn requires_close(&self) -> bool {
        matches!(self.framing, Framing::UntilClose)
    }

    /// Read and return the next chunk of body bytes, or `None` once the body
    /// is fully consumed.
    pub async fn next_chunk(
        &mut self,
        reader: &mut BufReader<Transport>,
    ) -> Result<Option<Vec<u8>>, Error> {
        if self.finished {
            return Ok(None);
        }
        match self.framing {
            Framing::NoBody => {
                self.finished = true;
                Ok(None)
            }
            Framing::ContentLength(_) => {
                if self.remaining == 0 {
                    self.finished = true;
                    return Ok(None);
                }
                let want = self.remaining.min(READ_CHUNK as u64) as usize;
                let mut buf = vec![0u8; want];
                reader.read_exact(&mut buf).await?;
                self.remaining -= want as u64;
                if self.remaining == 0 {
                    self.finished = true;
                }
                Ok(Some(buf))
            }
            Framing::UntilClose => {
                let mut buf = vec![0u8; READ_CHUNK];
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    self.finished = true;
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(buf))
            }
            Framing::Chunked => self.next_chunked(reader).await,
        }
    }

    async fn next_chunked(
        &mut self,
        reader: &mut BufReader<Transport>,
    ) -> Result<Option<Vec<u8>>, Error> {
        if self.chunk_remaining == 0 {
            let mut budget = 0usize;
            let size_line = read_crlf_line(reader, DEFAULT_MAX_HEADER_BYTES, &mut budget).await?;
            let size_str = size_line.split(';').next().unwrap_or("").trim();
            let size = u64::from_str_radix(size_str, 16)
                .map_err(|_| Error::InvalidResponse(format!("bad chunk size: {size_line}")))?;
            if size == 0 {
                // Trailer headers, terminated by a blank line.
                loop {
                    let line = read_crlf_line(reader, DEFAULT_MAX_HEADER_BYTES, &mut budget).await?;
                    if line.is_empty() {
                        break;
                    }
                }
                self.finished = true;
                return Ok(None);
            }
            self.chunk_remaining = size;
        }

        let want = self.chunk_remaining.min(READ_CHUNK as u64) as usize;
        let mut buf = vec![0u8; want];
        reader.read_exact(&mut buf).await?;
        self.chunk_remaining -= want as u64;

        if self.chunk_remaining == 0 {
            // Each chunk's data is followed by a trailing CRLF.
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf).await?;
        }

        Ok(Some(buf))
    }
}

/// Read the full body into memory, enforcing `limit` bytes if given (spec:
/// "exceeding raises `body_too_large`").
pub async fn read_body_buffered(
    reader: &mut BufReader<Transport>,
    mut decoder: BodyDecoder,
    limit: Option<usize>,
) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    while let Some(chunk) = decoder.next_chunk(reader).await? {
        out.extend_from_slice(&chunk);
        if let Some(limit) = limit {
            if out.len() > limit {
                return Err(Error::BodyTooLarge);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_parses_ok() {
        let (v1_0, status, reason) = parse_status_line("HTTP/1.1 200 OK").unwrap();
        assert!(!v1_0);
        assert_eq!(status, 200);
        assert_eq!(reason, "OK");
    }

    #[test]
    fn status_line_rejects_bad_version() {
        assert!(parse_status_line("HTTP/2 200 OK").is_err());
    }

    #[test]
    fn status_line_rejects_non_numeric_status() {
        assert!(parse_status_line("HTTP/1.1 abc OK").is_err());
    }

    #[test]
    fn both_content_length_and_chunked_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.set("Content-Length", "5");
        headers.set("Transfer-Encoding", "chunked");
        assert!(determine_framing(&headers, 200, "GET").is_err());
    }

    #[test]
    fn head_request_has_no_body_regardless_of_headers() {
        let mut headers = HeaderMap::new();
        headers.set("Content-Length", "500");
        let framing = determine_framing(&headers, 200, "HEAD").unwrap();
        assert!(matches!(framing, Framing::NoBody));
    }
}
