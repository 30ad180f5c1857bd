//! Lazy, connection-owning response bodies for the `*_streamed` request
//! variants (spec §4.6 step 5, §9 "Streaming body and connection lifetime").
//!
//! The teacher never streams — everything in `ureq` is synchronous and reads
//! bodies through a blocking `Read`. This module is new, grounded on the
//! spec's own design note: move the owned connection + decoder into a boxed
//! future on each poll and hand it back, so the stream needs no
//! self-referential borrow and no `unsafe`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_core::Stream;

use crate::agent::Agent;
use crate::error::Error;
use crate::header::HeaderMap;
use crate::plan::Response;
use crate::pool::Connection;
use crate::wire::BodyDecoder;

/// A response whose body is read lazily, chunk by chunk, instead of being
/// fully buffered up front (spec §6 `*_streamed` variants). Same shape as
/// [`Response`](crate::plan::Response), minus a buffered `body`.
pub struct StreamedResponse {
    /// Numeric status code.
    pub status: u16,
    /// Reason phrase as sent by the server.
    pub reason: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// URL of the hop that produced this response.
    pub final_url: url::Url,
    /// Wall-clock time spent through the final hop.
    pub elapsed: Duration,
    /// Prior hop responses, in order, for a redirect chain. Always fully
    /// buffered, since each intermediate hop is drained before the engine
    /// moves on to the next one.
    pub history: Vec<Response>,
    /// The lazy body sequence.
    pub body: BodyStream,
}

type PendingRead =
    Pin<Box<dyn Future<Output = (StreamState, Result<Option<Vec<u8>>, Error>)> + Send>>;

struct StreamState {
    conn: Connection,
    decoder: BodyDecoder,
    agent: Agent,
    deadline: Instant,
}

impl StreamState {
    /// Consume the state, returning the connection to its agent's pool (or
    /// closing it, if `clean` is false — spec: "abandoning the sequence
    /// closes the underlying connection").
    fn finish(self, clean: bool) {
        self.agent.release_connection(self.conn, clean);
    }
}

/// A finite, not-restartable sequence of body chunks.
///
/// Most streams are coupled to the connection they were read from (spec
/// §4.6 step 5): dropping one before it yields `None` drops the connection
/// along with it rather than returning it to the pool, since there is no
/// way to know the body was fully consumed without reading it. A response
/// whose body was already fully read before streaming was requested (a
/// redirect or a retried `401`) is represented as an already-buffered
/// single chunk with no connection attached.
pub enum BodyStream {
    /// A body still being read off its connection.
    Live {
        state: Option<StreamState>,
        pending: Option<PendingRead>,
        clean_if_finished: bool,
    },
    /// A body that was already fully read into memory.
    Buffered(Option<Vec<u8>>),
}

impl BodyStream {
    pub(crate) fn new(
        conn: Connection,
        decoder: BodyDecoder,
        agent: Agent,
        deadline: Instant,
        clean_if_finished: bool,
    ) -> Self {
        BodyStream::Live {
            state: Some(StreamState { conn, decoder, agent, deadline }),
            pending: None,
            clean_if_finished,
        }
    }

    pub(crate) fn already_buffered(bytes: Vec<u8>) -> Self {
        BodyStream::Buffered(if bytes.is_empty() { None } else { Some(bytes) })
    }
}

async fn read_next(mut state: StreamState) -> (StreamState, Result<Option<Vec<u8>>, Error>) {
    let remaining = state.deadline.saturating_duration_since(Instant::now());
    let result = match tokio::time::timeout(remaining, state.decoder.next_chunk(&mut state.conn.reader)).await
    {
        Ok(inner) => inner,
        Err(_) => Err(Error::Timeout),
    };
    (state, result)
}

impl Stream for BodyStream {
    type Item = Result<Vec<u8>, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        let (state_slot, pending_slot, clean_if_finished) = match this {
            BodyStream::Buffered(slot) => return Poll::Ready(slot.take().map(Ok)),
            BodyStream::Live { state, pending, clean_if_finished } => {
                (state, pending, *clean_if_finished)
            }
        };

        if pending_slot.is_none() {
            match state_slot.take() {
                Some(state) => *pending_slot = Some(Box::pin(read_next(state))),
                // Already finished (or dropped early); fuse.
                None => return Poll::Ready(None),
            }
        }

        let fut = pending_slot.as_mut().unwrap();
        match fut.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready((state, result)) => {
                *pending_slot = None;
                match result {
                    Ok(Some(chunk)) => {
                        *state_slot = Some(state);
                        Poll::Ready(Some(Ok(chunk)))
                    }
                    Ok(None) => {
                        state.finish(clean_if_finished);
                        Poll::Ready(None)
                    }
                    Err(e) => {
                        state.finish(false);
                        Poll::Ready(Some(Err(e)))
                    }
                }
            }
        }
    }
}
