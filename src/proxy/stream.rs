//! Streaming relay
//!
//! A [`RelayStream`] is a forward-only, single-consumer sequence of upstream byte
//! blocks. It ends either with the upstream's end of body or with exactly one
//! synthesized error event; errors never escape as `Err` items.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::client::ConnectionManager;
use super::handler::UpstreamCall;
use super::logging::RequestContext;
use crate::error::{ErrorEnvelope, ErrorKind};
use crate::routes::metrics;
use crate::streaming::{format_error_event, SseFraming};

/// Upper bound on the size of one relayed block
pub const RELAY_BLOCK_SIZE: usize = 8192;

/// One item of a relayed stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Upstream bytes, unmodified
    Chunk(Bytes),
    /// Terminal failure, rendered as an SSE error frame
    Error(ErrorEnvelope),
}

impl StreamEvent {
    pub fn into_bytes(self, framing: SseFraming) -> Bytes {
        match self {
            StreamEvent::Chunk(bytes) => bytes,
            StreamEvent::Error(envelope) => format_error_event(&envelope, framing),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamEvent::Error(_))
    }
}

pub struct RelayStream {
    events: Pin<Box<dyn Stream<Item = StreamEvent> + Send>>,
    framing: SseFraming,
}

impl RelayStream {
    pub fn new(events: impl Stream<Item = StreamEvent> + Send + 'static, framing: SseFraming) -> Self {
        Self {
            events: Box::pin(events),
            framing,
        }
    }

    pub fn framing(&self) -> SseFraming {
        self.framing
    }

    /// Render every event as bytes, for use as an HTTP body
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        let framing = self.framing;
        self.map(move |event| Ok(event.into_bytes(framing)))
    }
}

impl Stream for RelayStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for RelayStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayStream")
            .field("framing", &self.framing)
            .finish_non_exhaustive()
    }
}

/// Open the upstream call lazily and relay its body
///
/// Nothing is sent until the stream is first polled. The connection permit is held
/// until the stream finishes or is dropped.
pub(crate) fn relay(
    connections: Arc<ConnectionManager>,
    call: UpstreamCall,
    ctx: RequestContext,
    upstream: &'static str,
    framing: SseFraming,
) -> RelayStream {
    let events = stream! {
        let (response, _permit) = match call.send(&connections, &ctx).await {
            Ok(opened) => opened,
            Err(err) => {
                let envelope = err.into_stream_envelope(upstream);
                ctx.log_error(envelope.kind, &envelope.message);
                metrics::record_request(ctx.upstream, envelope.kind.as_str(), true, ctx.start_time.elapsed());
                yield StreamEvent::Error(envelope);
                return;
            }
        };

        ctx.log_stream_started();

        let mut body = response.bytes_stream();
        let mut chunks = 0usize;
        let mut relayed = 0usize;

        while let Some(next) = body.next().await {
            match next {
                Ok(chunk) => {
                    for block in split_blocks(chunk) {
                        chunks += 1;
                        relayed += block.len();
                        yield StreamEvent::Chunk(block);
                    }
                }
                Err(err) => {
                    ctx.log_stream_interrupted(relayed, &err.to_string());
                    metrics::record_stream_interrupted(ctx.upstream);
                    metrics::record_stream_bytes(ctx.upstream, relayed);
                    metrics::record_request(
                        ctx.upstream,
                        ErrorKind::StreamInterrupted.as_str(),
                        true,
                        ctx.start_time.elapsed(),
                    );
                    yield StreamEvent::Error(ErrorEnvelope::new(
                        ErrorKind::StreamInterrupted,
                        format!("Streaming interrupted due to: {}", err),
                    ));
                    return;
                }
            }
        }

        ctx.log_stream_ended(chunks, relayed);
        metrics::record_stream_bytes(ctx.upstream, relayed);
        metrics::record_request(ctx.upstream, "success", true, ctx.start_time.elapsed());
    };

    RelayStream::new(events, framing)
}

/// Split a received chunk into blocks of at most [`RELAY_BLOCK_SIZE`]; empty
/// chunks yield nothing
fn split_blocks(mut chunk: Bytes) -> Vec<Bytes> {
    let mut blocks = Vec::with_capacity(chunk.len() / RELAY_BLOCK_SIZE + 1);
    while chunk.len() > RELAY_BLOCK_SIZE {
        blocks.push(chunk.split_to(RELAY_BLOCK_SIZE));
    }
    if !chunk.is_empty() {
        blocks.push(chunk);
    }
    blocks
}
