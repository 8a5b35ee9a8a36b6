//! SSE (Server-Sent Events) framing for synthesized error events
//!
//! Upstream chunks are relayed byte-for-byte and never reframed here. The only
//! frames the proxy writes itself are terminal error frames.

use bytes::Bytes;

use crate::error::ErrorEnvelope;

/// How an upstream frames its error events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseFraming {
    /// `event: error\ndata: {...}\n\n`
    NamedEvent,
    /// `data: {...}\n\n`
    DataOnly,
}

/// Format an error envelope as one complete SSE frame
///
/// The generic envelope is always used so the `data:` line is a single line of JSON.
pub fn format_error_event(envelope: &ErrorEnvelope, framing: SseFraming) -> Bytes {
    // serde_json never emits raw newlines in compact output
    let json = envelope.generic_json().to_string();
    let frame = match framing {
        SseFraming::NamedEvent => format!("event: error\ndata: {}\n\n", json),
        SseFraming::DataOnly => format!("data: {}\n\n", json),
    };
    Bytes::from(frame)
}
