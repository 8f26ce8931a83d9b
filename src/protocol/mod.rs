pub mod frame;
pub mod stream;

pub use frame::FrameDecoder;
pub use stream::event_stream;

use serde_json::Value;

/// A decoded protocol event from the upstream wire stream.
///
/// The wire carries a `type` discriminator on each frame (with the SSE
/// `event:` field as fallback); unknown kinds are dropped during decoding,
/// so this union is closed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StreamEvent {
    /// A fragment of assistant text, forwarded to the consumer as-is.
    TextDelta(String),
    /// Opens a tool-call slot at `index`; later deltas append to it.
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
        arguments: String,
    },
    /// Appends an argument-string suffix to the tool call at `index`.
    ToolCallDelta { index: usize, arguments: String },
    /// End of the assistant message, carrying the full message payload.
    /// Terminal for the decoder.
    MessageEnd { message: Value },
    /// End of the stream with no further messages. Terminal for the decoder.
    #[default]
    StreamEnd,
}

impl StreamEvent {
    /// Whether this event closes the stream (no further frames follow).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::MessageEnd { .. } | StreamEvent::StreamEnd
        )
    }
}
