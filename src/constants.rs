/// Backstop for runaway provider streams; exceeding it fails the stream.
pub const MAX_STREAM_EVENTS: usize = 100_000;

/// SSE framing markers used by chat-completion endpoints.
pub const STREAM_DATA_PREFIX: &str = "data: ";
pub const STREAM_DONE_MARKER: &str = "[DONE]";

/// Per-line and per-payload caps for the wire decoder.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;
pub const MAX_EVENT_BYTES: usize = 10 * 1024 * 1024;

/// Acknowledgement sent out-of-band when a tool call finalizes.
pub const OUT_OF_BAND_ACK: &str = "Sure, let me work on that for you!";

/// The one argument field the side effect consumes.
pub const PROMPT_ARGUMENT_FIELD: &str = "appearance";
