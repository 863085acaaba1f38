use async_stream::stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::constants::{
    MAX_LINE_BYTES, MAX_STREAM_EVENTS, STREAM_DATA_PREFIX, STREAM_DONE_MARKER,
};
use crate::types::{parse_stream_line, DeltaEvent, LineEvent, Result, TributaryError};

/// Decodes an SSE response body into delta events.
///
/// This is the one place raw provider structure is validated: `data: ` lines
/// that fail to classify are skipped, provider error objects terminate the
/// stream with `Upstream`, and `[DONE]` ends it cleanly. The caller owns the
/// HTTP request; this adapter only consumes its body.
pub fn delta_events<R>(body: R) -> impl Stream<Item = Result<DeltaEvent>> + Send
where
    R: Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static,
{
    stream! {
        let reader = tokio_util::io::StreamReader::new(body);
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

        let mut line_count = 0;
        while let Some(line_result) = lines.next().await {
            let line = match line_result {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("[☁️  -> ⚙️ ] Line parse error: {}", e);
                    let io_err = match e {
                        LinesCodecError::Io(io) => io,
                        LinesCodecError::MaxLineLengthExceeded => {
                            std::io::Error::other("Max line length exceeded")
                        }
                    };
                    yield Err(TributaryError::Io(io_err).into());
                    return;
                }
            };

            line_count += 1;
            if line_count > MAX_STREAM_EVENTS {
                tracing::error!(
                    "[☁️  -> ⚙️ ] Stream exceeded max line limit ({})",
                    MAX_STREAM_EVENTS
                );
                yield Err(TributaryError::Internal(
                    "Stream exceeded max line limit".to_string(),
                    tracing_error::SpanTrace::capture(),
                )
                .into());
                return;
            }

            // SSE comments, blank keep-alives, and event-name lines have no
            // data prefix and carry nothing for us.
            let data = match line.strip_prefix(STREAM_DATA_PREFIX) {
                Some(data) => data,
                None => continue,
            };

            if data == STREAM_DONE_MARKER {
                tracing::debug!("[☁️  -> ⚙️ ] Stream end marker [DONE] received");
                return;
            }

            match parse_stream_line(data) {
                LineEvent::Event(event) => yield Ok(event),
                LineEvent::Error(err) => {
                    let err_str = match serde_json::to_string(&err) {
                        Ok(s) => s,
                        Err(_) => err.error.message.clone(),
                    };
                    tracing::error!("[☁️  -> ⚙️ ] Stream error: {}", err_str);
                    yield Err(TributaryError::Upstream(err.error.message).into());
                    return;
                }
                LineEvent::Unknown(_) => {
                    // Malformed structure is a skip, not a fault.
                }
            }
        }
    }
}
