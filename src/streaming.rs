use std::sync::Arc;

use async_stream::stream;
use futures_util::{pin_mut, Stream, StreamExt};

use crate::constants::{MAX_STREAM_EVENTS, OUT_OF_BAND_ACK, PROMPT_ARGUMENT_FIELD};
use crate::context::ContextSink;
use crate::dispatch::SideEffectDispatcher;
use crate::logging::StreamMetric;
use crate::types::{
    DeltaEvent, OutputFrame, Result, Role, ToolCallAccumulator, ToolCallRecord, TributaryError,
    TurnRecord,
};

/// Folds a chat-completion delta stream into output frames for the pipeline.
///
/// Text content streams through with no buffering. Tool-call fragments
/// accumulate until the finish event, which finalizes at most once: three
/// turn records to the context sink, a detached side-effect task, and a
/// single out-of-band frame.
pub struct StreamAggregator {
    context: Arc<dyn ContextSink>,
    dispatcher: Arc<dyn SideEffectDispatcher>,
}

impl StreamAggregator {
    pub fn new(context: Arc<dyn ContextSink>, dispatcher: Arc<dyn SideEffectDispatcher>) -> Self {
        Self {
            context,
            dispatcher,
        }
    }

    /// Consumes `events` and produces a lazy, single-use frame stream in
    /// event order. Dropping the returned stream abandons the source and the
    /// in-progress accumulator; an already-spawned side effect keeps running.
    pub fn aggregate<S>(&self, events: S) -> impl Stream<Item = Result<OutputFrame>> + Send
    where
        S: Stream<Item = Result<DeltaEvent>> + Send + 'static,
    {
        let context = Arc::clone(&self.context);
        let dispatcher = Arc::clone(&self.dispatcher);

        stream! {
            pin_mut!(events);

            let mut accumulator = ToolCallAccumulator::new();
            let mut metric = StreamMetric::new();
            let mut event_count = 0;
            let mut done = false;

            while let Some(event_result) = events.next().await {
                let event = match event_result {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!("[☁️  -> ⚙️ ] Source error: {}", e.inner);
                        yield Err(e);
                        return;
                    }
                };

                event_count += 1;
                if event_count > MAX_STREAM_EVENTS {
                    tracing::error!(
                        "[☁️  -> ⚙️ ] Stream exceeded max event limit ({})",
                        MAX_STREAM_EVENTS
                    );
                    yield Err(TributaryError::Internal(
                        "Stream exceeded max event limit".to_string(),
                        tracing_error::SpanTrace::capture(),
                    )
                    .into());
                    return;
                }

                if done {
                    // Finish already handled; keep draining so the source
                    // winds down instead of being dropped mid-read.
                    tracing::trace!("[☁️  -> ⚙️ ] Post-finish event drained");
                    continue;
                }

                metric.record_event(&event);

                let choice = match event.choices.first() {
                    Some(choice) => choice,
                    None => continue,
                };

                if let Some(content) = &choice.delta.content {
                    if !content.is_empty() {
                        yield Ok(OutputFrame::Text {
                            content: content.clone(),
                        });
                    }
                }

                if let Some(fragments) = &choice.delta.tool_calls {
                    if let Some(fragment) = fragments.first() {
                        if fragment.index == 0 {
                            accumulator.observe(fragment);
                        } else {
                            tracing::debug!(
                                "[☁️  -> ⚙️ ] Skipping tool call fragment at index {}",
                                fragment.index
                            );
                        }
                    }
                }

                if let Some(reason) = &choice.finish_reason {
                    tracing::debug!("[☁️  -> ⚙️ ] Finish reason received: {}", reason);
                    match Self::finalize(&mut accumulator, &context, &dispatcher) {
                        Ok(Some(frame)) => yield Ok(frame),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                    done = true;
                }
            }

            metric.log_summary();
        }
    }

    /// One-shot reconciliation of the accumulator. Parse and extraction come
    /// before any observable effect, so a bad argument payload leaves the
    /// sink untouched and schedules nothing.
    fn finalize(
        accumulator: &mut ToolCallAccumulator,
        context: &Arc<dyn ContextSink>,
        dispatcher: &Arc<dyn SideEffectDispatcher>,
    ) -> Result<Option<OutputFrame>> {
        let call = match accumulator.take_call() {
            Some(call) => call,
            None => return Ok(None),
        };

        let prompt = extract_prompt(&call)?;

        tracing::info!(
            "[⚙️ ] Finalizing tool call '{}' (id={}, {} argument chars)",
            call.function.name,
            call.id,
            call.function.arguments.len()
        );

        // The pipeline appends the spoken text to the context itself after
        // downstream processing; the assistant record carries only the call.
        context.append(
            Role::Assistant,
            TurnRecord {
                role: Role::Assistant,
                content: String::new(),
                tool_calls: Some(vec![call.clone()]),
                tool_call_id: None,
            },
        );
        context.append(
            Role::Tool,
            TurnRecord {
                role: Role::Tool,
                content: format!(
                    "image generated by prompt arguments: {}",
                    call.function.arguments
                ),
                tool_calls: None,
                tool_call_id: Some(call.id.clone()),
            },
        );
        context.append(
            Role::Assistant,
            TurnRecord::text(
                Role::Assistant,
                format!("call to {} function succeeded", call.function.name),
            ),
        );

        let dispatcher = Arc::clone(dispatcher);
        // Detached on purpose: the side effect races with downstream
        // consumption and its outcome never reaches the frame stream.
        tokio::spawn(async move {
            dispatcher.dispatch(prompt).await;
        });

        Ok(Some(OutputFrame::OutOfBand {
            message: OUT_OF_BAND_ACK.to_string(),
        }))
    }
}

fn extract_prompt(call: &ToolCallRecord) -> Result<String> {
    let parsed: serde_json::Value =
        serde_json::from_str(&call.function.arguments).map_err(|source| {
            TributaryError::ArgumentParse {
                name: call.function.name.clone(),
                source,
            }
        })?;
    match parsed.get(PROMPT_ARGUMENT_FIELD).and_then(|v| v.as_str()) {
        Some(prompt) => Ok(prompt.to_string()),
        None => Err(TributaryError::MissingArgument {
            name: call.function.name.clone(),
            field: PROMPT_ARGUMENT_FIELD,
        }
        .into()),
    }
}
