use tracing::info;

use crate::types::DeltaEvent;

/// Per-stream counters, logged once when consumption ends. Observability
/// only; never feeds back into the state machine.
#[derive(Default)]
pub struct StreamMetric {
    pub events: usize,
    pub tokens: usize,
    pub tool_parts: usize,
    pub text_chars: usize,
    pub tool_names: Vec<String>,
}

impl StreamMetric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: &DeltaEvent) {
        self.events += 1;
        if let Some(usage) = &event.usage {
            self.tokens = usage.total_tokens as usize;
        }
        for choice in &event.choices {
            if let Some(content) = &choice.delta.content {
                self.text_chars += content.len();
            }
            if let Some(tools) = &choice.delta.tool_calls {
                self.tool_parts += tools.len();
                for t in tools {
                    if let Some(f) = &t.function {
                        if let Some(name) = &f.name {
                            if !name.is_empty() {
                                self.tool_names.push(name.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    pub fn log_summary(&self) {
        let tools_str = if self.tool_names.is_empty() {
            format!("{}", self.tool_parts)
        } else {
            format!("{} ({})", self.tool_parts, self.tool_names.join(", "))
        };

        info!(
            "[STREAM END] Events: {} | Tools: {} | Text: {} chars | Tokens: {}",
            self.events, tools_str, self.text_chars, self.tokens
        );
    }
}
