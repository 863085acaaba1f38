use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_error::SpanTrace;
use uuid::Uuid;

use crate::constants::MAX_EVENT_BYTES;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ToolCallId(pub String);

impl ToolCallId {
    pub fn new() -> Self {
        Self(format!("call_{}", Uuid::new_v4().simple()))
    }
}

impl Default for ToolCallId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ToolCallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Tool call '{name}' arguments failed to parse: {source}")]
    ArgumentParse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Tool call '{name}' arguments missing required field '{field}'")]
    MissingArgument { name: String, field: &'static str },

    #[error("Internal error: {0}")]
    Internal(String, SpanTrace),
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: TributaryError,
    pub span_trace: SpanTrace,
}

impl std::fmt::Display for ObservedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n\nSpan Trace:\n{}", self.inner, self.span_trace)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<TributaryError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;

/// --- CORE ROLES ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// --- CONTEXT RECORDS ---

/// One conversation turn as the context sink stores it. Sink consumers
/// reconstruct conversation state strictly in append order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnRecord {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl TurnRecord {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A completed tool call in provider wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub index: u32,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// --- OUTPUT FRAMES ---

/// One unit of aggregator output. `Text` frames join the running transcript;
/// `OutOfBand` is a side-channel notice emitted at most once per stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum OutputFrame {
    Text { content: String },
    OutOfBand { message: String },
}

/// --- PROVIDER WIRE TYPES ---

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct DeltaEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<DeltaChoice>,
    pub usage: Option<Usage>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct DeltaChoice {
    pub delta: MessageDelta,
    pub finish_reason: Option<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
pub struct MessageDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallFragment>>,
    /// Catch-all for provider extras (reasoning, annotations). Tolerated, unused.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: u32,
    pub id: Option<String>,
    pub function: Option<FunctionFragment>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
pub struct FunctionFragment {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct ProviderError {
    pub error: ProviderErrorDetails,
}

#[derive(serde::Deserialize, serde::Serialize, Debug)]
pub struct ProviderErrorDetails {
    pub message: String,
    pub code: Option<u16>,

    /// Catch-all for extra provider fields like `retryable`, `provider: { status, body }`
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug)]
pub enum LineEvent {
    Event(DeltaEvent),
    Error(ProviderError),
    Unknown(String),
}

pub fn parse_stream_line(data: &str) -> LineEvent {
    if data.len() > MAX_EVENT_BYTES {
        return LineEvent::Error(ProviderError {
            error: ProviderErrorDetails {
                message: format!("JSON chunk too large: {} bytes", data.len()),
                code: Some(413),
                extra: serde_json::Map::new(),
            },
        });
    }
    // Try Error first as it's more specific (requires "error" key)
    if let Ok(err) = serde_json::from_str::<ProviderError>(data) {
        return LineEvent::Error(err);
    }
    if let Ok(event) = serde_json::from_str::<DeltaEvent>(data) {
        // Validation: an event should either have choices or usage to count
        if !event.choices.is_empty() || event.usage.is_some() {
            return LineEvent::Event(event);
        }
    }
    let snippet: String = data.chars().take(200).collect();
    tracing::debug!("[STREAM] Unknown line format: {}", snippet);
    LineEvent::Unknown(data.to_string())
}

/// --- TOOL CALL ACCUMULATOR ---

/// In-progress reconstruction of a single tool call, owned by one stream
/// consumption. A fragment carrying a non-empty name arms the accumulator:
/// id and name are set together and the argument buffer is reset. Argument
/// chunks append in arrival order, including the arming fragment's own.
#[derive(Debug, Clone, Default)]
pub struct ToolCallAccumulator {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, fragment: &ToolCallFragment) {
        let function = match &fragment.function {
            Some(f) => f,
            None => return,
        };

        if let Some(name) = &function.name {
            if !name.is_empty() {
                // Some providers omit the id even on the name-bearing
                // fragment; fall back to a stable synthetic id.
                let id = match &fragment.id {
                    Some(id) if !id.is_empty() => id.clone(),
                    _ => ToolCallId::new().0,
                };
                tracing::debug!("[ACCUMULATOR] Tool call {} name: {}", id, name);
                self.id = Some(id);
                self.name = Some(name.clone());
                self.arguments.clear();
            }
        }

        if let Some(chunk) = &function.arguments {
            if !chunk.is_empty() {
                tracing::debug!(
                    "[ACCUMULATOR] Arguments delta: {} chars (total: {} -> {})",
                    chunk.len(),
                    self.arguments.len(),
                    self.arguments.len() + chunk.len()
                );
                self.arguments.push_str(chunk);
            }
        }
    }

    /// A stream that never armed the accumulator has no tool call.
    pub fn is_armed(&self) -> bool {
        self.name.is_some()
    }

    pub fn take_call(&mut self) -> Option<ToolCallRecord> {
        let name = self.name.take()?;
        let id = match self.id.take() {
            Some(id) => id,
            None => ToolCallId::new().0,
        };
        Some(ToolCallRecord {
            id,
            call_type: "function".to_string(),
            index: 0,
            function: FunctionCall {
                name,
                arguments: std::mem::take(&mut self.arguments),
            },
        })
    }
}
