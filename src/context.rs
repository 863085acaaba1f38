use std::sync::{Arc, Mutex};

use crate::types::{Role, TurnRecord};

/// Where finalized turns land. Appends are synchronous and strictly ordered;
/// the sink owns whatever synchronization concurrent readers need.
pub trait ContextSink: Send + Sync {
    fn append(&self, role: Role, record: TurnRecord);
}

#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub history: Vec<TurnRecord>,
    pub conversation_id: String,
}

/// Shared in-memory context. One writer during a stream's finalize; the rest
/// of the pipeline may read concurrently through `history()` snapshots.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<Mutex<ConversationContext>>,
}

impl SharedContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConversationContext {
                history: Vec::new(),
                conversation_id: conversation_id.into(),
            })),
        }
    }

    pub fn history(&self) -> Vec<TurnRecord> {
        match self.inner.lock() {
            Ok(ctx) => ctx.history.clone(),
            Err(poisoned) => poisoned.into_inner().history.clone(),
        }
    }
}

impl ContextSink for SharedContext {
    fn append(&self, role: Role, record: TurnRecord) {
        let mut ctx = match self.inner.lock() {
            Ok(ctx) => ctx,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::debug!(
            "[CONTEXT] Appending {:?} turn to conversation {} (history: {} -> {})",
            role,
            ctx.conversation_id,
            ctx.history.len(),
            ctx.history.len() + 1
        );
        ctx.history.push(record);
    }
}
