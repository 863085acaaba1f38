use async_trait::async_trait;

/// The side effect a finalized tool call triggers. Invoked as a detached
/// task; the aggregator never awaits the outcome, so implementations handle
/// their own failures.
#[async_trait]
pub trait SideEffectDispatcher: Send + Sync {
    async fn dispatch(&self, prompt: String);
}
