pub mod constants;
pub mod context;
pub mod dispatch;
pub mod logging;
pub mod streaming;
pub mod types;
pub mod wire;

pub use types::*;

pub use context::{ContextSink, ConversationContext, SharedContext};
pub use dispatch::SideEffectDispatcher;
pub use streaming::StreamAggregator;
pub use wire::delta_events;
