//! Convenience re-exports for common signal-system usage

pub use crate::bus::{
    handler, BusError, BusHandler, BusMessage, InMemoryHub, LocalBus, MessageBus, SubscriptionId,
};
pub use crate::event::{EventType, HookData};
pub use crate::manager::{CallbackId, HookCallback, SignalManager, SignalStats};

pub use async_trait::async_trait;
