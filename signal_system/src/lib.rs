//! Signal system for mutation hooks and pub/sub messaging
//!
//! This crate provides the hook registry fired synchronously by every mutation,
//! the message bus abstraction used for cache invalidation and node replication,
//! and an in-process bus implementation.

pub mod bus;
pub mod event;
pub mod manager;
pub mod prelude;

pub use bus::{
    handler, BusError, BusHandler, BusMessage, InMemoryHub, LocalBus, MessageBus, SubscriptionId,
};
pub use config::SignalConfig;
pub use event::{EventType, HookData};
pub use manager::{CallbackId, HookCallback, SignalManager, SignalStats};
