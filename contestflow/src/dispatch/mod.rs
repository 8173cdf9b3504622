//! Transport-facing dispatch.
//!
//! A [`MessagePump`] decodes raw [`Delivery`](crate::events::Delivery)
//! messages and routes them through a [`HandlerTable`]. Storage failures are
//! redelivered with backoff; validation and state errors are dropped.

mod pump;
mod retry;
mod table;

pub use pump::{LoopbackPublisher, MessagePump, PumpHandle, PumpReport};
pub use retry::{
    should_retry, with_retry_if, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision,
    RetryState,
};
pub use table::{EventHandler, HandlerTable};

#[cfg(test)]
pub use table::MockEventHandler;
