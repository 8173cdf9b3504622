//! Observability utilities.

mod subscriber;
mod tracing;

pub use subscriber::init_tracing;
pub use tracing::{HandlerSpanAttributes, SpanTimer};
