//! Transactional storage.
//!
//! Every handler and administrative operation runs inside exactly one
//! [`Transaction`]. A transaction is all-or-nothing: either [`Transaction::commit`]
//! succeeds or none of its writes become visible.

mod memory;
mod tables;

pub use memory::InMemoryStore;
pub use tables::Tables;

use async_trait::async_trait;

use crate::errors::Result;

/// An open unit of work over the workflow tables.
#[async_trait]
pub trait Transaction: Send {
    /// Read access to the transaction's view of the tables.
    fn tables(&self) -> &Tables;

    /// Write access to the transaction's view of the tables.
    fn tables_mut(&mut self) -> &mut Tables;

    /// Makes all writes visible atomically.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// A source of transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Opens a transaction, waiting for conflicting work to finish.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}
