//! In-memory transactional store.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Tables, Transaction, WorkflowStore};
use crate::errors::Result;

/// A store holding all tables behind one async lock.
///
/// `begin` takes the lock and clones the tables into a working set. Commit
/// writes the working set back; dropping the transaction discards it.
///
/// Transactions are serialized and each written relation is copied whole, so
/// a stage result costs time linear in the results already stored. Fine for
/// tests and single-node tools; a production deployment implements
/// [`WorkflowStore`] over a database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with existing tables.
    #[must_use]
    pub fn with_tables(tables: Tables) -> Self {
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }

    /// Returns a copy of the committed state.
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn tables(&self) -> &Tables {
        &self.working
    }

    fn tables_mut(&mut self) -> &mut Tables {
        &mut self.working
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}
