//! Stores and publishers that fail on demand.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::{ContestflowError, Result, TransportError};
use crate::events::{EventPublisher, IntegrationEnvelope, OutboundEvent};
use crate::storage::{Tables, Transaction, WorkflowStore};

#[derive(Debug, Default)]
struct FlakyState {
    begin_failures: AtomicUsize,
    commit_failures: AtomicUsize,
    commit_passes: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Wraps a store and fails a configurable number of begins or commits.
///
/// A failed commit drops the inner transaction, so nothing it wrote becomes
/// visible.
#[derive(Clone)]
pub struct FlakyStore {
    inner: Arc<dyn WorkflowStore>,
    state: Arc<FlakyState>,
}

impl std::fmt::Debug for FlakyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyStore")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl FlakyStore {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn WorkflowStore>) -> Self {
        Self {
            inner,
            state: Arc::new(FlakyState::default()),
        }
    }

    /// Makes the next `n` calls to `begin` fail.
    pub fn fail_next_begins(&self, n: usize) {
        self.state.begin_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` commits fail.
    pub fn fail_next_commits(&self, n: usize) {
        self.state.commit_failures.store(n, Ordering::SeqCst);
    }

    /// Lets `passes` commits through, then fails the following `n`.
    pub fn fail_commits_after(&self, passes: usize, n: usize) {
        self.state.commit_passes.store(passes, Ordering::SeqCst);
        self.state.commit_failures.store(n, Ordering::SeqCst);
    }

    /// Calls to `begin`, failed ones included.
    #[must_use]
    pub fn begin_count(&self) -> usize {
        self.state.begins.load(Ordering::SeqCst)
    }

    /// Successful commits.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowStore for FlakyStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.state.begin_failures) {
            return Err(ContestflowError::storage("injected begin failure"));
        }
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin().await?,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FlakyTransaction {
    inner: Box<dyn Transaction>,
    state: Arc<FlakyState>,
}

#[async_trait]
impl Transaction for FlakyTransaction {
    fn tables(&self) -> &Tables {
        self.inner.tables()
    }

    fn tables_mut(&mut self) -> &mut Tables {
        self.inner.tables_mut()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if !take_one(&self.state.commit_passes) && take_one(&self.state.commit_failures) {
            return Err(ContestflowError::storage("injected commit failure"));
        }
        self.inner.commit().await?;
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A publisher whose broker is never reachable.
#[derive(Debug, Default)]
pub struct UnreachablePublisher {
    attempts: AtomicUsize,
}

impl UnreachablePublisher {
    /// Creates a new publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for UnreachablePublisher {
    async fn publish(&self, envelope: IntegrationEnvelope<OutboundEvent>) -> std::result::Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::new(envelope.data.topic(), "broker unreachable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    #[tokio::test]
    async fn test_failed_commit_discards_writes() {
        let memory = InMemoryStore::new();
        let store = FlakyStore::new(Arc::new(memory.clone()));
        store.fail_next_commits(1);

        let (procedure, contests) = crate::testing::fixtures::template_tree().unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.tables_mut().put_procedure_template(procedure.clone());
        assert!(tx.commit().await.is_err());
        assert!(memory.snapshot().await.procedure_template(procedure.id).is_err());

        let mut tx = store.begin().await.unwrap();
        tx.tables_mut().put_contest_template(contests[0].clone());
        tx.commit().await.unwrap();
        assert_eq!(store.commit_count(), 1);
        assert_eq!(store.begin_count(), 2);
    }

    #[tokio::test]
    async fn test_begin_failures_are_counted_down() {
        let store = FlakyStore::new(Arc::new(InMemoryStore::new()));
        store.fail_next_begins(2);

        assert!(store.begin().await.is_err());
        assert!(store.begin().await.is_err());
        assert!(store.begin().await.is_ok());
    }
}
