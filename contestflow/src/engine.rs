//! Unit-of-work runner shared by every service.

use std::sync::Arc;

use crate::errors::Result;
use crate::events::{EventPublisher, Outbox};
use crate::storage::{Tables, WorkflowStore};

/// Couples a store with a publisher.
///
/// [`Engine::transact`] runs a closure against one transaction, commits, then
/// publishes whatever the closure queued. Any error before commit rolls the
/// whole transaction back and discards the queued events.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn WorkflowStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates a new engine.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Returns the publisher.
    #[must_use]
    pub fn publisher(&self) -> &Arc<dyn EventPublisher> {
        &self.publisher
    }

    /// Runs `work` inside one transaction.
    pub async fn transact<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Tables, &mut Outbox) -> Result<T> + Send,
        T: Send,
    {
        let mut tx = self.store.begin().await?;
        let mut outbox = Outbox::new();
        let value = work(tx.tables_mut(), &mut outbox)?;
        tx.commit().await?;
        outbox.publish_best_effort(self.publisher.as_ref()).await;
        Ok(value)
    }

    /// Runs a read-only closure against a fresh transaction, never committing.
    pub async fn read<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Tables) -> Result<T> + Send,
        T: Send,
    {
        let tx = self.store.begin().await?;
        query(tx.tables())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ContestflowError;
    use crate::events::{CollectingPublisher, StageStarted};
    use crate::storage::{InMemoryStore, MockWorkflowStore};
    use crate::testing::{fixtures, FlakyStore, UnreachablePublisher};
    use uuid::Uuid;

    fn started() -> StageStarted {
        StageStarted {
            procedure_instance_id: Uuid::new_v4(),
            contest_instance_id: None,
            application_instance_id: None,
            stage_id: Uuid::new_v4(),
            stage_type: "Setup".to_string(),
            executor_name: "svc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_then_publish() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(CollectingPublisher::new());
        let engine = Engine::new(Arc::new(store.clone()), publisher.clone());
        let (procedure, _) = fixtures::template_tree().unwrap();
        let id = procedure.id;

        engine
            .transact(move |tables, outbox| {
                tables.put_procedure_template(procedure);
                outbox.push(started());
                Ok(())
            })
            .await
            .unwrap();

        assert!(store.snapshot().await.procedure_template(id).is_ok());
        assert_eq!(publisher.len(), 1);
        assert!(engine.read(move |tables| tables.procedure_template(id).map(|t| t.id)).await.is_ok());
    }

    #[tokio::test]
    async fn test_error_rolls_back_and_discards_outbox() {
        let store = InMemoryStore::new();
        let publisher = Arc::new(CollectingPublisher::new());
        let engine = Engine::new(Arc::new(store.clone()), publisher.clone());
        let (procedure, _) = fixtures::template_tree().unwrap();
        let id = procedure.id;

        let result: Result<()> = engine
            .transact(move |tables, outbox| {
                tables.put_procedure_template(procedure);
                outbox.push(started());
                Err(ContestflowError::storage("boom"))
            })
            .await;

        assert!(result.is_err());
        assert!(store.snapshot().await.procedure_template(id).is_err());
        assert!(publisher.is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_publishes_nothing() {
        let flaky = FlakyStore::new(Arc::new(InMemoryStore::new()));
        flaky.fail_next_commits(1);
        let publisher = Arc::new(CollectingPublisher::new());
        let engine = Engine::new(Arc::new(flaky), publisher.clone());

        let result = engine
            .transact(|_, outbox| {
                outbox.push(started());
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ContestflowError::Storage(_))));
        assert!(publisher.is_empty());
    }

    #[tokio::test]
    async fn test_begin_failure_propagates() {
        let mut store = MockWorkflowStore::new();
        store
            .expect_begin()
            .times(1)
            .returning(|| Err(ContestflowError::storage("pool exhausted")));
        let engine = Engine::new(Arc::new(store), Arc::new(CollectingPublisher::new()));

        let err = engine.read(|_| Ok(())).await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_fail_committed_work() {
        let publisher = Arc::new(UnreachablePublisher::new());
        let engine = Engine::new(Arc::new(InMemoryStore::new()), publisher.clone());

        let value = engine
            .transact(|_, outbox| {
                outbox.push(started());
                outbox.push(started());
                Ok(7)
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(publisher.attempts(), 2);
    }
}
