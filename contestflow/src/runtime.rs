//! Wiring of store, publisher, services and message pump.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::dispatch::{HandlerTable, MessagePump, PumpHandle, PumpReport};
use crate::engine::Engine;
use crate::errors::Result;
use crate::events::{Delivery, EventPublisher, InboundEvent, IntegrationEnvelope, NoOpPublisher};
use crate::instances::InstanceService;
use crate::orchestrator::Orchestrator;
use crate::snapshot::SnapshotService;
use crate::storage::{InMemoryStore, WorkflowStore};
use crate::templates::TemplateService;

/// Builder for [`Contestflow`].
#[derive(Default)]
pub struct ContestflowBuilder {
    store: Option<Arc<dyn WorkflowStore>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for ContestflowBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContestflowBuilder")
            .field("custom_store", &self.store.is_some())
            .field("custom_publisher", &self.publisher.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl ContestflowBuilder {
    /// Creates a builder with an in-memory store and a no-op publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the broker publisher.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Wires everything together. The pump is created but not started.
    #[must_use]
    pub fn build(self) -> Contestflow {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let broker = self
            .publisher
            .unwrap_or_else(|| Arc::new(NoOpPublisher));

        let (pump, handle) = MessagePump::channel(&self.config);
        let publisher: Arc<dyn EventPublisher> =
            if self.config.loopback_stage_transitions || self.config.loopback_template_versions {
                Arc::new(handle.loopback_publisher(
                    broker,
                    self.config.loopback_stage_transitions,
                    self.config.loopback_template_versions,
                ))
            } else {
                broker
            };

        let engine = Engine::new(store, publisher);
        let orchestrator = Orchestrator::new(engine.clone());
        Contestflow {
            templates: TemplateService::new(engine.clone()),
            instances: InstanceService::new(engine.clone()),
            snapshots: SnapshotService::new(engine.clone()),
            table: Arc::new(HandlerTable::for_orchestrator(orchestrator.clone())),
            orchestrator,
            engine,
            config: self.config,
            handle,
            pump: Mutex::new(Some(pump)),
            running: Mutex::new(None),
        }
    }
}

/// A fully wired orchestration engine.
///
/// Services can be used directly. Inbound broker traffic goes through
/// [`Contestflow::deliver`] once [`Contestflow::spawn_pump`] has started the
/// message pump.
pub struct Contestflow {
    engine: Engine,
    config: OrchestratorConfig,
    templates: TemplateService,
    instances: InstanceService,
    snapshots: SnapshotService,
    orchestrator: Orchestrator,
    table: Arc<HandlerTable>,
    handle: PumpHandle,
    pump: Mutex<Option<MessagePump>>,
    running: Mutex<Option<JoinHandle<PumpReport>>>,
}

impl std::fmt::Debug for Contestflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contestflow")
            .field("config", &self.config)
            .field("table", &self.table)
            .field("pump_running", &self.running.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Contestflow {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> ContestflowBuilder {
        ContestflowBuilder::new()
    }

    /// Template service.
    #[must_use]
    pub fn templates(&self) -> &TemplateService {
        &self.templates
    }

    /// Instance service.
    #[must_use]
    pub fn instances(&self) -> &InstanceService {
        &self.instances
    }

    /// Snapshot service.
    #[must_use]
    pub fn snapshots(&self) -> &SnapshotService {
        &self.snapshots
    }

    /// Event handlers, for direct invocation without the pump.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// The shared engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// A handle for feeding the pump from other tasks.
    ///
    /// Outstanding handles keep the pump alive past [`Contestflow::shutdown`].
    #[must_use]
    pub fn handle(&self) -> PumpHandle {
        self.handle.clone()
    }

    /// Starts the message pump on the current tokio runtime.
    ///
    /// Returns false if it was already started.
    pub fn spawn_pump(&self) -> bool {
        let Some(pump) = self.pump.lock().take() else {
            return false;
        };
        let table = Arc::clone(&self.table);
        *self.running.lock() = Some(tokio::spawn(pump.run(table)));
        true
    }

    /// Enqueues a raw delivery.
    pub async fn deliver(&self, delivery: Delivery) -> Result<()> {
        self.handle.deliver(delivery).await
    }

    /// Enqueues an envelope.
    pub async fn submit(&self, envelope: &IntegrationEnvelope<InboundEvent>) -> Result<()> {
        self.handle.submit(envelope).await
    }

    /// Waits until every enqueued delivery has been handled.
    pub async fn wait_idle(&self) {
        self.handle.wait_idle().await;
    }

    /// Counters so far.
    #[must_use]
    pub fn report(&self) -> PumpReport {
        self.handle.report()
    }

    /// Closes the inbound channel, drains the pump and returns its counters.
    pub async fn shutdown(self) -> PumpReport {
        let Self {
            handle,
            running,
            pump,
            ..
        } = self;
        let fallback = handle.report();
        drop(handle);
        drop(pump);

        let Some(task) = running.into_inner() else {
            return fallback;
        };
        match task.await {
            Ok(report) => {
                info!(total = report.total(), "Contestflow shut down");
                report
            }
            Err(err) => {
                warn!(error = %err, "Message pump task ended abnormally");
                fallback
            }
        }
    }
}
