//! Message pump: reads raw deliveries and hands them to per-aggregate lanes.
//!
//! Deliveries that address the same instance (see
//! [`InboundEvent::aggregate_id`]) run one after another in arrival order,
//! including their retries. Different aggregates run in parallel, bounded by
//! [`OrchestratorConfig::worker_concurrency`]. The receive loop takes a worker
//! permit before accepting the next delivery, so a saturated pump fills the
//! inbound channel and [`PumpHandle::deliver`] waits. Events fed back through
//! [`LoopbackPublisher`] use a separate unbounded queue that is drained first,
//! so a handler never waits on its own pump.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::retry::{with_retry_if, RetryConfig};
use super::HandlerTable;
use crate::config::OrchestratorConfig;
use crate::errors::{ContestflowError, Result, TransportError};
use crate::events::{
    Delivery, EventPublisher, InboundEvent, IntegrationEnvelope, OutboundEvent,
};
use crate::observability::{HandlerSpanAttributes, SpanTimer};
use crate::orchestrator::HandlerOutcome;

/// Counters of what happened to each delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpReport {
    /// Handlers that changed state.
    pub applied: u64,
    /// Deliveries absorbed as already applied.
    pub duplicate: u64,
    /// Deliveries with no registered handler.
    pub unhandled: u64,
    /// Deliveries dropped on a non-retriable error.
    pub rejected: u64,
    /// Deliveries dropped after exhausting retries.
    pub failed: u64,
    /// Deliveries that could not be decoded.
    pub malformed: u64,
}

impl PumpReport {
    /// Total deliveries accounted for.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.applied + self.duplicate + self.unhandled + self.rejected + self.failed + self.malformed
    }
}

#[derive(Debug, Clone, Copy)]
enum Disposition {
    Outcome(HandlerOutcome),
    Rejected,
    Failed,
    Malformed,
}

#[derive(Debug, Default)]
struct PumpStats {
    applied: AtomicU64,
    duplicate: AtomicU64,
    unhandled: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    malformed: AtomicU64,
}

impl PumpStats {
    fn record(&self, disposition: Disposition) {
        let counter = match disposition {
            Disposition::Outcome(HandlerOutcome::Applied) => &self.applied,
            Disposition::Outcome(HandlerOutcome::Duplicate) => &self.duplicate,
            Disposition::Outcome(HandlerOutcome::Unhandled) => &self.unhandled,
            Disposition::Rejected => &self.rejected,
            Disposition::Failed => &self.failed,
            Disposition::Malformed => &self.malformed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self) -> PumpReport {
        PumpReport {
            applied: self.applied.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Counts deliveries between enqueue and final disposition.
#[derive(Debug, Default)]
struct DeliveryTracker {
    pending: AtomicUsize,
    idle: Notify,
    stats: PumpStats,
}

impl DeliveryTracker {
    fn begin(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self, disposition: Disposition) {
        self.stats.record(disposition);
        self.abandon();
    }

    fn abandon(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Sending side of the pump.
///
/// The pump stops once every handle has been dropped and both queues drained.
#[derive(Debug, Clone)]
pub struct PumpHandle {
    sender: mpsc::Sender<Delivery>,
    loopback: mpsc::UnboundedSender<Delivery>,
    tracker: Arc<DeliveryTracker>,
}

impl PumpHandle {
    /// Enqueues a raw delivery, waiting while the inbound channel is full.
    ///
    /// Cancel safe: a dropped call enqueues nothing.
    pub async fn deliver(&self, delivery: Delivery) -> Result<()> {
        let Ok(slot) = self.sender.reserve().await else {
            return Err(TransportError::new(delivery.topic, "message pump is closed").into());
        };
        self.tracker.begin();
        slot.send(delivery);
        Ok(())
    }

    /// Enqueues a batch in order, stopping at the first closed-pump error.
    pub async fn deliver_batch(&self, deliveries: impl IntoIterator<Item = Delivery>) -> Result<()> {
        stream::iter(deliveries.into_iter().map(Ok))
            .try_for_each(|delivery| self.deliver(delivery))
            .await
    }

    /// Encodes and enqueues an envelope.
    pub async fn submit(&self, envelope: &IntegrationEnvelope<InboundEvent>) -> Result<()> {
        self.deliver(Delivery::from_event(envelope)?).await
    }

    /// Resolves once every enqueued delivery, including loopback deliveries
    /// produced while handling them, has reached a final disposition.
    pub async fn wait_idle(&self) {
        self.tracker.wait_idle().await;
    }

    /// Deliveries not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.pending.load(Ordering::SeqCst)
    }

    /// Counters so far.
    #[must_use]
    pub fn report(&self) -> PumpReport {
        self.tracker.stats.report()
    }

    /// Wraps `inner` so that selected outbound events are also fed back into
    /// this pump. The loopback does not keep the pump alive.
    #[must_use]
    pub fn loopback_publisher(
        &self,
        inner: Arc<dyn EventPublisher>,
        stage_transitions: bool,
        template_versions: bool,
    ) -> LoopbackPublisher {
        LoopbackPublisher {
            inner,
            sender: self.loopback.downgrade(),
            tracker: Arc::clone(&self.tracker),
            stage_transitions,
            template_versions,
        }
    }
}

/// Receiving side of the pump.
#[derive(Debug)]
pub struct MessagePump {
    receiver: mpsc::Receiver<Delivery>,
    loopback: mpsc::UnboundedReceiver<Delivery>,
    tracker: Arc<DeliveryTracker>,
    workers: usize,
    retry: RetryConfig,
}

impl MessagePump {
    /// Creates a pump and its first handle.
    #[must_use]
    pub fn channel(config: &OrchestratorConfig) -> (Self, PumpHandle) {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        let (loopback_sender, loopback) = mpsc::unbounded_channel();
        let tracker = Arc::new(DeliveryTracker::default());
        let pump = Self {
            receiver,
            loopback,
            tracker: Arc::clone(&tracker),
            workers: config.worker_concurrency.max(1),
            retry: config.retry.clone(),
        };
        let handle = PumpHandle {
            sender,
            loopback: loopback_sender,
            tracker,
        };
        (pump, handle)
    }

    /// Runs until every [`PumpHandle`] is dropped, then waits for in-flight
    /// deliveries and returns the final counters.
    pub async fn run(mut self, table: Arc<HandlerTable>) -> PumpReport {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let lanes: Arc<DashMap<Uuid, VecDeque<Queued>>> = Arc::new(DashMap::new());
        let mut tasks = JoinSet::new();
        info!(workers = self.workers, "Message pump started");

        loop {
            let delivery = tokio::select! {
                biased;
                Some(delivery) = self.loopback.recv() => delivery,
                Some(delivery) = self.receiver.recv() => delivery,
                else => break,
            };
            while let Some(joined) = tasks.try_join_next() {
                log_join_error(joined);
            }

            let envelope = match delivery.decode() {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(topic = %delivery.topic, error = %err, "Dropping malformed delivery");
                    self.tracker.finish(Disposition::Malformed);
                    continue;
                }
            };
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                self.tracker.finish(Disposition::Failed);
                continue;
            };

            let key = envelope.data.aggregate_id();
            let queued = Queued { envelope, permit };
            let first = match lanes.entry(key) {
                Entry::Occupied(mut lane) => {
                    debug!(aggregate_id = %key, queued = lane.get().len() + 1, "Lane busy, delivery queued");
                    lane.get_mut().push_back(queued);
                    None
                }
                Entry::Vacant(lane) => {
                    lane.insert(VecDeque::new());
                    Some(queued)
                }
            };
            if let Some(first) = first {
                let worker = Worker {
                    key,
                    table: Arc::clone(&table),
                    lanes: Arc::clone(&lanes),
                    tracker: Arc::clone(&self.tracker),
                    retry: self.retry.clone(),
                };
                tasks.spawn(worker.drain(first));
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join_error(joined);
        }
        let report = self.tracker.stats.report();
        info!(
            applied = report.applied,
            duplicate = report.duplicate,
            rejected = report.rejected,
            failed = report.failed,
            malformed = report.malformed,
            "Message pump stopped"
        );
        report
    }
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        error!(error = %err, "Delivery task aborted");
    }
}

/// A decoded delivery holding its worker permit.
struct Queued {
    envelope: IntegrationEnvelope<InboundEvent>,
    permit: OwnedSemaphorePermit,
}

/// Drains one aggregate's lane, then removes it.
struct Worker {
    key: Uuid,
    table: Arc<HandlerTable>,
    lanes: Arc<DashMap<Uuid, VecDeque<Queued>>>,
    tracker: Arc<DeliveryTracker>,
    retry: RetryConfig,
}

impl Worker {
    async fn drain(self, first: Queued) {
        let mut next = first;
        loop {
            let Queued { envelope, permit } = next;
            let disposition = self.process(envelope).await;
            drop(permit);
            self.tracker.finish(disposition);

            match self.pop_lane() {
                Some(queued) => next = queued,
                None => return,
            }
        }
    }

    fn pop_lane(&self) -> Option<Queued> {
        match self.lanes.entry(self.key) {
            Entry::Occupied(mut lane) => {
                let next = lane.get_mut().pop_front();
                if next.is_none() {
                    lane.remove();
                }
                next
            }
            Entry::Vacant(_) => None,
        }
    }

    async fn process(&self, envelope: IntegrationEnvelope<InboundEvent>) -> Disposition {
        let event_id = envelope.integration_event_id;
        let kind = envelope.data.kind();
        let timer = SpanTimer::start(kind.topic());
        let key = event_id.to_string();
        let result = with_retry_if(
            &self.retry,
            &key,
            || self.table.dispatch(envelope.clone()),
            ContestflowError::is_retriable,
        )
        .await;

        let attrs = HandlerSpanAttributes::new(kind, event_id).with_duration_ms(timer.finish());
        match result {
            Ok(outcome) => Disposition::Outcome(outcome),
            Err(ContestflowError::DuplicateEvent { .. }) => {
                Disposition::Outcome(HandlerOutcome::Duplicate)
            }
            Err(err) if err.is_retriable() => {
                let attrs = attrs.with_error_code(err.info().code);
                error!(
                    attributes = ?attrs.to_otel_attributes(),
                    error = %err,
                    "Delivery failed after retries"
                );
                Disposition::Failed
            }
            Err(err) => {
                let attrs = attrs.with_error_code(err.info().code);
                warn!(
                    attributes = ?attrs.to_otel_attributes(),
                    error = %err,
                    "Delivery rejected"
                );
                Disposition::Rejected
            }
        }
    }
}

/// Publisher decorator that feeds selected outbound events back into a pump.
///
/// `StageTransitionRequested` comes back as `ProcedureStageAdvanced` and
/// `TemplateVersionPublished` as `ContestTemplateVersionChanged`, each under
/// the outbound envelope's id.
pub struct LoopbackPublisher {
    inner: Arc<dyn EventPublisher>,
    sender: mpsc::WeakUnboundedSender<Delivery>,
    tracker: Arc<DeliveryTracker>,
    stage_transitions: bool,
    template_versions: bool,
}

impl std::fmt::Debug for LoopbackPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackPublisher")
            .field("stage_transitions", &self.stage_transitions)
            .field("template_versions", &self.template_versions)
            .finish_non_exhaustive()
    }
}

impl LoopbackPublisher {
    fn loops_back(&self, event: &OutboundEvent) -> bool {
        match event {
            OutboundEvent::StageTransitionRequested(_) => self.stage_transitions,
            OutboundEvent::TemplateVersionPublished(_) => self.template_versions,
            OutboundEvent::StageStarted(_) | OutboundEvent::ContestInterrupted(_) => false,
        }
    }

    fn feed_back(&self, envelope: &IntegrationEnvelope<OutboundEvent>) -> std::result::Result<(), TransportError> {
        let topic = envelope.data.topic();
        let Some(inbound) = envelope.data.as_inbound() else {
            return Ok(());
        };
        let delivery = Delivery::from_event(&IntegrationEnvelope::new(
            envelope.integration_event_id,
            inbound,
        ))
        .map_err(|err| TransportError::new(topic, err.to_string()))?;

        let Some(sender) = self.sender.upgrade() else {
            debug!(topic, "Pump closed, loopback dropped");
            return Ok(());
        };
        self.tracker.begin();
        if sender.send(delivery).is_err() {
            self.tracker.abandon();
            return Err(TransportError::new(topic, "message pump is closed"));
        }
        debug!(topic, integration_event_id = %envelope.integration_event_id, "Looped back");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for LoopbackPublisher {
    async fn publish(&self, envelope: IntegrationEnvelope<OutboundEvent>) -> std::result::Result<(), TransportError> {
        let looped = if self.loops_back(&envelope.data) {
            self.feed_back(&envelope)
        } else {
            Ok(())
        };
        let published = self.inner.publish(envelope).await;
        looped.and(published)
    }
}
