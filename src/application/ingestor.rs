// Reading ingestor - Cancellable per-farm subscriptions over a reading source
use crate::application::clock::Clock;
use crate::application::reading_source::{PayloadStream, ReadingSource};
use crate::domain::reading::{RawReading, SensorReading};
use crate::domain::snapshot::StreamHealth;
use crate::error::{StreamError, StreamStale, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Consecutive failed connections tolerated before giving up. Zero leaves
    /// resubscription entirely to the caller.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Exponential backoff before reconnect `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSettings {
    pub idle_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Receives the output of one subscription.
///
/// Callbacks run on the subscription's task, one at a time and in arrival
/// order. They must not block and must not cancel their own subscription.
pub trait ReadingHandler: Send + Sync + 'static {
    fn on_reading(&self, reading: SensorReading);

    fn on_stream_error(&self, error: StreamError) {
        let _ = error;
    }

    fn on_stale(&self, stale: StreamStale) {
        let _ = stale;
    }

    fn on_resumed(&self, farm_id: &str) {
        let _ = farm_id;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamCondition {
    Error(StreamError),
    Stale(StreamStale),
    Resumed { farm_id: String },
}

/// Handler that forwards everything into channels.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    readings: mpsc::UnboundedSender<SensorReading>,
    conditions: mpsc::UnboundedSender<StreamCondition>,
}

#[derive(Debug)]
pub struct ReadingChannels {
    pub readings: mpsc::UnboundedReceiver<SensorReading>,
    pub conditions: mpsc::UnboundedReceiver<StreamCondition>,
}

impl ChannelHandler {
    pub fn new() -> (Self, ReadingChannels) {
        let (readings_tx, readings_rx) = mpsc::unbounded_channel();
        let (conditions_tx, conditions_rx) = mpsc::unbounded_channel();
        (
            Self {
                readings: readings_tx,
                conditions: conditions_tx,
            },
            ReadingChannels {
                readings: readings_rx,
                conditions: conditions_rx,
            },
        )
    }
}

impl ReadingHandler for ChannelHandler {
    fn on_reading(&self, reading: SensorReading) {
        let _ = self.readings.send(reading);
    }

    fn on_stream_error(&self, error: StreamError) {
        let _ = self.conditions.send(StreamCondition::Error(error));
    }

    fn on_stale(&self, stale: StreamStale) {
        let _ = self.conditions.send(StreamCondition::Stale(stale));
    }

    fn on_resumed(&self, farm_id: &str) {
        let _ = self.conditions.send(StreamCondition::Resumed {
            farm_id: farm_id.to_string(),
        });
    }
}

#[derive(Debug)]
struct Shared {
    id: u64,
    farm_id: String,
    // Delivery gate: held for the duration of every handler callback.
    active: Mutex<bool>,
    status: Mutex<StreamHealth>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if *active {
            f();
        }
        *active
    }

    /// Status changes are ignored once the subscription is cancelled.
    fn set_status(&self, status: StreamHealth) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if *active {
            *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
        }
    }

    fn is_active(&self) -> bool {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel(&self) -> bool {
        let was_active = {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            *self.status.lock().unwrap_or_else(|e| e.into_inner()) = StreamHealth::Idle;
            std::mem::replace(&mut *active, false)
        };
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        was_active
    }
}

/// Owner's handle on a subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    shared: Arc<Shared>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn farm_id(&self) -> &str {
        &self.shared.farm_id
    }

    pub fn status(&self) -> StreamHealth {
        self.shared
            .status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Stop delivery. Once this returns no handler callback is running and
    /// none will start. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if self.shared.cancel() {
            tracing::info!(
                "Unsubscribed {} from farm {}",
                self.shared.id,
                self.shared.farm_id
            );
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

pub struct ReadingIngestor {
    source: Arc<dyn ReadingSource>,
    clock: Arc<dyn Clock>,
    settings: IngestSettings,
    next_id: AtomicU64,
}

impl ReadingIngestor {
    pub fn new(
        source: Arc<dyn ReadingSource>,
        clock: Arc<dyn Clock>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            clock,
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Start delivering the farm's readings to `handler`. Must be called from
    /// within a tokio runtime.
    pub fn subscribe<H: ReadingHandler>(&self, farm_id: &str, handler: H) -> SubscriptionHandle {
        let shared = Arc::new(Shared {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            farm_id: farm_id.to_string(),
            active: Mutex::new(true),
            status: Mutex::new(StreamHealth::Connecting),
            task: Mutex::new(None),
        });

        let pump = Pump {
            shared: shared.clone(),
            source: self.source.clone(),
            clock: self.clock.clone(),
            settings: self.settings.clone(),
            handler,
            last_timestamp: None,
        };
        let task = tokio::spawn(pump.run());

        *shared.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        // Cancelled between spawn and registration: nobody else will abort it
        if !shared.is_active() {
            shared.cancel();
        }

        tracing::info!("Subscribed {} to farm {}", shared.id, farm_id);
        SubscriptionHandle { shared }
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
    }
}

struct Pump<H> {
    shared: Arc<Shared>,
    source: Arc<dyn ReadingSource>,
    clock: Arc<dyn Clock>,
    settings: IngestSettings,
    handler: H,
    last_timestamp: Option<DateTime<Utc>>,
}

impl<H: ReadingHandler> Pump<H> {
    async fn run(mut self) {
        let farm_id = self.shared.farm_id.clone();
        let policy = self.settings.reconnect;
        let mut attempt = 0u32;

        loop {
            let (error, received) = match self.source.open(&farm_id).await {
                Ok(stream) => self.pump(stream).await,
                Err(e) => (e, false),
            };

            tracing::warn!("Stream error on farm {}: {}", farm_id, error);
            if !self.shared.deliver(|| self.handler.on_stream_error(error.clone())) {
                return;
            }

            // A connection that delivered data resets the failure count
            attempt = if received { 1 } else { attempt + 1 };
            if attempt > policy.max_attempts {
                tracing::error!(
                    "Giving up on farm {} after {} failed connection(s)",
                    farm_id,
                    attempt - 1
                );
                self.shared.set_status(StreamHealth::Disconnected {
                    reason: error.to_string(),
                });
                return;
            }

            self.shared.set_status(StreamHealth::Reconnecting { attempt });
            let backoff = policy.backoff(attempt);
            tracing::debug!("Reconnecting farm {} in {:?} (attempt {})", farm_id, backoff, attempt);
            tokio::time::sleep(backoff).await;
        }
    }

    /// Drive one connection until it fails. Returns the failure and whether
    /// any reading was delivered on it.
    async fn pump(&mut self, mut stream: PayloadStream) -> (StreamError, bool) {
        let farm_id = self.shared.farm_id.clone();
        let idle_timeout = self.settings.idle_timeout;
        let mut received = false;
        let mut stale = false;
        let mut last_activity = Instant::now();

        self.shared.set_status(StreamHealth::Live);

        loop {
            // Only valid readings count as activity; rejected payloads do not
            // hold off staleness
            let deadline = if stale {
                Instant::now() + idle_timeout
            } else {
                last_activity + idle_timeout
            };
            let next = match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let idle_for = last_activity.elapsed();
                    self.shared.set_status(StreamHealth::Stale {
                        idle_for_ms: idle_for.as_millis() as u64,
                    });
                    if !stale {
                        stale = true;
                        let condition = StreamStale {
                            farm_id: farm_id.clone(),
                            idle_for,
                        };
                        tracing::warn!("{}", condition);
                        self.shared.deliver(|| self.handler.on_stale(condition));
                    }
                    continue;
                }
            };

            let payload = match next {
                Some(Ok(payload)) => payload,
                Some(Err(e)) => return (e, received),
                None => return (StreamError::Closed { farm_id }, received),
            };

            let reading = match self.decode(&payload) {
                Ok(reading) => reading,
                Err(e) => {
                    tracing::warn!("Dropping reading for farm {}: {}", farm_id, e);
                    continue;
                }
            };

            last_activity = Instant::now();
            self.last_timestamp = Some(reading.timestamp);
            received = true;

            if stale {
                stale = false;
                self.shared.set_status(StreamHealth::Live);
                self.shared.deliver(|| self.handler.on_resumed(&farm_id));
            }

            tracing::debug!("Reading for farm {} at {}", farm_id, reading.timestamp);
            self.shared.deliver(|| self.handler.on_reading(reading));
        }
    }

    fn decode(&self, payload: &Bytes) -> Result<SensorReading, ValidationError> {
        let raw = RawReading::parse(payload)?;
        let reading =
            SensorReading::from_raw(&self.shared.farm_id, raw, self.clock.now(), Instant::now())?;

        if let Some(last) = self.last_timestamp {
            if reading.timestamp < last {
                return Err(ValidationError::OutOfOrder {
                    timestamp: reading.timestamp,
                    last,
                });
            }
        }
        Ok(reading)
    }
}
