//! Notification dispatch.
//!
//! Committed ledger events are enqueued on an unbounded channel while the
//! ledger lock is held (a non-blocking push, which keeps commit order) and
//! delivered to a [`NotificationSink`] by a separate task. Sink I/O therefore
//! never runs inside the critical section.
//!
//! Delivery is at-least-once under [`DeliveryPolicy::Retry`]: a sink that
//! fails after partially handling an event sees it again.

use std::time::Duration;

use async_trait::async_trait;
use roomledger_core::{Environment, LedgerEvent};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

/// Errors a sink reports for a single delivery attempt.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Downstream is temporarily unreachable; retrying may help.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Downstream rejected the event for good.
    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Consumer of ledger events (indexer, push gateway, audit log).
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    /// Deliver one event.
    async fn deliver(&self, event: &LedgerEvent) -> Result<(), SinkError>;
}

/// Sink that logs each event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, event: &LedgerEvent) -> Result<(), SinkError> {
        tracing::info!(event = event.name(), room_id = ?event.room_id(), "ledger event");
        Ok(())
    }
}

/// Sink that fans events out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<LedgerEvent>,
}

impl ChannelSink {
    /// Create a sink buffering up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events delivered from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, event: &LedgerEvent) -> Result<(), SinkError> {
        // No subscribers is not a failure: the event is fire-and-forget.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Policy for handling sink failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Log failure and move on to the next event.
    #[default]
    BestEffort,

    /// Retry failed deliveries with exponential backoff.
    Retry {
        /// Maximum number of attempts, including the first
        max_attempts: u32,
        /// Initial backoff duration in milliseconds
        initial_backoff_ms: u64,
    },
}

impl DeliveryPolicy {
    fn max_attempts(self) -> u32 {
        match self {
            Self::BestEffort => 1,
            Self::Retry { max_attempts, .. } => max_attempts.max(1),
        }
    }

    /// Backoff before attempt number `attempt + 1` (attempts count from 1).
    fn backoff(self, attempt: u32) -> Duration {
        match self {
            Self::BestEffort => Duration::ZERO,
            Self::Retry { initial_backoff_ms, .. } => {
                let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
                Duration::from_millis(initial_backoff_ms.saturating_mul(factor))
            },
        }
    }
}

/// Deliver one event under `policy`, returning the number of attempts used.
///
/// # Errors
///
/// The last sink error once every allowed attempt has failed.
pub async fn deliver_with_policy<E, S>(
    env: &E,
    sink: &S,
    policy: DeliveryPolicy,
    event: &LedgerEvent,
) -> Result<u32, SinkError>
where
    E: Environment,
    S: NotificationSink + ?Sized,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;
    loop {
        match sink.deliver(event).await {
            Ok(()) => return Ok(attempt),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                tracing::debug!(
                    event = event.name(),
                    attempt,
                    error = %e,
                    "delivery failed, retrying"
                );
                env.sleep(policy.backoff(attempt)).await;
                attempt += 1;
            },
        }
    }
}

/// Producer side of the dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<LedgerEvent>,
}

impl DispatchHandle {
    /// Enqueue events for delivery. Never blocks.
    pub fn publish(&self, events: impl IntoIterator<Item = LedgerEvent>) {
        for event in events {
            if self.tx.send(event).is_err() {
                tracing::warn!("dispatcher stopped, dropping ledger event");
                return;
            }
        }
    }
}

/// Spawn the delivery task.
///
/// The task ends once every [`DispatchHandle`] has been dropped and the queue
/// has drained.
pub fn spawn_dispatcher<E, S>(
    env: E,
    sink: S,
    policy: DeliveryPolicy,
) -> (DispatchHandle, JoinHandle<()>)
where
    E: Environment,
    S: NotificationSink,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<LedgerEvent>();

    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = deliver_with_policy(&env, &sink, policy, &event).await {
                tracing::error!(event = event.name(), error = %e, "dropping undeliverable event");
            }
        }
        tracing::debug!("dispatcher drained");
    });

    (DispatchHandle { tx }, task)
}
