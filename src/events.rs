//! Post-commit event emission.
//!
//! Events are published strictly after the financial unit commits and are
//! fire-and-forget: emission failure is logged and never unwinds or blocks
//! the operation that produced it. Delivery to external sinks runs on a
//! background task fed by a broadcast channel.

use crate::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Emitted after a committed engine operation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    BalanceChanged {
        account_id: String,
        balance: u64,
    },
    BetSettled {
        bet_id: String,
        account_id: String,
        won: bool,
        payout: u64,
    },
    MatchStatusChanged {
        match_id: String,
        status: String,
    },
    RoundSettled {
        round_id: String,
        account_id: String,
        won: bool,
        payout: u64,
    },
    TransferStatusChanged {
        account_id: String,
        kind: String,
        amount: u64,
    },
    SettlementGenerated {
        settlement_id: String,
        agent_id: String,
        amount: u64,
    },
}

/// External delivery seam (push, websocket fan-out, audit feed).
/// Implementations must not assume redelivery; a failed delivery is
/// logged and dropped.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &EngineEvent) -> Result<(), EngineError>;
}

/// Broadcast-backed event bus shared by all engine components.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: EngineEvent) {
        if self.sender.send(event).is_err() {
            debug!("event emitted with no active subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Spawn a background task forwarding events to `sink`. Delivery
    /// failures are logged, never retried synchronously, and never reach
    /// the financial operation that emitted the event.
    pub fn spawn_forwarder(&self, sink: Arc<dyn NotificationSink>) -> tokio::task::JoinHandle<()> {
        let mut rx = self.sender.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = sink.deliver(&event).await {
                            warn!("notification delivery failed: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("notification forwarder lagged; skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        delivered: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl NotificationSink for CountingSink {
        async fn deliver(&self, _event: &EngineEvent) -> Result<(), EngineError> {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(EngineError::ExternalDependency("sink down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(16);
        bus.emit(EngineEvent::BalanceChanged {
            account_id: "acc-1".to_string(),
            balance: 100,
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(EngineEvent::BetSettled {
            bet_id: "bet-1".to_string(),
            account_id: "acc-1".to_string(),
            won: true,
            payout: 250,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::BetSettled { payout: 250, .. }));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_stop_forwarder() {
        let bus = EventBus::new(16);
        let sink = Arc::new(CountingSink {
            delivered: AtomicUsize::new(0),
            fail: true,
        });
        let _handle = bus.spawn_forwarder(sink.clone());

        for _ in 0..3 {
            bus.emit(EngineEvent::BalanceChanged {
                account_id: "acc-1".to_string(),
                balance: 1,
            });
        }

        // All three events reach the sink despite every delivery failing.
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while sink.delivered.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("forwarder stalled after delivery failure");
    }
}
