use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::model::DomainName;

/// Typed lifecycle events published for external consumers (notification,
/// audit). The core never renders or sends anything itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Approved {
        domain: DomainName,
        request_id: Uuid,
        at: DateTime<Utc>,
    },
    Provisioned {
        domain: DomainName,
        registry_id: String,
        at: DateTime<Utc>,
    },
    OnHold {
        domain: DomainName,
        at: DateTime<Utc>,
    },
    HoldRemoved {
        domain: DomainName,
        at: DateTime<Utc>,
    },
    Renewed {
        domain: DomainName,
        new_expiration: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    Expiring {
        domain: DomainName,
        expiration: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    Deleted {
        domain: DomainName,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Dotted event name used by downstream routing.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Approved { .. } => "domain.approved",
            LifecycleEvent::Provisioned { .. } => "domain.provisioned",
            LifecycleEvent::OnHold { .. } => "domain.on_hold",
            LifecycleEvent::HoldRemoved { .. } => "domain.hold_removed",
            LifecycleEvent::Renewed { .. } => "domain.renewed",
            LifecycleEvent::Expiring { .. } => "domain.expiring",
            LifecycleEvent::Deleted { .. } => "domain.deleted",
        }
    }

    pub fn domain(&self) -> &DomainName {
        match self {
            LifecycleEvent::Approved { domain, .. }
            | LifecycleEvent::Provisioned { domain, .. }
            | LifecycleEvent::OnHold { domain, .. }
            | LifecycleEvent::HoldRemoved { domain, .. }
            | LifecycleEvent::Renewed { domain, .. }
            | LifecycleEvent::Expiring { domain, .. }
            | LifecycleEvent::Deleted { domain, .. } => domain,
        }
    }
}

/// Broadcast fan-out for lifecycle events. Emission never fails: with no
/// subscribers the event is still logged and dropped.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: LifecycleEvent) {
        tracing::info!(
            event = event.kind(),
            domain = %event.domain(),
            "lifecycle event"
        );
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn name() -> DomainName {
        DomainName::from_str("city.gov").unwrap()
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();

        let event = LifecycleEvent::Approved {
            domain: name(),
            request_id: Uuid::new_v4(),
            at: Utc::now(),
        };
        emitter.emit(event.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
        assert_eq!(received.kind(), "domain.approved");
    }

    #[test]
    fn emitting_without_subscribers_does_not_panic() {
        let emitter = EventEmitter::default();
        emitter.emit(LifecycleEvent::Deleted {
            domain: name(),
            at: Utc::now(),
        });
    }
}
