use crate::constants::defaults;
use crate::plan::Status;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Fan-out publisher for plan element status changes
#[derive(Debug, Clone)]
pub struct PlanEventPublisher {
    sender: broadcast::Sender<PlanEvent>,
}

/// Event that has been published
#[derive(Debug, Clone, Serialize)]
pub struct PlanEvent {
    pub name: String,
    pub element_id: Uuid,
    pub element_name: String,
    pub status: Status,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl PlanEventPublisher {
    /// Create a new publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a status event. Having no subscribers is not an error.
    pub fn publish(
        &self,
        event_name: impl Into<String>,
        element_id: Uuid,
        element_name: impl Into<String>,
        status: Status,
        context: Value,
    ) {
        let event = PlanEvent {
            name: event_name.into(),
            element_id,
            element_name: element_name.into(),
            status,
            context,
            published_at: chrono::Utc::now(),
        };

        // send() only fails when nobody is subscribed
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PlanEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PlanEventPublisher {
    fn default() -> Self {
        Self::new(defaults::EVENT_CHANNEL_CAPACITY)
    }
}
