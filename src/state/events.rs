use tokio::sync::broadcast;

use crate::dto::notifications::MatchNotification;

/// Simple broadcast hub fanning match notifications out to subscribers.
#[derive(Debug)]
pub struct NotificationHub {
    sender: broadcast::Sender<MatchNotification>,
}

impl NotificationHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<MatchNotification> {
        self.sender.subscribe()
    }

    /// Send a notification to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, notification: MatchNotification) {
        let _ = self.sender.send(notification);
    }
}
