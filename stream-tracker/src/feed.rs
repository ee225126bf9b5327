use tokio::sync::mpsc;

use crate::model::SubEvent;
use crate::platform::{Callback, Observers, SubEventProvider};

/// Fan-out point for subscription events pushed by a platform.
pub struct SubEventFeed {
    label: String,
    observers: Observers<SubEvent>,
}

impl SubEventFeed {
    pub fn new<S: Into<String>>(label: S) -> Self {
        SubEventFeed {
            label: label.into(),
            observers: Observers::default(),
        }
    }

    pub fn publish(&self, event: &SubEvent) {
        log::debug!(
            "{}: {} event for {}",
            self.label,
            event.kind.name(),
            event.broadcaster.name
        );
        self.observers.notify(event);
    }

    /// Deliver every event of the channel, one at a time, until all
    /// senders are gone.
    pub async fn forward(&self, mut events: mpsc::Receiver<SubEvent>) {
        while let Some(event) = events.recv().await {
            self.publish(&event);
        }
        log::info!("{}: event source closed", self.label);
    }
}

impl SubEventProvider for SubEventFeed {
    fn on_sub_event(&self, callback: Callback<SubEvent>) {
        self.observers.subscribe(callback);
    }
}
