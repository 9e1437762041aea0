use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, PropertyId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-property broadcast of store writes, so open views know when to re-fetch.
pub struct ChangeFeed {
    channels: DashMap<PropertyId, broadcast::Sender<Event>>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to writes on a property. Creates the channel if needed.
    pub fn subscribe(&self, property_id: PropertyId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(property_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a write. No-op if nobody is listening.
    pub fn send(&self, property_id: PropertyId, event: &Event) {
        if let Some(sender) = self.channels.get(&property_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
