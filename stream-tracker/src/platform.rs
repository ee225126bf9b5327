//! Seams between the core and the outside world: the platform capabilities
//! the core calls, and the notification streams it exposes.
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::model::{LiveStream, Platform, Streamer, SubEvent};

pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Batch query of the live streams for the given streamer ids.
/// All or nothing: an error means nothing is known about any of them.
#[async_trait]
pub trait StreamsApi: Send + Sync {
    async fn live_streams(&self, streamer_ids: &[String]) -> anyhow::Result<Vec<LiveStream>>;
}

/// Batch resolution of login names into streamer records.
/// Unknown names are simply absent from the result.
#[async_trait]
pub trait UsersApi: Send + Sync {
    async fn resolve_streamers(&self, names: &[String]) -> anyhow::Result<Vec<Streamer>>;
}

pub trait LiveStatusProvider {
    fn on_live(&self, callback: Callback<LiveStream>);
    fn on_offline(&self, callback: Callback<Streamer>);
    fn on_start_tracking(&self, callback: Callback<Streamer>);
    fn on_stop_tracking(&self, callback: Callback<Streamer>);
}

pub trait SubEventProvider {
    fn on_sub_event(&self, callback: Callback<SubEvent>);
}

/// Live status tracking for a single platform.
#[async_trait]
pub trait LiveTracker: LiveStatusProvider + Send + Sync {
    fn platform(&self) -> Platform;
    async fn start_tracking(&self, streamer: Streamer) -> Result<()>;
    /// Returns false if the streamer wasn't tracked.
    async fn stop_tracking(&self, streamer: &Streamer) -> Result<bool>;
    async fn tracked_streamers(&self) -> Vec<Streamer>;
    async fn is_tracking(&self, streamer: &Streamer) -> bool;
    /// No poll starts once this returns, and none is still running.
    async fn stop(&self);
}

/// Start and stop the delivery of subscription events for a streamer.
#[async_trait]
pub trait SubEventTracker: Send + Sync {
    async fn start_tracking(&self, streamer: &Streamer) -> Result<()>;
    async fn stop_tracking(&self, streamer: &Streamer) -> Result<bool>;
}

/// Ordered list of callbacks for one kind of notification.
/// Callbacks run synchronously and must not subscribe from inside a notification.
pub struct Observers<T> {
    callbacks: RwLock<Vec<Callback<T>>>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Observers {
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Observers<T> {
    pub fn subscribe(&self, callback: Callback<T>) {
        self.callbacks.write().push(callback);
    }

    pub fn notify(&self, value: &T) {
        for callback in self.callbacks.read().iter() {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
