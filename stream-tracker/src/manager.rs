use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, TrackerError};
use crate::model::{LiveStream, Platform, Streamer};
use crate::platform::{Callback, LiveStatusProvider, LiveTracker};

/// Routes tracking requests to the tracker of the streamer's platform.
pub struct LiveStatusManager {
    trackers: HashMap<Platform, Arc<dyn LiveTracker>>,
}

impl LiveStatusManager {
    pub fn new<I>(trackers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn LiveTracker>>,
    {
        let trackers = trackers.into_iter().map(|t| (t.platform(), t)).collect();
        LiveStatusManager { trackers }
    }

    fn tracker(&self, platform: Platform) -> Result<&Arc<dyn LiveTracker>> {
        self.trackers
            .get(&platform)
            .ok_or_else(|| TrackerError::UnsupportedPlatform(platform.to_string()))
    }

    /// Platforms with a tracker, in a stable order.
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.trackers.contains_key(p))
            .collect()
    }

    pub async fn start_tracking(&self, streamer: Streamer) -> Result<()> {
        self.tracker(streamer.platform)?.start_tracking(streamer).await
    }

    pub async fn stop_tracking(&self, streamer: &Streamer) -> Result<bool> {
        self.tracker(streamer.platform)?.stop_tracking(streamer).await
    }

    pub async fn tracked_streamers(&self) -> Vec<Streamer> {
        let mut all = Vec::new();
        for platform in self.platforms() {
            all.extend(self.streamers_by_platform(platform).await);
        }
        all
    }

    pub async fn streamers_by_platform(&self, platform: Platform) -> Vec<Streamer> {
        match self.trackers.get(&platform) {
            Some(tracker) => tracker.tracked_streamers().await,
            None => Vec::new(),
        }
    }

    pub async fn is_streamer_tracked(&self, streamer: &Streamer) -> bool {
        match self.trackers.get(&streamer.platform) {
            Some(tracker) => tracker.is_tracking(streamer).await,
            None => false,
        }
    }

    pub async fn stop(&self) {
        for tracker in self.trackers.values() {
            tracker.stop().await;
        }
    }
}

impl LiveStatusProvider for LiveStatusManager {
    fn on_live(&self, callback: Callback<LiveStream>) {
        for tracker in self.trackers.values() {
            tracker.on_live(callback.clone());
        }
    }

    fn on_offline(&self, callback: Callback<Streamer>) {
        for tracker in self.trackers.values() {
            tracker.on_offline(callback.clone());
        }
    }

    fn on_start_tracking(&self, callback: Callback<Streamer>) {
        for tracker in self.trackers.values() {
            tracker.on_start_tracking(callback.clone());
        }
    }

    fn on_stop_tracking(&self, callback: Callback<Streamer>) {
        for tracker in self.trackers.values() {
            tracker.on_stop_tracking(callback.clone());
        }
    }
}
