use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use stream_tracker::{FairMutex, Platform, Streamer, SubEventTracker, TrackerError};

/// Creation and deletion of `channel.chat.notification` eventsub subscriptions.
#[async_trait]
pub trait ChatNotificationSubscriptions: Send + Sync {
    /// Returns the id of the subscription. If one already exists for
    /// this broadcaster, its id is returned instead.
    async fn subscribe(&self, broadcaster_id: &str) -> anyhow::Result<String>;
    async fn unsubscribe(&self, subscription_id: &str) -> anyhow::Result<()>;
}

/// Keeps one chat notification subscription per tracked streamer, which
/// gets the sub events of that channel delivered to the webhook.
pub struct TwitchSubEventTracker {
    label: String,
    api: Arc<dyn ChatNotificationSubscriptions>,
    mutex: FairMutex,
    /// streamer id -> eventsub subscription id
    subscriptions: Mutex<HashMap<String, String>>,
}

impl TwitchSubEventTracker {
    pub fn new(api: Arc<dyn ChatNotificationSubscriptions>) -> Self {
        TwitchSubEventTracker {
            label: "twitch sub tracker".to_string(),
            api,
            mutex: FairMutex::new("twitch-sub-evttrkr"),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn start_tracking(&self, streamer: &Streamer) -> stream_tracker::Result<()> {
        let _guard = self.mutex.lock().await;
        if streamer.platform != Platform::Twitch {
            return Err(TrackerError::WrongPlatform {
                expected: Platform::Twitch,
                got: streamer.platform,
            });
        }
        if self.subscriptions.lock().contains_key(&streamer.id) {
            return Err(TrackerError::AlreadyTracked(streamer.name.clone()));
        }

        let sub_id = self.api.subscribe(&streamer.id).await.map_err(|err| {
            log::error!(
                "{}: cannot subscribe to chat notifications of {}: {:?}",
                self.label,
                streamer.name,
                err
            );
            TrackerError::Upstream(err)
        })?;
        log::info!(
            "{}: Started tracking '{}' (subscription {})",
            self.label,
            streamer.name,
            sub_id
        );
        self.subscriptions.lock().insert(streamer.id.clone(), sub_id);
        Ok(())
    }

    pub async fn stop_tracking(&self, streamer: &Streamer) -> stream_tracker::Result<bool> {
        let _guard = self.mutex.lock().await;
        let sub_id = match self.subscriptions.lock().get(&streamer.id) {
            Some(id) => id.clone(),
            None => {
                log::info!("{}: Was not tracking '{}'", self.label, streamer.name);
                return Ok(false);
            }
        };

        self.api.unsubscribe(&sub_id).await.map_err(|err| {
            log::error!(
                "{}: cannot delete subscription {} of {}: {:?}",
                self.label,
                sub_id,
                streamer.name,
                err
            );
            TrackerError::Upstream(err)
        })?;
        self.subscriptions.lock().remove(&streamer.id);
        log::info!("{}: Stopped tracking '{}'", self.label, streamer.name);
        Ok(true)
    }

    pub fn is_tracking(&self, streamer: &Streamer) -> bool {
        self.subscriptions.lock().contains_key(&streamer.id)
    }

    /// Delete every subscription, keeping going when one fails.
    pub async fn stop(&self) {
        let _guard = self.mutex.lock().await;
        let subs: Vec<(String, String)> = self.subscriptions.lock().drain().collect();
        for (streamer_id, sub_id) in subs {
            if let Err(err) = self.api.unsubscribe(&sub_id).await {
                log::warn!(
                    "{}: cannot delete subscription {} for streamer id {}: {:?}",
                    self.label,
                    sub_id,
                    streamer_id,
                    err
                );
            }
        }
        log::info!("{}: Stopped", self.label);
    }
}

#[async_trait]
impl SubEventTracker for TwitchSubEventTracker {
    async fn start_tracking(&self, streamer: &Streamer) -> stream_tracker::Result<()> {
        TwitchSubEventTracker::start_tracking(self, streamer).await
    }

    async fn stop_tracking(&self, streamer: &Streamer) -> stream_tracker::Result<bool> {
        TwitchSubEventTracker::stop_tracking(self, streamer).await
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    pub(crate) struct FakeSubscriptions {
        pub(crate) live: Mutex<HashMap<String, String>>,
        pub(crate) fail: AtomicBool,
    }

    #[async_trait]
    impl ChatNotificationSubscriptions for FakeSubscriptions {
        async fn subscribe(&self, broadcaster_id: &str) -> anyhow::Result<String> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("403 Forbidden");
            }
            let id = format!("sub-{broadcaster_id}");
            self.live.lock().insert(id.clone(), broadcaster_id.to_string());
            Ok(id)
        }

        async fn unsubscribe(&self, subscription_id: &str) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("403 Forbidden");
            }
            self.live.lock().remove(subscription_id);
            Ok(())
        }
    }

    fn streamer(name: &str, id: &str) -> Streamer {
        Streamer {
            platform: Platform::Twitch,
            id: id.to_string(),
            name: name.to_string(),
            display_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscribes_once_per_streamer() {
        let api = Arc::new(FakeSubscriptions::default());
        let tracker = TwitchSubEventTracker::new(api.clone());
        let foo = streamer("foo", "1");

        tracker.start_tracking(&foo).await.unwrap();
        assert!(tracker.is_tracking(&foo));
        assert!(matches!(
            tracker.start_tracking(&foo).await,
            Err(TrackerError::AlreadyTracked(_))
        ));
        assert_eq!(api.live.lock().len(), 1);

        assert!(tracker.stop_tracking(&foo).await.unwrap());
        assert!(!tracker.stop_tracking(&foo).await.unwrap(), "already stopped");
        assert!(api.live.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_subscription_is_not_tracked() {
        let api = Arc::new(FakeSubscriptions::default());
        api.fail.store(true, Ordering::SeqCst);
        let tracker = TwitchSubEventTracker::new(api.clone());
        let foo = streamer("foo", "1");

        assert!(matches!(
            tracker.start_tracking(&foo).await,
            Err(TrackerError::Upstream(_))
        ));
        assert!(!tracker.is_tracking(&foo));
    }

    #[tokio::test]
    async fn test_stop_deletes_everything() {
        let api = Arc::new(FakeSubscriptions::default());
        let tracker = TwitchSubEventTracker::new(api.clone());
        tracker.start_tracking(&streamer("foo", "1")).await.unwrap();
        tracker.start_tracking(&streamer("bar", "2")).await.unwrap();

        tracker.stop().await;
        assert!(api.live.lock().is_empty());
        assert!(!tracker.is_tracking(&streamer("foo", "1")));
    }
}
