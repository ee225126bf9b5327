use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Result, TrackerError};
use crate::model::{LiveStream, Platform, Streamer};
use crate::mutex::FairMutex;
use crate::platform::{Callback, LiveStatusProvider, LiveTracker, Observers, StreamsApi};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const STOP_WAIT_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct PollState {
    streamer: Streamer,
    /// id of the broadcast we last announced, None while offline
    current_stream_id: Option<String>,
}

enum Notification {
    Live(LiveStream),
    Offline(Streamer),
}

struct Inner {
    platform: Platform,
    label: String,
    api: Arc<dyn StreamsApi>,
    interval: Duration,

    // serializes start/stop/queries/polls against each other
    mutex: FairMutex,
    // insertion ordered, notifications follow that order
    tracked: Mutex<Vec<PollState>>,

    is_polling: AtomicBool,
    // set for good by `stop`, no schedule starts afterwards
    stopped: AtomicBool,
    schedule: Mutex<Option<JoinHandle<()>>>,

    live: Observers<LiveStream>,
    offline: Observers<Streamer>,
    start_tracking: Observers<Streamer>,
    stop_tracking: Observers<Streamer>,
}

/// Polls a platform for the live status of every tracked streamer and
/// turns the differences between two polls into notifications.
///
/// Polling runs only while at least one streamer is tracked. Cloning gives
/// another handle on the same tracker.
#[derive(Clone)]
pub struct PollingTracker {
    inner: Arc<Inner>,
}

impl PollingTracker {
    /// A zero interval falls back to `DEFAULT_POLL_INTERVAL`.
    pub fn new(platform: Platform, api: Arc<dyn StreamsApi>, interval: Duration) -> Self {
        let label = format!("{} live tracker", platform);
        let interval = if interval.is_zero() {
            log::warn!(
                "{}: Invalid poll interval of 0, using {:?}",
                label,
                DEFAULT_POLL_INTERVAL
            );
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };
        log::debug!(
            "{}: polling every {:?}, slow polls delay the following ones",
            label,
            interval
        );
        PollingTracker {
            inner: Arc::new(Inner {
                platform,
                mutex: FairMutex::new(format!("{}-poll-livetrkr", platform)),
                label,
                api,
                interval,
                tracked: Mutex::new(Vec::new()),
                is_polling: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                schedule: Mutex::new(None),
                live: Observers::default(),
                offline: Observers::default(),
                start_tracking: Observers::default(),
                stop_tracking: Observers::default(),
            }),
        }
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    pub async fn start_tracking(&self, streamer: Streamer) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.mutex.lock().await;

        if streamer.platform != inner.platform {
            return Err(TrackerError::WrongPlatform {
                expected: inner.platform,
                got: streamer.platform,
            });
        }

        let first = {
            let mut tracked = inner.tracked.lock();
            if tracked.iter().any(|s| s.streamer.id == streamer.id) {
                return Err(TrackerError::AlreadyTracked(streamer.name));
            }
            tracked.push(PollState {
                streamer: streamer.clone(),
                current_stream_id: None,
            });
            tracked.len() == 1
        };

        log::info!(
            "{}: Started tracking '{}' (ID: {})",
            inner.label,
            streamer.name,
            streamer.id
        );
        inner.start_tracking.notify(&streamer);

        if first {
            self.start_polling();
        }
        Ok(())
    }

    /// Returns false, without notifying anyone, if the streamer wasn't tracked.
    pub async fn stop_tracking(&self, streamer: &Streamer) -> bool {
        let inner = &self.inner;
        let _guard = inner.mutex.lock().await;

        let removed = {
            let mut tracked = inner.tracked.lock();
            tracked
                .iter()
                .position(|s| s.streamer.id == streamer.id)
                .map(|idx| (tracked.remove(idx).streamer, tracked.is_empty()))
        };

        match removed {
            None => {
                log::info!("{}: Was not tracking '{}'", inner.label, streamer.name);
                false
            }
            Some((removed, now_empty)) => {
                log::info!("{}: Stopped tracking '{}'", inner.label, removed.name);
                inner.stop_tracking.notify(&removed);
                if now_empty {
                    self.stop_polling();
                }
                true
            }
        }
    }

    pub async fn tracked_streamers(&self) -> Vec<Streamer> {
        let _guard = self.inner.mutex.lock().await;
        let tracked = self.inner.tracked.lock();
        tracked.iter().map(|s| s.streamer.clone()).collect()
    }

    pub async fn is_tracking(&self, streamer: &Streamer) -> bool {
        let _guard = self.inner.mutex.lock().await;
        let tracked = self.inner.tracked.lock();
        tracked.iter().any(|s| s.streamer.id == streamer.id)
    }

    /// The id of the broadcast last seen for this streamer, None if offline.
    pub async fn live_stream_id(&self, streamer: &Streamer) -> Result<Option<String>> {
        let _guard = self.inner.mutex.lock().await;
        let tracked = self.inner.tracked.lock();
        tracked
            .iter()
            .find(|s| s.streamer.id == streamer.id)
            .map(|s| s.current_stream_id.clone())
            .ok_or_else(|| TrackerError::NotTracked(streamer.name.clone()))
    }

    pub fn on_live(&self, callback: Callback<LiveStream>) {
        self.inner.live.subscribe(callback);
    }

    pub fn on_offline(&self, callback: Callback<Streamer>) {
        self.inner.offline.subscribe(callback);
    }

    pub fn on_start_tracking(&self, callback: Callback<Streamer>) {
        self.inner.start_tracking.subscribe(callback);
    }

    pub fn on_stop_tracking(&self, callback: Callback<Streamer>) {
        self.inner.stop_tracking.subscribe(callback);
    }

    /// Cancel the schedule, then wait for a poll that is already running.
    /// No notification fires once this returns, and tracking more streamers
    /// afterwards doesn't restart polling.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let handle = {
            // flag and schedule change together, see start_polling
            let mut schedule = inner.schedule.lock();
            inner.stopped.store(true, Ordering::SeqCst);
            schedule.take()
        };
        match handle {
            None => log::warn!("{}: Already stopped...", inner.label),
            Some(handle) => {
                log::info!("{}: Stopping...", inner.label);
                handle.abort();
            }
        }

        if inner.is_polling.load(Ordering::SeqCst) {
            log::info!(
                "{}: Waiting for outbound polls to finish before stopping...",
                inner.label
            );
            while inner.is_polling.load(Ordering::SeqCst) {
                tokio::time::sleep(STOP_WAIT_STEP).await;
            }
        }
        log::info!("{}: Stopped", inner.label);
    }

    /// Run one poll cycle right away, waiting for the lock like a scheduled one.
    pub async fn poll_now(&self) {
        self.inner.poll().await
    }

    fn start_polling(&self) {
        let inner = &self.inner;
        let mut schedule = inner.schedule.lock();
        if inner.stopped.load(Ordering::SeqCst) {
            log::warn!("{}: Stopped, not polling", inner.label);
            return;
        }
        if schedule.is_some() {
            log::warn!("{}: Already running...", inner.label);
            return;
        }
        log::info!("{}: Starting...", inner.label);

        let weak: Weak<Inner> = Arc::downgrade(inner);
        let period = inner.interval;
        *schedule = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // the first tick completes immediately
                ticks.tick().await;
                match weak.upgrade() {
                    Some(inner) => Inner::on_tick(inner),
                    None => break,
                }
            }
        }));
        log::info!("{}: Running", inner.label);
    }

    fn stop_polling(&self) {
        let inner = &self.inner;
        match inner.schedule.lock().take() {
            None => log::warn!("{}: Already stopped...", inner.label),
            Some(handle) => {
                log::info!("{}: Stopping...", inner.label);
                handle.abort();
                log::info!("{}: Stopped", inner.label);
            }
        }
    }
}

/// Clears the in-flight flag even if a callback panics mid-poll.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Inner {
    fn on_tick(inner: Arc<Inner>) {
        if inner
            .is_polling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!(
                "{}: Previous poll has not finished. Consider adjusting poll interval.",
                inner.label
            );
            return;
        }

        tokio::spawn(async move {
            let _in_flight = InFlight(&inner.is_polling);
            inner.poll().await;
        });
    }

    async fn poll(&self) {
        let _guard = self.mutex.lock().await;
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let ids: Vec<String> = {
            let tracked = self.tracked.lock();
            tracked.iter().map(|s| s.streamer.id.clone()).collect()
        };
        if ids.is_empty() {
            return;
        }

        let streams = match self.api.live_streams(&ids).await {
            Ok(streams) => streams,
            Err(err) => {
                // no information this cycle, keep what we know
                log::error!("{}: Error polling {}: {:?}", self.label, self.platform, err);
                return;
            }
        };

        for notification in self.process_status_updates(streams) {
            match notification {
                Notification::Live(stream) => self.live.notify(&stream),
                Notification::Offline(streamer) => self.offline.notify(&streamer),
            }
        }
    }

    fn process_status_updates(&self, streams: Vec<LiveStream>) -> Vec<Notification> {
        let mut current: HashMap<String, LiveStream> = streams
            .into_iter()
            .map(|s| (s.user_id.clone(), s))
            .collect();

        let mut tracked = self.tracked.lock();
        let mut notifications = Vec::new();
        for state in tracked.iter_mut() {
            match current.remove(&state.streamer.id) {
                None => {
                    if state.current_stream_id.take().is_some() {
                        log::info!("{}: {} is offline", self.label, state.streamer.name);
                        notifications.push(Notification::Offline(state.streamer.clone()));
                    }
                }
                Some(stream) => {
                    // the same broadcast is only announced once
                    if state.current_stream_id.as_deref() != Some(stream.id.as_str()) {
                        log::info!(
                            "{}: {} is live (stream {})",
                            self.label,
                            state.streamer.name,
                            stream.id
                        );
                        state.current_stream_id = Some(stream.id.clone());
                        notifications.push(Notification::Live(stream));
                    }
                }
            }
        }
        notifications
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.schedule.get_mut().take() {
            handle.abort();
        }
    }
}

impl LiveStatusProvider for PollingTracker {
    fn on_live(&self, callback: Callback<LiveStream>) {
        PollingTracker::on_live(self, callback)
    }

    fn on_offline(&self, callback: Callback<Streamer>) {
        PollingTracker::on_offline(self, callback)
    }

    fn on_start_tracking(&self, callback: Callback<Streamer>) {
        PollingTracker::on_start_tracking(self, callback)
    }

    fn on_stop_tracking(&self, callback: Callback<Streamer>) {
        PollingTracker::on_stop_tracking(self, callback)
    }
}

#[async_trait]
impl LiveTracker for PollingTracker {
    fn platform(&self) -> Platform {
        self.inner.platform
    }

    async fn start_tracking(&self, streamer: Streamer) -> Result<()> {
        PollingTracker::start_tracking(self, streamer).await
    }

    async fn stop_tracking(&self, streamer: &Streamer) -> Result<bool> {
        Ok(PollingTracker::stop_tracking(self, streamer).await)
    }

    async fn tracked_streamers(&self) -> Vec<Streamer> {
        PollingTracker::tracked_streamers(self).await
    }

    async fn is_tracking(&self, streamer: &Streamer) -> bool {
        PollingTracker::is_tracking(self, streamer).await
    }

    async fn stop(&self) {
        PollingTracker::stop(self).await
    }
}
