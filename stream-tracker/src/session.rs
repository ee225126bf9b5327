//! Per-session subscription counters for tracked streamers.
//!
//! A session exists for every tracked streamer. It goes active when the
//! streamer goes live and starts counting subscription events from zero,
//! and its counts are dropped when the streamer goes offline.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::{LiveStream, Streamer, StreamerKey, SubEvent, Tier};
use crate::platform::{LiveStatusProvider, SubEventProvider};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierMetrics {
    pub total: u32,
    pub gifted: u32,
    pub regular: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub all: u32,
    pub gifted: u32,
    pub regular: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionMetrics {
    pub tier1: TierMetrics,
    pub tier2: TierMetrics,
    pub tier3: TierMetrics,
    pub totals: Totals,
}

impl SubscriptionMetrics {
    pub fn record(&mut self, tier: Tier, is_gift: bool) {
        let per_tier = match tier {
            Tier::One => &mut self.tier1,
            Tier::Two => &mut self.tier2,
            Tier::Three => &mut self.tier3,
        };
        per_tier.total += 1;
        self.totals.all += 1;
        if is_gift {
            per_tier.gifted += 1;
            self.totals.gifted += 1;
        } else {
            per_tier.regular += 1;
            self.totals.regular += 1;
        }
    }

    pub fn format(&self, name: &str) -> String {
        format!(
            "{}: {} sub(s) | T1:{} T2:{} T3:{}",
            name, self.totals.all, self.tier1.total, self.tier2.total, self.tier3.total
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSession {
    Inactive,
    Active {
        stream: LiveStream,
        metrics: SubscriptionMetrics,
    },
}

type Sessions = Arc<Mutex<HashMap<StreamerKey, StreamSession>>>;

/// Keeps one [`StreamSession`] per tracked streamer, driven by the
/// notifications of a live status provider and a sub event provider.
pub struct SessionMetricsCoordinator {
    sessions: Sessions,
}

impl SessionMetricsCoordinator {
    pub fn new(live: &dyn LiveStatusProvider, subs: &dyn SubEventProvider) -> Self {
        let sessions: Sessions = Arc::new(Mutex::new(HashMap::new()));

        let s = sessions.clone();
        live.on_start_tracking(Arc::new(move |streamer: &Streamer| {
            s.lock().insert(streamer.key(), StreamSession::Inactive);
            log::debug!("session metrics: created session for {}", streamer.key());
        }));

        let s = sessions.clone();
        live.on_stop_tracking(Arc::new(move |streamer: &Streamer| {
            s.lock().remove(&streamer.key());
            log::debug!("session metrics: removed session for {}", streamer.key());
        }));

        let s = sessions.clone();
        live.on_live(Arc::new(move |stream: &LiveStream| {
            let key = stream.key();
            match s.lock().get_mut(&key) {
                Some(session) => {
                    log::info!("session metrics: {} went live, counting subs", key);
                    *session = StreamSession::Active {
                        stream: stream.clone(),
                        metrics: SubscriptionMetrics::default(),
                    };
                }
                None => log::warn!("session metrics: {} went live but has no session", key),
            }
        }));

        let s = sessions.clone();
        live.on_offline(Arc::new(move |streamer: &Streamer| {
            let key = streamer.key();
            if let Some(session) = s.lock().get_mut(&key) {
                if let StreamSession::Active { metrics, .. } = session {
                    log::info!("session metrics: {}", metrics.format(&streamer.name));
                }
                *session = StreamSession::Inactive;
            }
        }));

        let s = sessions.clone();
        subs.on_sub_event(Arc::new(move |event: &SubEvent| {
            Self::apply(&s, event)
        }));

        SessionMetricsCoordinator { sessions }
    }

    fn apply(sessions: &Mutex<HashMap<StreamerKey, StreamSession>>, event: &SubEvent) {
        let key = event.key();
        let mut sessions = sessions.lock();
        let metrics = match sessions.get_mut(&key) {
            Some(StreamSession::Active { metrics, .. }) => metrics,
            Some(StreamSession::Inactive) => {
                log::debug!("session metrics: {} is offline, ignoring {}", key, event.kind.name());
                return;
            }
            None => {
                log::debug!("session metrics: {} is not tracked, ignoring {}", key, event.kind.name());
                return;
            }
        };

        match event.kind.counted() {
            Some((tier, is_gift)) => metrics.record(tier, is_gift),
            None => log::debug!(
                "session metrics: {} for {} adds no subscriber",
                event.kind.name(),
                key
            ),
        }
    }

    pub fn is_live(&self, streamer: &Streamer) -> bool {
        matches!(
            self.sessions.lock().get(&streamer.key()),
            Some(StreamSession::Active { .. })
        )
    }

    /// Counters of the current session, None unless the streamer is live.
    pub fn session_metrics(&self, streamer: &Streamer) -> Option<SubscriptionMetrics> {
        match self.sessions.lock().get(&streamer.key()) {
            Some(StreamSession::Active { metrics, .. }) => Some(*metrics),
            _ => None,
        }
    }

    /// Every live session, oldest broadcast first.
    pub fn active_sessions(&self) -> Vec<(LiveStream, SubscriptionMetrics)> {
        let sessions = self.sessions.lock();
        let mut active: Vec<_> = sessions
            .values()
            .filter_map(|session| match session {
                StreamSession::Active { stream, metrics } => Some((stream.clone(), *metrics)),
                StreamSession::Inactive => None,
            })
            .collect();
        active.sort_by(|(a, _), (b, _)| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.user_name.cmp(&b.user_name))
        });
        active
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feed::SubEventFeed;
    use crate::model::{Broadcaster, Platform, SubEventKind};
    use crate::tracker::test::{record_events, streamer, Event, FakeStreams};
    use crate::tracker::{PollingTracker, DEFAULT_POLL_INTERVAL};
    use pretty_assertions::assert_eq;

    struct Setup {
        tracker: PollingTracker,
        api: Arc<FakeStreams>,
        feed: SubEventFeed,
        coordinator: SessionMetricsCoordinator,
        events: Arc<Mutex<Vec<Event>>>,
    }

    fn setup() -> Setup {
        let api = Arc::new(FakeStreams::default());
        let tracker = PollingTracker::new(Platform::Twitch, api.clone(), DEFAULT_POLL_INTERVAL);
        let feed = SubEventFeed::new("test feed");
        let coordinator = SessionMetricsCoordinator::new(&tracker, &feed);
        let events = record_events(&tracker);
        Setup {
            tracker,
            api,
            feed,
            coordinator,
            events,
        }
    }

    fn sub_event(name: &str, kind: SubEventKind) -> SubEvent {
        SubEvent {
            platform: Platform::Twitch,
            broadcaster: Broadcaster {
                id: "1".to_string(),
                name: name.to_string(),
            },
            timestamp: time::macros::datetime!(2024-03-01 20:30 UTC),
            kind,
        }
    }

    fn tier1_sub(name: &str) -> SubEvent {
        sub_event(
            name,
            SubEventKind::Sub {
                tier: Tier::One,
                is_prime: false,
            },
        )
    }

    fn assert_consistent(m: &SubscriptionMetrics) {
        assert_eq!(m.totals.all, m.tier1.total + m.tier2.total + m.tier3.total);
        assert_eq!(m.totals.gifted + m.totals.regular, m.totals.all);
        for t in [m.tier1, m.tier2, m.tier3] {
            assert_eq!(t.gifted + t.regular, t.total);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_session_counts_subs() {
        let Setup {
            tracker,
            api,
            feed,
            coordinator,
            events,
        } = setup();
        let foo = streamer("foo", "1");

        tracker.start_tracking(foo.clone()).await.unwrap();
        api.set_live(&foo, "abc");
        tracker.poll_now().await;

        assert_eq!(
            events
                .lock()
                .iter()
                .filter(|e| matches!(e, Event::Live(..)))
                .count(),
            1
        );
        assert!(coordinator.is_live(&foo));
        assert_eq!(
            coordinator.session_metrics(&foo),
            Some(SubscriptionMetrics::default())
        );

        feed.publish(&tier1_sub("foo"));
        let metrics = coordinator.session_metrics(&foo).unwrap();
        assert_eq!(
            metrics,
            SubscriptionMetrics {
                tier1: TierMetrics {
                    total: 1,
                    gifted: 0,
                    regular: 1
                },
                totals: Totals {
                    all: 1,
                    gifted: 0,
                    regular: 1
                },
                ..Default::default()
            }
        );
        assert_eq!(metrics.format("foo"), "foo: 1 sub(s) | T1:1 T2:0 T3:0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_discards_metrics() {
        let Setup {
            tracker,
            api,
            feed,
            coordinator,
            events,
        } = setup();
        let foo = streamer("foo", "1");

        tracker.start_tracking(foo.clone()).await.unwrap();
        api.set_live(&foo, "abc");
        tracker.poll_now().await;
        feed.publish(&tier1_sub("foo"));
        assert_eq!(coordinator.session_metrics(&foo).unwrap().totals.all, 1);

        api.set_offline(&foo);
        tracker.poll_now().await;

        assert_eq!(
            events
                .lock()
                .iter()
                .filter(|e| matches!(e, Event::Offline(_)))
                .count(),
            1
        );
        assert!(!coordinator.is_live(&foo));
        assert_eq!(coordinator.session_metrics(&foo), None);

        // back live: counting restarts from zero
        api.set_live(&foo, "def");
        tracker.poll_now().await;
        assert_eq!(
            coordinator.session_metrics(&foo),
            Some(SubscriptionMetrics::default())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_ignored_unless_live() {
        let Setup {
            tracker,
            api,
            feed,
            coordinator,
            ..
        } = setup();
        let foo = streamer("foo", "1");

        // untracked
        feed.publish(&tier1_sub("foo"));
        assert_eq!(coordinator.session_count(), 0);

        // tracked but offline
        tracker.start_tracking(foo.clone()).await.unwrap();
        feed.publish(&tier1_sub("foo"));
        assert_eq!(coordinator.session_count(), 1);
        assert_eq!(coordinator.session_metrics(&foo), None);

        api.set_live(&foo, "abc");
        tracker.poll_now().await;
        assert_eq!(
            coordinator.session_metrics(&foo),
            Some(SubscriptionMetrics::default()),
            "events received while offline were not kept"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_tracking_removes_session() {
        let Setup {
            tracker,
            api,
            coordinator,
            ..
        } = setup();
        let foo = streamer("foo", "1");

        tracker.start_tracking(foo.clone()).await.unwrap();
        api.set_live(&foo, "abc");
        tracker.poll_now().await;
        assert!(coordinator.is_live(&foo));

        tracker.stop_tracking(&foo).await;
        assert!(!coordinator.is_live(&foo));
        assert_eq!(coordinator.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_match_names_case_insensitively() {
        let Setup {
            tracker,
            api,
            feed,
            coordinator,
            ..
        } = setup();
        let foo = streamer("foo", "1");

        tracker.start_tracking(foo.clone()).await.unwrap();
        api.set_live(&foo, "abc");
        tracker.poll_now().await;

        feed.publish(&tier1_sub("FOO"));
        assert_eq!(coordinator.session_metrics(&foo).unwrap().totals.all, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counting_rules_keep_totals_consistent() {
        let Setup {
            tracker,
            api,
            feed,
            coordinator,
            ..
        } = setup();
        let foo = streamer("foo", "1");
        tracker.start_tracking(foo.clone()).await.unwrap();
        api.set_live(&foo, "abc");
        tracker.poll_now().await;

        let kinds = vec![
            SubEventKind::Sub {
                tier: Tier::One,
                is_prime: true,
            },
            SubEventKind::Resub {
                tier: Tier::Two,
                is_gift: true,
            },
            SubEventKind::Resub {
                tier: Tier::Two,
                is_gift: false,
            },
            SubEventKind::CommunitySubGift {
                tier: Tier::Three,
                total: 2,
            },
            SubEventKind::SubGift { tier: Tier::Three },
            SubEventKind::SubGift { tier: Tier::Three },
            SubEventKind::GiftPaidUpgrade,
            SubEventKind::PrimePaidUpgrade { tier: Tier::One },
        ];
        for kind in kinds {
            feed.publish(&sub_event("foo", kind));
            assert_consistent(&coordinator.session_metrics(&foo).unwrap());
        }

        let m = coordinator.session_metrics(&foo).unwrap();
        assert_eq!(
            m.tier1,
            TierMetrics {
                total: 2,
                gifted: 0,
                regular: 2
            }
        );
        assert_eq!(
            m.tier2,
            TierMetrics {
                total: 2,
                gifted: 1,
                regular: 1
            }
        );
        assert_eq!(
            m.tier3,
            TierMetrics {
                total: 2,
                gifted: 2,
                regular: 0
            }
        );
        assert_eq!(m.format("foo"), "foo: 6 sub(s) | T1:2 T2:2 T3:2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_sessions() {
        let Setup {
            tracker,
            api,
            coordinator,
            ..
        } = setup();
        let foo = streamer("foo", "1");
        let bar = streamer("bar", "2");
        tracker.start_tracking(foo.clone()).await.unwrap();
        tracker.start_tracking(bar.clone()).await.unwrap();

        api.set_live(&foo, "abc");
        api.set_live(&bar, "xyz");
        tracker.poll_now().await;
        api.set_offline(&foo);
        tracker.poll_now().await;

        let active = coordinator.active_sessions();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0.user_name, "bar");
        assert_eq!(active[0].1, SubscriptionMetrics::default());
    }
}
