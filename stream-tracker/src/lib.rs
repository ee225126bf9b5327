pub mod cache;
pub mod error;
pub mod feed;
pub mod manager;
pub mod model;
pub mod mutex;
pub mod platform;
pub mod session;
pub mod tracker;

pub use cache::{ResolvedCache, StreamerResolver};
pub use error::{Result, TrackerError};
pub use feed::SubEventFeed;
pub use manager::LiveStatusManager;
pub use model::{
    Broadcaster, LiveStream, Platform, Streamer, StreamerKey, SubEvent, SubEventKind, Tier,
};
pub use mutex::FairMutex;
pub use platform::{
    Callback, LiveStatusProvider, LiveTracker, StreamsApi, SubEventProvider, SubEventTracker,
    UsersApi,
};
pub use session::{SessionMetricsCoordinator, SubscriptionMetrics};
pub use tracker::PollingTracker;
