use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use irc::client::prelude::Command;
use irc::proto::Message as IrcMessage;
use parking_lot::Mutex;
use plugin_core::{Error, Plugin, Result};
use stream_tracker::{
    cache::DEFAULT_TTL, LiveStatusManager, LiveStatusProvider, LiveStream, LiveTracker, Platform,
    PollingTracker, SessionMetricsCoordinator, Streamer, StreamerResolver, SubEvent,
    SubEventFeed, SubEventTracker,
};
use tokio::sync::{mpsc, watch};

use crate::commands::{self, Directive, TwitchCommands};
use crate::config::Config;
use crate::helix::HelixApi;
use crate::sub_tracker::TwitchSubEventTracker;
use crate::webhook_server;

/// Receiving ends consumed by `run`
struct Channels {
    announcements: mpsc::UnboundedReceiver<String>,
    sub_events: mpsc::Receiver<SubEvent>,
}

pub struct Twitch {
    config: Config,
    live: Arc<LiveStatusManager>,
    feed: Arc<SubEventFeed>,
    sub_tracker: Arc<TwitchSubEventTracker>,
    commands: TwitchCommands,

    sub_events_tx: mpsc::Sender<SubEvent>,
    channels: Mutex<Option<Channels>>,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl Plugin for Twitch {
    async fn init(config_path: &str) -> Result<Self> {
        let config = Config::from_file_keyed(config_path)
            .with_context(|| format!("Cannot read twitch config from {}", config_path))?;
        let helix = Arc::new(HelixApi::new(&config).await?);

        let tracker = PollingTracker::new(Platform::Twitch, helix.clone(), config.poll_interval());
        let live = Arc::new(LiveStatusManager::new([
            Arc::new(tracker) as Arc<dyn LiveTracker>
        ]));
        let feed = Arc::new(SubEventFeed::new("twitch sub events"));

        // announcements go first: the offline one is sent before the
        // session metrics are dropped
        let (announce_tx, announcements) = mpsc::unbounded_channel();
        let tx = announce_tx.clone();
        live.on_live(Arc::new(move |stream: &LiveStream| {
            let _ = tx.send(commands::live_announcement(stream));
        }));
        live.on_offline(Arc::new(move |streamer: &Streamer| {
            let _ = announce_tx.send(commands::offline_announcement(streamer));
        }));

        let sessions = Arc::new(SessionMetricsCoordinator::new(&*live, &*feed));
        let sub_tracker = Arc::new(TwitchSubEventTracker::new(helix.clone()));
        let commands = TwitchCommands::new(
            HashMap::from([(
                Platform::Twitch,
                StreamerResolver::new("twitch resolver", helix, DEFAULT_TTL),
            )]),
            live.clone(),
            HashMap::from([(
                Platform::Twitch,
                sub_tracker.clone() as Arc<dyn SubEventTracker>,
            )]),
            sessions,
            config.admins.clone(),
        );

        let (sub_events_tx, sub_events) = mpsc::channel(50);
        let (shutdown, _) = watch::channel(false);
        Ok(Twitch {
            config,
            live,
            feed,
            sub_tracker,
            commands,
            sub_events_tx,
            channels: Mutex::new(Some(Channels {
                announcements,
                sub_events,
            })),
            shutdown,
        })
    }

    fn get_name(&self) -> &'static str {
        "twitch"
    }

    async fn run(&self, bot_chan: mpsc::Sender<IrcMessage>) -> Result<()> {
        let Channels {
            mut announcements,
            sub_events,
        } = self
            .channels
            .lock()
            .take()
            .ok_or_else(|| Error::Synthetic("twitch plugin is already running".to_string()))?;

        let mut stop_announcing = self.shutdown.subscribe();
        let mut stop_server = self.shutdown.subscribe();
        let mut stop_feed = self.shutdown.subscribe();

        let announce = async {
            loop {
                tokio::select! {
                    msg = announcements.recv() => match msg {
                        Some(msg) => {
                            let chan = &self.config.announce_channel;
                            bot_chan
                                .send(Command::PRIVMSG(chan.clone(), msg).into())
                                .await
                                .with_context(|| format!("can't send message to {}", chan))?;
                        }
                        None => break,
                    },
                    _ = stop_announcing.changed() => break,
                }
            }
            Ok::<(), anyhow::Error>(())
        };

        let server = webhook_server::run(
            &self.config.webhook_bind,
            self.config.webhook_port,
            &self.config.app_secret.0,
            self.sub_events_tx.clone(),
            async move {
                let _ = stop_server.changed().await;
            },
        );

        let forward = async {
            tokio::select! {
                _ = self.feed.forward(sub_events) => (),
                _ = stop_feed.changed() => (),
            }
            Ok::<(), anyhow::Error>(())
        };

        let startup = async {
            if !self.config.tracked_streamers.is_empty() {
                let names: Vec<&str> = self
                    .config
                    .tracked_streamers
                    .iter()
                    .map(|s| s.as_str())
                    .collect();
                let outcome = self.commands.track(Directive::Start, &names, None).await;
                log::info!("Initial tracking: {}", outcome);
            }
            Ok::<(), anyhow::Error>(())
        };

        tokio::try_join!(announce, server, forward, startup)?;
        log::info!("twitch plugin stopped");
        Ok(())
    }

    async fn in_message(&self, msg: &IrcMessage) -> Result<Option<IrcMessage>> {
        let response_target = match msg.response_target() {
            None => return Ok(None),
            Some(target) => target,
        };

        if let Command::PRIVMSG(_source, privmsg) = &msg.command {
            if let Some(reply) = self.commands.handle(msg.source_nickname(), privmsg).await {
                return Ok(Some(
                    Command::PRIVMSG(response_target.to_string(), reply).into(),
                ));
            }
        }
        Ok(None)
    }

    async fn shutdown(&self) {
        log::info!("Shutting down the twitch plugin");
        let _ = self.shutdown.send(true);
        self.live.stop().await;
        self.sub_tracker.stop().await;
    }
}
