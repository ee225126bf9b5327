use std::collections::HashMap;
use std::sync::Arc;

use plugin_core::parser;
use stream_tracker::{
    LiveStatusManager, LiveStream, Platform, SessionMetricsCoordinator, Streamer,
    StreamerResolver, SubEventTracker, SubscriptionMetrics, TrackerError,
};

const TRACK_USAGE: &str = "Usage: track {start|stop} <name>[,<name>...] [<platform>]";
const SUBS_USAGE: &str = "Usage: subs <name> [<platform>]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Start,
    Stop,
}

impl Directive {
    fn as_str(&self) -> &'static str {
        match self {
            Directive::Start => "start",
            Directive::Stop => "stop",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TwitchCmd<'input> {
    Track {
        directive: Directive,
        names: Vec<&'input str>,
        platform: Option<&'input str>,
    },
    TrackUsage,
    Subs {
        name: &'input str,
        platform: Option<&'input str>,
    },
    SubsUsage,
    Streams(Option<&'input str>),
}

pub fn parse_command(input: &str) -> Option<TwitchCmd<'_>> {
    if let Some(target) = parser::single_command("streams", input) {
        return Some(TwitchCmd::Streams(target));
    }

    if let Some(args) = parser::command_args("track", input) {
        let directive = match args.first() {
            Some(&"start") => Directive::Start,
            Some(&"stop") => Directive::Stop,
            _ => return Some(TwitchCmd::TrackUsage),
        };
        let cmd = match args[1..] {
            [names] => (names, None),
            [names, platform] => (names, Some(platform)),
            _ => return Some(TwitchCmd::TrackUsage),
        };
        let names: Vec<&str> = cmd.0.split(',').filter(|n| !n.is_empty()).collect();
        if names.is_empty() {
            return Some(TwitchCmd::TrackUsage);
        }
        return Some(TwitchCmd::Track {
            directive,
            names,
            platform: cmd.1,
        });
    }

    if let Some(args) = parser::command_args("subs", input) {
        return Some(match args[..] {
            [name] => TwitchCmd::Subs {
                name,
                platform: None,
            },
            [name, platform] => TwitchCmd::Subs {
                name,
                platform: Some(platform),
            },
            _ => TwitchCmd::SubsUsage,
        });
    }

    None
}

/// Replies to the chat commands, on top of the live status manager,
/// the sub event trackers and the session metrics.
pub struct TwitchCommands {
    resolvers: HashMap<Platform, StreamerResolver>,
    live: Arc<LiveStatusManager>,
    subs: HashMap<Platform, Arc<dyn SubEventTracker>>,
    sessions: Arc<SessionMetricsCoordinator>,
    admins: Vec<String>,
}

impl TwitchCommands {
    pub fn new(
        resolvers: HashMap<Platform, StreamerResolver>,
        live: Arc<LiveStatusManager>,
        subs: HashMap<Platform, Arc<dyn SubEventTracker>>,
        sessions: Arc<SessionMetricsCoordinator>,
        admins: Vec<String>,
    ) -> Self {
        TwitchCommands {
            resolvers,
            live,
            subs,
            sessions,
            admins,
        }
    }

    /// Returns the reply, or None if the message isn't one of our commands.
    pub async fn handle(&self, source: Option<&str>, msg: &str) -> Option<String> {
        let cmd = parse_command(msg)?;
        log::debug!("twitch command from {:?}: {:?}", source, cmd);

        let reply = match cmd {
            TwitchCmd::Track {
                directive,
                names,
                platform,
            } => {
                let is_admin = source
                    .map(|s| self.admins.iter().any(|a| a.eq_ignore_ascii_case(s)))
                    .unwrap_or(false);
                if is_admin {
                    self.track(directive, &names, platform).await
                } else {
                    "Only admins can change the tracked streamers".to_string()
                }
            }
            TwitchCmd::TrackUsage => TRACK_USAGE.to_string(),
            TwitchCmd::Subs { name, platform } => self.subs(name, platform).await,
            TwitchCmd::SubsUsage => SUBS_USAGE.to_string(),
            TwitchCmd::Streams(target) => self.streams(target),
        };
        Some(reply)
    }

    fn platform(&self, raw: Option<&str>) -> Result<Platform, String> {
        let unsupported = || {
            let supported: Vec<String> =
                self.live.platforms().iter().map(|p| p.to_string()).collect();
            format!(
                "Unsupported platform. Supported platforms: {}",
                supported.join(", ")
            )
        };
        let platform: Platform = raw
            .unwrap_or(Platform::Twitch.as_str())
            .parse()
            .map_err(|_| unsupported())?;
        if self.resolvers.contains_key(&platform) && self.live.platforms().contains(&platform) {
            Ok(platform)
        } else {
            Err(unsupported())
        }
    }

    /// Start or stop tracking the given names, live status and sub events.
    pub async fn track(
        &self,
        directive: Directive,
        names: &[&str],
        platform: Option<&str>,
    ) -> String {
        let platform = match self.platform(platform) {
            Ok(p) => p,
            Err(msg) => return msg,
        };
        let resolver = match self.resolvers.get(&platform) {
            Some(r) => r,
            None => return format!("Unsupported platform {}", platform),
        };

        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.to_lowercase();
            if !unique.contains(&name) {
                unique.push(name);
            }
        }

        let resolved = match resolver.resolve(&unique).await {
            Ok(r) => r,
            Err(err) => {
                return format!(
                    "Failed to {} tracking for some users: {}",
                    directive.as_str(),
                    err
                )
            }
        };

        let mut done = Vec::new();
        let mut errors = Vec::new();
        for (name, streamer) in unique.iter().zip(resolved) {
            let streamer = match streamer {
                Some(s) => s,
                None => {
                    errors.push(format!("Unknown user '{}' for platform '{}'", name, platform));
                    continue;
                }
            };
            let res = match directive {
                Directive::Start => self.start_one(streamer.clone()).await,
                Directive::Stop => self.stop_one(&streamer).await,
            };
            match res {
                Ok(()) => done.push(streamer.name),
                Err(err) => errors.push(err.to_string()),
            }
        }

        let mut reply = Vec::new();
        if !done.is_empty() {
            let verb = match directive {
                Directive::Start => "Now tracking",
                Directive::Stop => "Stopped tracking",
            };
            reply.push(format!("{} user(s): {} on {}", verb, done.join(", "), platform));
        }
        if !errors.is_empty() {
            reply.push(format!(
                "Failed to {} tracking for some users: {}",
                directive.as_str(),
                errors.join("; ")
            ));
        }
        reply.join(" | ")
    }

    async fn start_one(&self, streamer: Streamer) -> stream_tracker::Result<()> {
        self.live.start_tracking(streamer.clone()).await?;
        if let Some(subs) = self.subs.get(&streamer.platform) {
            match subs.start_tracking(&streamer).await {
                Ok(()) | Err(TrackerError::AlreadyTracked(_)) => (),
                Err(err) => {
                    // sub counting is optional, the live status still works
                    log::error!("Cannot track sub events for {}: {}", streamer.name, err);
                }
            }
        }
        Ok(())
    }

    async fn stop_one(&self, streamer: &Streamer) -> stream_tracker::Result<()> {
        if let Some(subs) = self.subs.get(&streamer.platform) {
            if let Err(err) = subs.stop_tracking(streamer).await {
                log::error!("Cannot stop sub events for {}: {}", streamer.name, err);
            }
        }
        if self.live.stop_tracking(streamer).await? {
            Ok(())
        } else {
            Err(TrackerError::NotTracked(streamer.name.clone()))
        }
    }

    pub async fn subs(&self, name: &str, platform: Option<&str>) -> String {
        let platform = match self.platform(platform) {
            Ok(p) => p,
            Err(msg) => return msg,
        };
        let not_tracked = || format!("Metrics are not being tracked for {} on {}", name, platform);
        let resolver = match self.resolvers.get(&platform) {
            Some(r) => r,
            None => return not_tracked(),
        };

        match resolver.resolve_one(name).await {
            Ok(Some(streamer)) => match self.sessions.session_metrics(&streamer) {
                Some(metrics) => metrics.format(&streamer.name),
                None => not_tracked(),
            },
            Ok(None) => format!("Unknown user '{}' for platform '{}'", name, platform),
            Err(err) => format!("Cannot get metrics for {}: {}", name, err),
        }
    }

    pub fn streams(&self, target: Option<&str>) -> String {
        let prefix = target.map(|t| format!("{}: ", t)).unwrap_or_default();
        let active = self.sessions.active_sessions();
        if active.is_empty() {
            format!("{}Y'a personne qui stream ici, çaynul !", prefix)
        } else {
            format!("{}{}", prefix, format_streams(&active))
        }
    }
}

pub fn stream_url(stream: &LiveStream) -> String {
    match stream.platform {
        Platform::Twitch => format!("https://www.twitch.tv/{}", stream.user_name),
        Platform::Youtube => format!("https://www.youtube.com/@{}", stream.user_name),
    }
}

fn format_game(stream: &LiveStream) -> Option<String> {
    if stream.game_name.is_empty() {
        None
    } else {
        Some(format!("({})", stream.game_name))
    }
}

fn format_streams(active: &[(LiveStream, SubscriptionMetrics)]) -> String {
    active
        .iter()
        .map(|(stream, metrics)| format_stream(stream, metrics))
        .collect::<Vec<_>>()
        .join("−")
}

fn format_stream(stream: &LiveStream, metrics: &SubscriptionMetrics) -> String {
    let time_fmt = time::macros::format_description!("[hour repr:12]:[minute] [period]");
    let started_at = stream
        .started_at
        .format(time_fmt)
        .unwrap_or_else(|_| stream.started_at.to_string());
    let mut parts = vec![stream.user_display_name.clone()];
    parts.extend(format_game(stream));
    parts.push(format!("started at {started_at}"));
    parts.push(format!("({})", stream_url(stream)));
    parts.push(format!("[{} sub(s)]", metrics.totals.all));
    parts.join(" ")
}

pub fn live_announcement(stream: &LiveStream) -> String {
    let game = format_game(stream)
        .map(|g| format!(" {}", g))
        .unwrap_or_default();
    format!(
        "Le stream de {} est maintenant live at {}{}!",
        stream.user_display_name,
        stream_url(stream),
        game
    )
}

pub fn offline_announcement(streamer: &Streamer) -> String {
    format!(
        "{} a arreté de streamer pour le moment. N'oubliez pas de like&subscribe.",
        streamer.display_name
    )
}
