use std::path::Path;

use serde::Deserialize;
use twitch_api2::twitch_oauth2::{ClientId, ClientSecret};

#[derive(Deserialize, Clone)]
#[serde(transparent)]
pub struct Obfuscated(pub String);

impl std::fmt::Debug for Obfuscated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<Obfuscated string>")?;
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    /// shared secret used to sign the eventsub notifications
    pub app_secret: Obfuscated,
    /// twitch user id of the bot, required by chat notification subscriptions
    pub bot_user_id: String,
    pub callback_uri: Obfuscated,
    pub webhook_bind: String,
    pub webhook_port: u16,
    pub poll_interval_secs: u64,
    /// irc nicknames allowed to start and stop tracking
    pub admins: Vec<String>,
    /// where live and offline announcements go
    pub announce_channel: String,
    /// streamers to track when the bot starts
    pub tracked_streamers: Vec<String>,
}

// tmp struct to parse the config from a file with other stuff in it
#[derive(Deserialize)]
struct TC {
    twitch: Config,
}

impl Config {
    /// read config from a file where it's under a key
    /// named "twitch"
    pub fn from_file_keyed<P>(p: P) -> Result<Self, serde_dhall::Error>
    where
        P: AsRef<Path>,
    {
        let tmp: TC = serde_dhall::from_file(p).parse()?;
        Ok(tmp.twitch)
    }

    pub fn from_str_keyed(s: &str) -> Result<Self, serde_dhall::Error> {
        let tmp: TC = serde_dhall::from_str(s).parse()?;
        Ok(tmp.twitch)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

}
