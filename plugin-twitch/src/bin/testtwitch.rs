//! Resolve some twitch logins and print which ones are live, using the
//! twitch section of a golem config.
//!
//! testtwitch golem_config.dhall foo bar
use anyhow::{Context, Result};
use plugin_twitch::{config::Config, helix::HelixApi};
use stream_tracker::{StreamsApi, UsersApi};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().context("usage: testtwitch <config> <login>...")?;
    let names: Vec<String> = args.collect();

    let config = Config::from_file_keyed(&config_path)
        .with_context(|| format!("Cannot read {}", config_path))?;
    let helix = HelixApi::new(&config).await?;

    let streamers = helix.resolve_streamers(&names).await?;
    for streamer in &streamers {
        println!("{} -> id {}", streamer, streamer.id);
    }

    let ids: Vec<String> = streamers.iter().map(|s| s.id.clone()).collect();
    let live = helix.live_streams(&ids).await?;
    if live.is_empty() {
        println!("nobody is live");
    }
    for stream in live {
        println!(
            "{} is live: {:?} ({}), {} viewers since {}",
            stream.user_display_name, stream.title, stream.game_name, stream.viewers, stream.started_at
        );
    }

    Ok(())
}
