use irc::client::prelude::*;

use anyhow::{anyhow, Context, Result};
use log::info;
use structopt::StructOpt;

mod golem;

#[derive(Debug, StructOpt)]
struct Opt {
    /// list of channels to join, the twitch chat of a streamer is #<login>
    #[structopt(long)]
    channels: Vec<String>,

    /// must be the login of the twitch account the oauth token belongs to
    #[structopt(long, default_value = "subgolem")]
    nickname: String,

    #[structopt(long, default_value = "irc.chat.twitch.tv")]
    server: String,

    #[structopt(long, default_value = "6697")]
    port: u16,

    #[structopt(long)]
    disable_tls: bool,

    #[structopt(long, default_value = "golem_config.dhall")]
    config: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let opt = Opt::from_args();

    if opt.channels.is_empty() {
        return Err(anyhow!("No channels to join, aborting"));
    }

    let golem_config = golem::GolemConfig::from_path(&opt.config)
        .with_context(|| format!("Cannot read golem config at {}", opt.config))?;

    info!("Joining channel(s): {:?}", opt.channels);
    let config = Config {
        nickname: Some(opt.nickname.to_lowercase()),
        server: Some(opt.server),
        port: Some(opt.port),
        use_tls: Some(!opt.disable_tls),
        // twitch wants the oauth token as the server password
        password: golem_config.oauth_password(),
        channels: opt.channels,
        ..Config::default()
    };

    golem::Golem::new_from_config(config, golem_config, &opt.config)
        .await?
        .run()
        .await
        .context("Plugin golem crashed")?;

    info!("Golem exited");
    Ok(())
}
