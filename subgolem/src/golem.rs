use anyhow::{anyhow, Context, Result};
use futures::prelude::*;
use irc::proto::Message;
use parking_lot::Mutex;
use plugin_core::Plugin;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Deserialize)]
pub struct GolemConfig {
    blacklisted_users: Vec<String>,
    plugins: Vec<String>,
    /// token of the bot's twitch account, with or without the `oauth:` prefix
    oauth_token: Option<String>,
}

impl GolemConfig {
    pub fn from_path<P>(config_path: P) -> std::result::Result<GolemConfig, serde_dhall::Error>
    where
        P: AsRef<Path>,
    {
        serde_dhall::from_file(config_path).parse::<GolemConfig>()
    }

    pub fn oauth_password(&self) -> Option<String> {
        self.oauth_token.as_ref().map(|token| {
            if token.starts_with("oauth:") {
                token.clone()
            } else {
                format!("oauth:{}", token)
            }
        })
    }

    fn is_blacklisted(&self, nick: &str) -> bool {
        self.blacklisted_users
            .iter()
            .any(|u| u.eq_ignore_ascii_case(nick))
    }
}

impl std::fmt::Debug for Golem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Golem")
            .field("plugins", &self.plugins.iter().map(|p| p.get_name()).collect::<Vec<_>>())
            .finish()
    }
}

pub struct Golem {
    irc_client: Arc<Mutex<irc::client::Client>>,
    config: GolemConfig,
    plugins: Vec<Box<dyn Plugin>>,
}

impl Golem {
    pub async fn new_from_config(
        irc_config: irc::client::data::Config,
        config: GolemConfig,
        config_path: &str,
    ) -> Result<Self> {
        let irc_client = irc::client::Client::from_config(irc_config).await?;
        let plugins = stream::iter(config.plugins.clone())
            .map(|name| async move { init_plugin(&name, config_path).await })
            .buffer_unordered(10)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            irc_client: Arc::new(Mutex::new(irc_client)),
            config,
            plugins,
        })
    }

    /// Runs until a plugin or the irc connection fails, or until ctrl-c.
    /// Plugins are shut down in both cases.
    pub async fn run(&self) -> Result<()> {
        self.irc_client
            .lock()
            .identify()
            .context("Problem while identifying")?;

        let result = tokio::select! {
            res = async { tokio::try_join!(self.run_plugins(), self.recv_irc_messages()) } => {
                res.map(|_| ())
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("ctrl-c received, stopping");
                Ok(())
            }
        };

        for plugin in &self.plugins {
            plugin.shutdown().await;
        }
        result
    }

    async fn recv_irc_messages(&self) -> Result<()> {
        let mut stream = {
            let mut client = self.irc_client.lock();
            client.stream()?
        };

        while let Some(irc_message) = stream.next().await.transpose()? {
            if let Some(source) = irc_message.source_nickname() {
                if self.config.is_blacklisted(source) {
                    log::debug!("message from blacklisted user: {}, discarding", source);
                    continue;
                }
            }

            let messages = self
                .plugins_in_messages(&irc_message)
                .await
                .with_context(|| "Plugin error !")?;

            for message in messages.into_iter().flatten() {
                self.outbound_message(&message).await?;
            }
        }
        Err(anyhow!("IRC receiving stream exited"))
    }

    async fn plugins_in_messages(&self, msg: &Message) -> Result<Vec<Option<Message>>> {
        let mut results = Vec::with_capacity(self.plugins.len());

        let (txs, rxs): (Vec<_>, Vec<_>) = self.plugins.iter().map(|_| oneshot::channel()).unzip();

        futures::stream::iter(self.plugins.iter().zip(txs))
            .map(Ok)
            .try_for_each_concurrent(5, |(plugin, tx)| async move {
                let mb_msg = plugin.in_message(msg).await.with_context(|| {
                    format!("in_message error from plugin {}", plugin.get_name())
                })?;
                if tx.send(mb_msg).is_err() {
                    return Err(anyhow!("cannot send plugin message !"));
                }
                Ok::<(), anyhow::Error>(())
            })
            .await?;

        for rx in rxs {
            let rx: oneshot::Receiver<Option<Message>> = rx;
            results.push(rx.await?);
        }

        Ok(results)
    }

    async fn run_plugins(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(10);
        let runs = self
            .plugins
            .iter()
            .map(|p| {
                let tx = tx.clone();
                async move {
                    p.run(tx)
                        .await
                        .with_context(|| format!("Plugin {}.run() failed", p.get_name()))?;
                    Ok::<(), anyhow::Error>(())
                }
            })
            .collect::<Vec<_>>();
        // the receiving loop ends once every plugin dropped its sender
        drop(tx);
        let process = async move {
            while let Some(msg) = rx.recv().await {
                self.outbound_message(&msg).await?;
            }
            Ok::<(), anyhow::Error>(())
        };
        futures::future::try_join(futures::future::try_join_all(runs), process).await?;
        Err(anyhow!("All plugins stopped"))
    }

    async fn outbound_message(&self, message: &Message) -> Result<()> {
        futures::stream::iter(self.plugins.iter())
            .map(Ok)
            .try_for_each_concurrent(5, |plugin| {
                let msg = &message;
                async move {
                    plugin.out_message(msg).await?;
                    Ok::<(), anyhow::Error>(())
                }
            })
            .await?;
        let client = self.irc_client.lock();
        client.send(message.clone())?;
        Ok(())
    }
}

async fn init_plugin(name: &str, config_path: &str) -> Result<Box<dyn Plugin>> {
    let plugin = match name {
        "twitch" => plugin_core::new_boxed::<plugin_twitch::Twitch>(config_path).await,
        _ => return Err(anyhow!("Unknown plugin name: {}", name)),
    };
    let plugin = plugin.with_context(|| format!("Cannot initalize plugin {}", name))?;
    log::info!("Plugin initialized: {}", name);
    Ok(plugin)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(token: &str) -> GolemConfig {
        serde_dhall::from_str(&format!(
            r#"{{ blacklisted_users = [ "Nightbot", "StreamElements" ]
               , plugins = [ "twitch" ]
               , oauth_token = Some "{token}"
               }}"#
        ))
        .parse()
        .unwrap()
    }

    #[test]
    fn test_oauth_password() {
        assert_eq!(config("abc").oauth_password(), Some("oauth:abc".to_string()));
        assert_eq!(
            config("oauth:abc").oauth_password(),
            Some("oauth:abc".to_string()),
            "prefix isn't doubled"
        );
    }

    #[test]
    fn test_blacklist_ignores_case() {
        let config = config("abc");
        assert!(config.is_blacklisted("nightbot"));
        assert!(!config.is_blacklisted("viewer23"));
        assert_eq!(config.plugins, vec!["twitch"]);
    }
}
