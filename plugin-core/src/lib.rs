#![allow(unused_variables)]
use async_trait::async_trait;
use irc::proto::Message;
use tokio::sync::mpsc;

pub mod parser;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// useful when constructing an error from scratch
    #[error("Generic plugin error {0}")]
    Synthetic(String),

    #[error("Plugin error ({ctx}) from {source:?}")]
    Wrapped {
        source: Box<dyn std::error::Error + Send + Sync>,
        ctx: String,
    },

    #[error("Generic error {0:#}")]
    Generic(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Turn any error coming from a dependency into a plugin error,
/// with some context about what failed.
pub trait WrapError<T> {
    fn wrap<C: Into<String>>(self, ctx: C) -> Result<T>;
}

impl<T, E> WrapError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn wrap<C: Into<String>>(self, ctx: C) -> Result<T> {
        self.map_err(|err| Error::Wrapped {
            source: Box::new(err),
            ctx: ctx.into(),
        })
    }
}

#[async_trait]
pub trait Plugin: Sync + Send {
    async fn init(config_path: &str) -> Result<Self>
    where
        Self: Sized;

    /// This method is polled (through .await) after initialisation once the bot is running.
    /// The given bot_chan can be used to send message to IRC out of band,
    /// that is, not as a response to an incoming event.
    /// This method can also be used to start an async process.
    async fn run(&self, bot_chan: mpsc::Sender<Message>) -> Result<()> {
        Ok(())
    }

    /// The unique identifier of the plugin
    fn get_name(&self) -> &'static str;

    /// Method invoked whenever a message is received from IRC
    /// Returns Some(Message) if a response message should be sent, None otherwise
    async fn in_message(&self, msg: &Message) -> Result<Option<Message>> {
        Ok(None)
    }

    /// Method invoked whenever the bot sends a message to IRC.
    async fn out_message(&self, msg: &Message) -> Result<()> {
        Ok(())
    }

    /// Called once when the bot is going down. Background work started
    /// in `run` should be stopped before this returns.
    async fn shutdown(&self) {}
}

pub async fn new_boxed<T>(config_path: &str) -> Result<Box<dyn Plugin>>
where
    T: Plugin + 'static,
{
    Ok(Box::new(T::init(config_path).await?))
}
