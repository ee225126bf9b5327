pub mod commands;
pub mod config;
pub mod errors;
pub mod eventsub;
pub mod helix;
mod plugin;
pub mod sub_tracker;
mod webhook_server;

pub use plugin::Twitch;
