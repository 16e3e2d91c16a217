//! askbot: a chat bot that binds short commands to private agent endpoints.
//!
//! Users and group admins register an endpoint URL and credential under a
//! command name through a short wizard, then run `/ai <command> <message>`;
//! the bot forwards the message, picks the answer out of the streamed
//! response and replies in the chat.

pub mod bootstrap;
pub mod bot;
pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod remote;
pub mod secrets;
pub mod settings;

pub use config::Config;
pub use error::{Error, Result};
