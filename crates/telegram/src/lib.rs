//! Telegram adapter for howl.
//!
//! Long-polls the Bot API for chat updates and sends messages on behalf of
//! the fleet via [`TelegramDispatcher`].

pub mod bot;
pub mod config;
pub mod error;
pub mod outbound;

pub use {
    bot::{TelegramBot, to_inbound},
    config::TelegramConfig,
    error::{Error, Result},
    outbound::TelegramDispatcher,
};
