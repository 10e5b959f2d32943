//! Shared types, error definitions, and localization used across all howl crates.

pub mod error;
pub mod locale;
pub mod types;

pub use {
    error::{Context, Error, FromMessage, HowlError, Result},
    locale::{Catalog, Localizer},
    types::{
        ChatId, ChatKind, InboundUpdate, Sender, SessionId, UpdatePayload, UserId, WorkerId,
    },
};
