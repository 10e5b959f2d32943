//! Outbound chat messages.
//!
//! The fleet only needs to send text (shutdown notices, command replies), so
//! the abstraction is a single `send` with presentation options. Platform
//! adapters implement [`Dispatcher`].

use std::time::Duration;

use {async_trait::async_trait, howl_common::ChatId};

/// How message text is interpreted by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    /// Platform-native rich text (HTML on Telegram).
    #[default]
    RichText,
}

/// A button on an inline menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub action: ButtonAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Opaque data echoed back as a callback update.
    Callback(String),
    Url(String),
}

impl InlineButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// Rows of inline buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineMenu {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineMenu {
    #[must_use]
    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.rows.push(buttons);
        self
    }
}

/// Keyboard handling for a sent message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Keyboard {
    /// Leave whatever keyboard the chat has.
    #[default]
    Default,
    /// Remove the reply keyboard.
    Clear,
    Custom(InlineMenu),
}

/// Presentation options for [`Dispatcher::send`].
///
/// The default is rich text with the keyboard left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub keyboard: Keyboard,
    pub format: TextFormat,
}

impl SendOptions {
    #[must_use]
    pub fn plain() -> Self {
        Self {
            format: TextFormat::Plain,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn clear_keyboard(mut self) -> Self {
        self.keyboard = Keyboard::Clear;
        self
    }

    #[must_use]
    pub fn with_menu(mut self, menu: InlineMenu) -> Self {
        self.keyboard = Keyboard::Custom(menu);
        self
    }
}

/// Platform acknowledgement of a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub chat_id: ChatId,
    pub message_id: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("delivery failed: {message}")]
    DeliveryFailed { message: String },

    /// The platform asked us to back off. Callers decide whether to retry.
    #[error("rate limited{}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {}s", d.as_secs()))
        .unwrap_or_default()
}

impl DispatchError {
    #[must_use]
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Sends text to a chat.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(
        &self,
        chat_id: ChatId,
        content: &str,
        options: &SendOptions,
    ) -> Result<Delivery, DispatchError>;
}
