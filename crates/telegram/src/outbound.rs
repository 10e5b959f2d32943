use std::time::Duration;

use {
    async_trait::async_trait,
    teloxide::{
        RequestError,
        payloads::SendMessageSetters,
        prelude::*,
        types::{
            ChatId, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardRemove, LinkPreviewOptions,
            ParseMode, ReplyMarkup,
        },
    },
    tracing::{debug, warn},
};

use howl_fleet::{
    ButtonAction, Delivery, DispatchError, Dispatcher, InlineMenu, Keyboard, SendOptions,
    TextFormat,
};

/// Sends chat messages through the Telegram Bot API.
///
/// Link previews are always off. Rate limiting is reported to the caller
/// rather than retried here.
pub struct TelegramDispatcher {
    bot: Bot,
}

impl TelegramDispatcher {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn no_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

fn reply_markup(keyboard: &Keyboard) -> Result<Option<ReplyMarkup>, DispatchError> {
    match keyboard {
        Keyboard::Default => Ok(None),
        Keyboard::Clear => Ok(Some(ReplyMarkup::KeyboardRemove(KeyboardRemove::new()))),
        Keyboard::Custom(menu) => Ok(Some(ReplyMarkup::InlineKeyboard(inline_keyboard(menu)?))),
    }
}

fn inline_keyboard(menu: &InlineMenu) -> Result<InlineKeyboardMarkup, DispatchError> {
    let mut rows = Vec::with_capacity(menu.rows.len());
    for row in &menu.rows {
        let mut buttons = Vec::with_capacity(row.len());
        for button in row {
            buttons.push(match &button.action {
                ButtonAction::Callback(data) => {
                    InlineKeyboardButton::callback(button.text.clone(), data.clone())
                },
                ButtonAction::Url(url) => {
                    let url = reqwest::Url::parse(url).map_err(|e| {
                        DispatchError::delivery(format!("invalid button url {url}: {e}"))
                    })?;
                    InlineKeyboardButton::url(button.text.clone(), url)
                },
            });
        }
        rows.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn map_request_error(error: RequestError) -> DispatchError {
    match retry_after_duration(&error) {
        Some(wait) => DispatchError::RateLimited {
            retry_after: Some(wait),
        },
        None => DispatchError::delivery(error.to_string()),
    }
}

#[async_trait]
impl Dispatcher for TelegramDispatcher {
    async fn send(
        &self,
        chat_id: howl_common::ChatId,
        content: &str,
        options: &SendOptions,
    ) -> Result<Delivery, DispatchError> {
        let mut req = self
            .bot
            .send_message(ChatId(chat_id.0), content)
            .link_preview_options(no_link_preview());
        if options.format == TextFormat::RichText {
            req = req.parse_mode(ParseMode::Html);
        }
        if let Some(markup) = reply_markup(&options.keyboard)? {
            req = req.reply_markup(markup);
        }

        match req.await {
            Ok(message) => {
                debug!(%chat_id, message_id = message.id.0, "telegram message sent");
                #[cfg(feature = "metrics")]
                howl_metrics::counter!(howl_metrics::dispatch::MESSAGES_SENT_TOTAL).increment(1);
                Ok(Delivery {
                    chat_id,
                    message_id: message.id.0,
                })
            },
            Err(e) => {
                let err = map_request_error(e);
                warn!(%chat_id, error = %err, "telegram send failed");
                #[cfg(feature = "metrics")]
                {
                    let name = if err.is_rate_limited() {
                        howl_metrics::dispatch::RATE_LIMITED_TOTAL
                    } else {
                        howl_metrics::dispatch::DELIVERY_FAILURES_TOTAL
                    };
                    howl_metrics::counter!(name).increment(1);
                }
                Err(err)
            },
        }
    }
}
