use std::time::Duration;

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{
            AllowedUpdate, BotCommand, Chat, MediaKind, MessageKind, UpdateKind, User,
            UserId as TgUserId,
        },
    },
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use howl_common::{ChatKind, InboundUpdate, Sender, UpdatePayload, UserId};

use crate::{
    config::TelegramConfig,
    error::{Error, Result},
    outbound::TelegramDispatcher,
};

/// Pause after a failed `getUpdates` before polling again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A verified bot connection.
#[derive(Clone)]
pub struct TelegramBot {
    bot: Bot,
    username: Option<String>,
    poll_timeout_secs: u32,
}

impl TelegramBot {
    /// Build a client, verify the token with `getMe`, and clear any webhook
    /// so long polling works.
    pub async fn connect(config: &TelegramConfig) -> Result<Self> {
        // The HTTP timeout must outlast the long-poll timeout, or the client
        // aborts every idle poll.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
            .build()
            .map_err(|e| Error::message(format!("failed to build http client: {e}")))?;
        let bot = Bot::with_client(config.token.expose_secret(), client);

        let me = bot.get_me().await?;
        bot.delete_webhook().send().await?;
        info!(username = ?me.username, "telegram bot connected (webhook cleared)");

        Ok(Self {
            bot,
            username: me.username.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    /// Bot username without the leading `@`.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn dispatcher(&self) -> TelegramDispatcher {
        TelegramDispatcher::new(self.bot.clone())
    }

    /// Whether `user_id` is the owner or an administrator of `chat_id`.
    pub async fn is_chat_admin(
        &self,
        chat_id: howl_common::ChatId,
        user_id: UserId,
    ) -> Result<bool> {
        let member = self
            .bot
            .get_chat_member(ChatId(chat_id.0), TgUserId(user_id.0 as u64))
            .await?;
        Ok(member.is_privileged())
    }

    /// Publish the command list for client autocomplete. Failures are logged.
    pub async fn register_commands(&self, commands: &[(String, String)]) {
        let commands: Vec<BotCommand> = commands
            .iter()
            .map(|(name, description)| BotCommand::new(name, description))
            .collect();
        let count = commands.len();
        match self.bot.set_my_commands(commands).await {
            Ok(_) => debug!(count, "registered bot commands"),
            Err(e) => warn!(error = %e, "failed to register bot commands"),
        }
    }

    /// Poll for updates until `cancel` fires, pushing each usable one into
    /// `tx`. The loop also stops when the receiver is dropped or another
    /// instance starts polling with the same token.
    pub fn start_polling(
        &self,
        tx: mpsc::Sender<InboundUpdate>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let bot = self.bot.clone();
        let timeout = self.poll_timeout_secs;

        tokio::spawn(async move {
            info!("starting telegram polling loop");
            let mut offset: i32 = 0;

            loop {
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    r = bot
                        .get_updates()
                        .offset(offset)
                        .timeout(timeout)
                        .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                        .send() => r,
                };

                match result {
                    Ok(updates) => {
                        debug!(count = updates.len(), "got telegram updates");
                        for update in updates {
                            offset = update.id.as_offset();
                            let Some(inbound) = to_inbound(update) else {
                                continue;
                            };
                            #[cfg(feature = "metrics")]
                            howl_metrics::counter!(howl_metrics::inbound::MESSAGES_RECEIVED_TOTAL)
                                .increment(1);
                            if tx.send(inbound).await.is_err() {
                                info!("update receiver dropped, stopping telegram polling");
                                return;
                            }
                        }
                    },
                    Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                        error!("another instance is polling with this token, stopping");
                        cancel.cancel();
                        break;
                    },
                    Err(e) => {
                        warn!(error = %e, "telegram getUpdates failed");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                        }
                    },
                }
            }
            info!("telegram polling stopped");
        })
    }
}

/// Convert a Telegram update into the platform-neutral form.
///
/// Text messages and callback queries are kept; anything else (media,
/// service messages, edits) is dropped.
pub fn to_inbound(update: Update) -> Option<InboundUpdate> {
    match update.kind {
        UpdateKind::Message(msg) => {
            let text = message_text(&msg)?;
            Some(InboundUpdate {
                chat_id: howl_common::ChatId(msg.chat.id.0),
                chat_kind: chat_kind(&msg.chat),
                sender: msg.from.as_ref().map(sender),
                payload: UpdatePayload::Message {
                    message_id: msg.id.0,
                    text,
                },
            })
        },
        UpdateKind::CallbackQuery(query) => {
            let data = query.data.clone()?;
            let chat = query.message.as_ref()?.chat().clone();
            Some(InboundUpdate {
                chat_id: howl_common::ChatId(chat.id.0),
                chat_kind: chat_kind(&chat),
                sender: Some(sender(&query.from)),
                payload: UpdatePayload::Callback {
                    query_id: query.id.clone(),
                    data,
                },
            })
        },
        other => {
            debug!("ignoring telegram update: {other:?}");
            None
        },
    }
}

fn message_text(msg: &Message) -> Option<String> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Text(t) => Some(t.text.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    }
}

fn sender(user: &User) -> Sender {
    Sender {
        id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        language_code: user.language_code.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    /// teloxide only decodes `Update` correctly from text, the same way it
    /// arrives from `getUpdates`.
    fn update(value: serde_json::Value) -> Update {
        let update: Update =
            serde_json::from_str(&value.to_string()).expect("deserialize update");
        assert!(
            !matches!(update.kind, UpdateKind::Error(_)),
            "fixture did not decode: {:?}",
            update.kind
        );
        update
    }

    #[test]
    fn group_text_message() {
        let inbound = to_inbound(update(json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1,
                "chat": { "id": -100123, "type": "supergroup", "title": "Werewolves" },
                "from": {
                    "id": 1001,
                    "is_bot": false,
                    "first_name": "Alice",
                    "username": "alice",
                    "language_code": "de"
                },
                "text": "/startgame@howl_bot"
            }
        })))
        .unwrap();

        assert_eq!(inbound.chat_id, howl_common::ChatId(-100123));
        assert_eq!(inbound.chat_kind, ChatKind::Supergroup);
        let sender = inbound.sender.unwrap();
        assert_eq!(sender.id, UserId(1001));
        assert_eq!(sender.language_code.as_deref(), Some("de"));
        assert_eq!(inbound.payload, UpdatePayload::Message {
            message_id: 5,
            text: "/startgame@howl_bot".into()
        });
    }

    #[test]
    fn private_message() {
        let inbound = to_inbound(update(json!({
            "update_id": 11,
            "message": {
                "message_id": 6,
                "date": 1,
                "chat": { "id": 42, "type": "private", "first_name": "Bob" },
                "from": { "id": 42, "is_bot": false, "first_name": "Bob" },
                "text": "hello"
            }
        })))
        .unwrap();
        assert_eq!(inbound.chat_kind, ChatKind::Private);
        assert_eq!(inbound.payload.text(), Some("hello"));
    }

    #[test]
    fn callback_query() {
        let inbound = to_inbound(update(json!({
            "update_id": 12,
            "callback_query": {
                "id": "q-1",
                "from": { "id": 7, "is_bot": false, "first_name": "Eve" },
                "chat_instance": "ci",
                "data": "vote:3",
                "message": {
                    "message_id": 9,
                    "date": 1,
                    "chat": { "id": -55, "type": "group", "title": "g" },
                    "text": "Vote!"
                }
            }
        })))
        .unwrap();
        assert_eq!(inbound.chat_id, howl_common::ChatId(-55));
        assert_eq!(inbound.chat_kind, ChatKind::Group);
        assert_eq!(inbound.payload, UpdatePayload::Callback {
            query_id: "q-1".into(),
            data: "vote:3".into()
        });
    }

    #[test]
    fn non_text_message_is_dropped() {
        let inbound = to_inbound(update(json!({
            "update_id": 13,
            "message": {
                "message_id": 7,
                "date": 1,
                "chat": { "id": 42, "type": "private", "first_name": "Bob" },
                "location": { "latitude": 1.0, "longitude": 2.0 }
            }
        })));
        assert!(inbound.is_none());
    }
}
