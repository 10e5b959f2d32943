use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    howl_common::{ChatId, Localizer, UserId},
    howl_config::AccessConfig,
    howl_fleet::{
        Delivery, DispatchError, Dispatcher, LifecycleController, SendOptions, SessionLocator,
    },
};

// ── Stats ────────────────────────────────────────────────────────────────────

/// In-process counters reported by the `stats` command.
#[derive(Debug)]
pub struct Stats {
    started_at: Instant,
    updates_received: AtomicU64,
    commands_handled: AtomicU64,
    updates_forwarded: AtomicU64,
    updates_unrouted: AtomicU64,
    messages_sent: AtomicU64,
    games_started: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            updates_received: AtomicU64::new(0),
            commands_handled: AtomicU64::new(0),
            updates_forwarded: AtomicU64::new(0),
            updates_unrouted: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            games_started: AtomicU64::new(0),
        }
    }
}

/// Copy of [`Stats`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub updates_received: u64,
    pub commands_handled: u64,
    pub updates_forwarded: u64,
    pub updates_unrouted: u64,
    pub messages_sent: u64,
    /// Sessions placed since startup.
    pub games_started: u64,
}

impl Stats {
    pub fn record_update(&self) {
        self.updates_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward(&self) {
        self.updates_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrouted(&self) {
        self.updates_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_game_started(&self) {
        self.games_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            updates_received: self.updates_received.load(Ordering::Relaxed),
            commands_handled: self.commands_handled.load(Ordering::Relaxed),
            updates_forwarded: self.updates_forwarded.load(Ordering::Relaxed),
            updates_unrouted: self.updates_unrouted.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            games_started: self.games_started.load(Ordering::Relaxed),
        }
    }
}

/// Wraps a dispatcher and counts successful sends into [`Stats`].
pub struct CountingDispatcher {
    inner: Arc<dyn Dispatcher>,
    stats: Arc<Stats>,
}

impl CountingDispatcher {
    pub fn new(inner: Arc<dyn Dispatcher>, stats: Arc<Stats>) -> Self {
        Self { inner, stats }
    }
}

#[async_trait]
impl Dispatcher for CountingDispatcher {
    async fn send(
        &self,
        chat_id: ChatId,
        content: &str,
        options: &SendOptions,
    ) -> Result<Delivery, DispatchError> {
        let delivery = self.inner.send(chat_id, content, options).await?;
        self.stats.record_sent();
        Ok(delivery)
    }
}

// ── Chat admins ──────────────────────────────────────────────────────────────

/// Platform lookup for group administrators.
#[async_trait]
pub trait ChatAdmins: Send + Sync {
    async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> bool;
}

#[async_trait]
impl ChatAdmins for howl_telegram::TelegramBot {
    async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> bool {
        match self.is_chat_admin(chat_id, user_id).await {
            Ok(admin) => admin,
            Err(e) => {
                tracing::warn!(%chat_id, %user_id, error = %e, "chat admin lookup failed");
                false
            },
        }
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Everything a command handler or the router needs.
pub struct GatewayState {
    pub controller: Arc<LifecycleController>,
    pub locator: SessionLocator,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub localizer: Arc<dyn Localizer>,
    pub admins: Arc<dyn ChatAdmins>,
    pub access: AccessConfig,
    /// Locale new sessions are opened with.
    pub default_locale: String,
    /// Bot username, used to tell `/cmd@thisbot` from `/cmd@otherbot`.
    pub bot_username: Option<String>,
    pub stats: Arc<Stats>,
}

impl GatewayState {
    pub fn is_dev(&self, user_id: UserId) -> bool {
        self.access.dev_user_ids.contains(&user_id.0)
    }

    /// Developers count as global admins.
    pub fn is_global_admin(&self, user_id: UserId) -> bool {
        self.is_dev(user_id) || self.access.admin_user_ids.contains(&user_id.0)
    }

    pub fn is_blocked(&self, user_id: UserId) -> bool {
        self.access.blocked_user_ids.contains(&user_id.0)
    }

    /// Send a localized string to a chat. Failures are logged.
    pub async fn say(&self, chat_id: ChatId, key: &str, args: &[&str]) {
        let text = self
            .localizer
            .resolve_with(key, &self.default_locale, args);
        self.reply(chat_id, &text).await;
    }

    /// Send text to a chat. Failures are logged.
    pub async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self
            .dispatcher
            .send(chat_id, text, &SendOptions::default())
            .await
        {
            tracing::warn!(%chat_id, error = %e, "reply failed");
        }
    }
}
