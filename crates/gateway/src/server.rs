use std::{sync::Arc, time::Duration};

use {
    anyhow::Context as _,
    howl_common::{Catalog, ChatId, Localizer},
    howl_config::{HowlConfig, LocaleConfig, Severity, check_config},
    howl_fleet::{
        Dispatcher, FleetPolicy, FleetRegistry, LifecycleController, NODE_SHUTS_DOWN,
        SessionLocator, spawn_health_monitor,
    },
    howl_telegram::{TelegramBot, TelegramConfig},
    tokio::{net::TcpListener, sync::mpsc},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use crate::{
    builtin::{GAME_ALREADY_RUNNING, GAME_STARTING, NO_NODES_AVAILABLE, builtin_commands},
    router::Router,
    state::{CountingDispatcher, GatewayState, Stats},
    worker_server::WorkerServer,
};

/// Inbound updates buffered between the poller and the router.
const UPDATE_QUEUE: usize = 256;

/// Options that come from the command line rather than the config file.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Chat to announce the running version to once startup completes.
    pub updated_chat: Option<i64>,
}

/// Built-in English strings, used when the language directory cannot be
/// loaded.
pub fn default_catalog(default_locale: &str) -> Catalog {
    [
        (
            NODE_SHUTS_DOWN,
            "The game server hosting this game is shutting down. The game has been cancelled.",
        ),
        (NO_NODES_AVAILABLE, "No game servers are available right now."),
        (GAME_ALREADY_RUNNING, "A game is already running here."),
        (GAME_STARTING, "Starting a new game..."),
        ("NotInGroup", "Games can only be played in groups."),
        ("NotAllowed", "You are not allowed to use this command."),
    ]
    .into_iter()
    .fold(Catalog::new(default_locale), |catalog, (key, text)| {
        catalog.with_entry(default_locale, key, text)
    })
}

fn load_catalog(config: &LocaleConfig) -> Catalog {
    match Catalog::load_dir(&config.dir, &config.default_locale) {
        Ok(catalog) => {
            info!(locales = ?catalog.locales(), "language files loaded");
            catalog
        },
        Err(e) => {
            warn!(dir = %config.dir.display(), error = %e, "using built-in strings");
            default_catalog(&config.default_locale)
        },
    }
}

#[cfg(feature = "metrics")]
fn init_metrics(config: &howl_config::MetricsConfig) -> anyhow::Result<()> {
    let listen = config
        .listen
        .as_deref()
        .map(str::parse::<std::net::SocketAddr>)
        .transpose()
        .context("invalid metrics.listen address")?;
    howl_metrics::init_metrics(howl_metrics::MetricsRecorderConfig {
        enabled: config.enabled,
        listen,
        global_labels: config
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })
}

/// Run the control plane until `cancel` fires or polling stops.
pub async fn start(
    config: HowlConfig,
    options: StartOptions,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let diagnostics = check_config(&config);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => info!(path = %d.path, "{}", d.message),
        }
    }
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("configuration has {errors} error(s); run `howl config check`");
    }

    #[cfg(feature = "metrics")]
    init_metrics(&config.metrics)?;

    let telegram = config
        .channels
        .telegram
        .clone()
        .context("channels.telegram is not configured")?;
    let telegram = TelegramConfig::from_value(telegram)?;
    let bot = TelegramBot::connect(&telegram).await?;

    let stats = Arc::new(Stats::default());
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(CountingDispatcher::new(
        Arc::new(bot.dispatcher()),
        Arc::clone(&stats),
    ));
    let localizer: Arc<dyn Localizer> = Arc::new(load_catalog(&config.locale));

    let registry = Arc::new(FleetRegistry::new());
    let policy = FleetPolicy {
        max_sessions_per_worker: config.fleet.max_sessions_per_worker,
        shutdown_notify_threshold: config.fleet.shutdown_notify_threshold,
        idle_timeout: config.fleet.idle_timeout(),
    };
    let controller = Arc::new(LifecycleController::new(
        Arc::clone(&registry),
        Arc::clone(&dispatcher),
        Arc::clone(&localizer),
        policy,
    ));

    let commands = Arc::new(builtin_commands()?);
    if telegram.register_commands {
        bot.register_commands(&commands.public_descriptions()).await;
    }

    let state = Arc::new(GatewayState {
        controller: Arc::clone(&controller),
        locator: SessionLocator::new(registry),
        dispatcher,
        localizer,
        admins: Arc::new(bot.clone()),
        access: config.access.clone(),
        default_locale: config.locale.default_locale.clone(),
        bot_username: bot.username().map(str::to_string),
        stats,
    });

    // ── Background tasks ─────────────────────────────────────────────────
    let addr = format!("{}:{}", config.workers.bind, config.workers.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind worker listener on {addr}"))?;
    let worker_server = Arc::new(
        WorkerServer::new(
            Arc::clone(&controller),
            Duration::from_millis(config.workers.handshake_timeout_ms),
        )
        .with_heartbeat_interval(Duration::from_millis(config.workers.heartbeat_interval_ms)),
    );
    let listener_task = tokio::spawn(worker_server.serve(listener, cancel.clone()));
    let health_task = spawn_health_monitor(
        Arc::clone(&controller),
        config.fleet.health_interval(),
        cancel.clone(),
    );

    let (tx, rx) = mpsc::channel(UPDATE_QUEUE);
    let poll_task = bot.start_polling(tx, cancel.clone());

    if let Some(chat) = options.updated_chat {
        let notice = format!("Control updated\n{}", env!("CARGO_PKG_VERSION"));
        state.reply(ChatId(chat), &notice).await;
    }
    info!(
        max_sessions_per_worker = policy.max_sessions_per_worker,
        notify_threshold = policy.shutdown_notify_threshold,
        "howl control plane running"
    );

    Router::new(state, commands).run(rx, cancel.clone()).await;

    cancel.cancel();
    let _ = tokio::join!(listener_task, health_task, poll_task);
    info!("howl control plane stopped");
    Ok(())
}
