mod config_commands;

use {
    clap::{Parser, Subcommand},
    howl_gateway::StartOptions,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "howl", about = "howl, chat game control plane", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/howl/).
    #[arg(long, global = true, env = "HOWL_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,

    /// Chat to announce the new version to after a deploy. Group ids are
    /// negative.
    #[arg(long, env = "HOWL_UPDATED_CHAT", allow_negative_numbers = true)]
    updated_chat: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the control plane (default when no subcommand is provided).
    Run,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(ref dir) = cli.config_dir {
        howl_config::set_config_dir(dir.clone());
    }

    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "howl starting");
            let config = howl_config::discover_and_load();
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            howl_gateway::start(
                config,
                StartOptions {
                    updated_chat: cli.updated_chat,
                },
                cancel,
            )
            .await
        },
        Some(Commands::Config { action }) => config_commands::handle_config(action),
    }
}
