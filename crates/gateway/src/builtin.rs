//! Commands the control plane answers itself. Everything else is forwarded
//! to the worker hosting the chat's game.

use std::{fmt::Write as _, time::Duration};

use {
    howl_common::WorkerId,
    howl_fleet::FleetError,
    tracing::{info, warn},
};

use crate::commands::{Command, CommandContext, CommandError, CommandResult, CommandTable};

pub const GAME_STARTING: &str = "GameStarting";
pub const GAME_ALREADY_RUNNING: &str = "GameAlreadyRunning";
pub const NO_NODES_AVAILABLE: &str = "NoNodesAvailable";

/// The built-in command table.
pub fn builtin_commands() -> Result<CommandTable, CommandError> {
    CommandTable::builder()
        .command(
            Command::new(
                "startgame",
                "Start a new game in this group",
                Box::new(|ctx| Box::pin(start_game(ctx))),
            )
            .blockable()
            .in_group_only(),
        )
        .command(
            Command::new(
                "nodes",
                "List connected worker nodes",
                Box::new(|ctx| Box::pin(list_nodes(ctx))),
            )
            .dev_only(),
        )
        .command(
            Command::new(
                "drain",
                "Stop assigning games to a node",
                Box::new(|ctx| Box::pin(drain_node(ctx))),
            )
            .dev_only(),
        )
        .command(
            Command::new(
                "stats",
                "Show control plane statistics",
                Box::new(|ctx| Box::pin(stats(ctx))),
            )
            .global_admin_only(),
        )
        .command(Command::new(
            "ping",
            "Check that the bot is alive",
            Box::new(|_ctx| Box::pin(async { Ok(Some("Pong!".to_string())) })),
        ))
        .build()
}

fn localized(ctx: &CommandContext, key: &str) -> Option<String> {
    Some(ctx.state.localizer.resolve(key, &ctx.state.default_locale))
}

async fn start_game(ctx: CommandContext) -> CommandResult {
    let chat_id = ctx.update.chat_id;
    if ctx.state.locator.has_session(chat_id) {
        return Ok(localized(&ctx, GAME_ALREADY_RUNNING));
    }

    match ctx
        .state
        .controller
        .assign_session(chat_id, &ctx.state.default_locale)
        .await
    {
        Ok(assignment) => {
            ctx.state.stats.record_game_started();
            info!(%chat_id, worker_id = %assignment.worker_id, "game started");
            Ok(localized(&ctx, GAME_STARTING))
        },
        Err(FleetError::ChatAlreadyBound { .. }) => Ok(localized(&ctx, GAME_ALREADY_RUNNING)),
        Err(FleetError::NoWorkerAvailable) => Ok(localized(&ctx, NO_NODES_AVAILABLE)),
        Err(e @ FleetError::BindFailed { .. }) => {
            warn!(%chat_id, error = %e, "could not start game");
            Ok(localized(&ctx, NO_NODES_AVAILABLE))
        },
        Err(e) => Err(e.into()),
    }
}

async fn list_nodes(ctx: CommandContext) -> CommandResult {
    let workers = ctx.state.controller.registry().snapshot();
    if workers.is_empty() {
        return Ok(Some("No nodes connected.".to_string()));
    }
    let capacity = ctx.state.controller.policy().max_sessions_per_worker;
    let mut out = format!("<b>{} node(s)</b>\n", workers.len());
    for w in &workers {
        let _ = writeln!(
            out,
            "<code>{}</code> {} {} {}/{} games",
            w.id,
            w.name.as_deref().unwrap_or("-"),
            w.state,
            w.session_count(),
            capacity
        );
    }
    Ok(Some(out))
}

async fn drain_node(ctx: CommandContext) -> CommandResult {
    let Ok(worker_id) = ctx.args.parse::<WorkerId>() else {
        return Ok(Some("Usage: /drain &lt;node id&gt;".to_string()));
    };
    match ctx.state.controller.drain(worker_id) {
        Ok(true) => Ok(Some(format!("Node {worker_id} is draining."))),
        Ok(false) => Ok(Some(format!("Node {worker_id} is not active."))),
        Err(FleetError::UnknownWorker { .. }) => Ok(Some(format!("Unknown node {worker_id}."))),
        Err(e) => Err(e.into()),
    }
}

async fn stats(ctx: CommandContext) -> CommandResult {
    let snap = ctx.state.stats.snapshot();
    let registry = ctx.state.controller.registry();
    Ok(Some(format!(
        "<b>Uptime:</b> {}\n<b>Nodes:</b> {}\n<b>Games:</b> {}\n<b>Games started:</b> {}\n<b>Updates received:</b> {}\n<b>Commands:</b> {}\n<b>Forwarded:</b> {}\n<b>Messages sent:</b> {}",
        format_uptime(snap.uptime),
        registry.len(),
        registry.session_total(),
        snap.games_started,
        snap.updates_received,
        snap.commands_handled,
        snap.updates_forwarded,
        snap.messages_sent,
    )))
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, mins) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60);
    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m {}s", secs % 60)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        howl_common::ChatId,
        howl_fleet::{WorkerState, testutil::MockTransport},
        rstest::rstest,
    };

    use {
        super::*,
        crate::test_support::{Fixture, fixture, group_message},
    };

    async fn run(fx: &Fixture, trigger: &str, args: &str, user: i64) -> Option<String> {
        let table = builtin_commands().unwrap();
        let ctx = CommandContext {
            state: fx.state.clone(),
            update: group_message(-100, user, &format!("/{trigger} {args}")),
            args: args.to_string(),
        };
        table.get(trigger).unwrap().run(ctx).await.unwrap()
    }

    #[test]
    fn table_has_all_builtins() {
        let table = builtin_commands().unwrap();
        assert_eq!(table.triggers(), vec![
            "drain",
            "nodes",
            "ping",
            "startgame",
            "stats"
        ]);
        assert!(table.get("startgame").unwrap().flags().in_group_only);
        assert!(table.get("drain").unwrap().flags().dev_only);
    }

    #[tokio::test]
    async fn start_game_without_nodes() {
        let fx = fixture();
        let reply = run(&fx, "startgame", "", 5).await.unwrap();
        assert_eq!(reply, "No game servers are available right now.");
    }

    #[tokio::test]
    async fn start_game_then_already_running() {
        let fx = fixture();
        let transport = MockTransport::connected();
        fx.state.controller.connect(transport.clone(), None).unwrap();

        let reply = run(&fx, "startgame", "", 5).await.unwrap();
        assert_eq!(reply, "Starting a new game...");
        assert_eq!(transport.bound()[0].chat_id, ChatId(-100));

        let reply = run(&fx, "startgame", "", 5).await.unwrap();
        assert_eq!(reply, "A game is already running here.");
        assert_eq!(fx.state.stats.snapshot().games_started, 1);
    }

    #[tokio::test]
    async fn nodes_lists_workers() {
        let fx = fixture();
        assert_eq!(
            run(&fx, "nodes", "", 1).await.unwrap(),
            "No nodes connected."
        );
        let id = fx
            .state
            .controller
            .connect(MockTransport::connected(), Some("alpha".into()))
            .unwrap();
        let reply = run(&fx, "nodes", "", 1).await.unwrap();
        assert!(reply.contains(&id.to_string()));
        assert!(reply.contains("alpha active 0/60 games"));
    }

    #[tokio::test]
    async fn drain_by_id() {
        let fx = fixture();
        let id = fx
            .state
            .controller
            .connect(MockTransport::connected(), None)
            .unwrap();

        let reply = run(&fx, "drain", &id.to_string(), 1).await.unwrap();
        assert!(reply.contains("is draining"));
        assert_eq!(
            fx.state.controller.registry().get(&id).unwrap().state,
            WorkerState::Draining
        );

        let reply = run(&fx, "drain", &id.to_string(), 1).await.unwrap();
        assert!(reply.contains("not active"));
        let reply = run(&fx, "drain", &WorkerId::new().to_string(), 1)
            .await
            .unwrap();
        assert!(reply.starts_with("Unknown node"));
        let reply = run(&fx, "drain", "garbage", 1).await.unwrap();
        assert!(reply.starts_with("Usage"));
    }

    #[tokio::test]
    async fn stats_reports_counts() {
        let fx = fixture();
        fx.state.stats.record_update();
        let reply = run(&fx, "stats", "", 2).await.unwrap();
        assert!(reply.contains("<b>Nodes:</b> 0"));
        assert!(reply.contains("<b>Updates received:</b> 1"));
        assert!(reply.contains("<b>Games started:</b> 0"));

        // Finished games still count towards the total.
        let worker = fx
            .state
            .controller
            .connect(MockTransport::connected(), None)
            .unwrap();
        run(&fx, "startgame", "", 5).await.unwrap();
        fx.state.controller.end_session(worker, ChatId(-100));
        let reply = run(&fx, "stats", "", 2).await.unwrap();
        assert!(reply.contains("<b>Games:</b> 0"));
        assert!(reply.contains("<b>Games started:</b> 1"));
    }

    #[rstest]
    #[case(0, "0m 0s")]
    #[case(75, "1m 15s")]
    #[case(7_260, "2h 1m")]
    #[case(90_061, "1d 1h 1m")]
    fn uptime_format(#[case] secs: u64, #[case] expected: &str) {
        assert_eq!(format_uptime(Duration::from_secs(secs)), expected);
    }
}
