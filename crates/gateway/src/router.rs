//! Inbound update routing: built-in commands are answered here, everything
//! else goes to the worker that owns the chat's session.

use std::sync::Arc;

use {
    howl_common::{InboundUpdate, WorkerId},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    commands::{CommandContext, CommandTable, Denial, authorize, parse_command},
    state::GatewayState,
};

/// What happened to one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A built-in command ran.
    Command(String),
    Denied(Denial),
    Forwarded(WorkerId),
    /// No live session owns the chat, or the forward failed.
    Unrouted,
}

pub struct Router {
    state: Arc<GatewayState>,
    commands: Arc<CommandTable>,
}

impl Router {
    pub fn new(state: Arc<GatewayState>, commands: Arc<CommandTable>) -> Self {
        Self { state, commands }
    }

    /// Handle updates one at a time until `cancel` fires or the channel closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<InboundUpdate>, cancel: CancellationToken) {
        loop {
            let update = tokio::select! {
                _ = cancel.cancelled() => break,
                u = rx.recv() => match u {
                    Some(u) => u,
                    None => break,
                },
            };
            let outcome = self.handle(update).await;
            debug!(?outcome, "update routed");
        }
        info!("update router stopped");
    }

    pub async fn handle(&self, update: InboundUpdate) -> RouteOutcome {
        self.state.stats.record_update();

        let parsed = update
            .payload
            .text()
            .and_then(|text| parse_command(text, self.state.bot_username.as_deref()));
        if let Some((trigger, args)) = parsed
            && self.commands.get(&trigger).is_some()
        {
            return self.run_command(trigger, args, update).await;
        }

        self.forward(update).await
    }

    async fn run_command(&self, trigger: String, args: String, update: InboundUpdate) -> RouteOutcome {
        let Some(command) = self.commands.get(&trigger) else {
            return RouteOutcome::Unrouted;
        };
        let chat_id = update.chat_id;

        if let Err(denial) = authorize(command.flags(), &self.state, &update).await {
            debug!(%chat_id, trigger, ?denial, "command denied");
            if let Some(key) = denial.message_key() {
                self.state.say(chat_id, key, &[]).await;
            }
            return RouteOutcome::Denied(denial);
        }

        self.state.stats.record_command();
        #[cfg(feature = "metrics")]
        howl_metrics::counter!(
            howl_metrics::inbound::COMMANDS_TOTAL,
            howl_metrics::labels::COMMAND => trigger.clone()
        )
        .increment(1);

        let ctx = CommandContext {
            state: Arc::clone(&self.state),
            update,
            args,
        };
        match command.run(ctx).await {
            Ok(Some(reply)) => self.state.reply(chat_id, &reply).await,
            Ok(None) => {},
            Err(e) => warn!(%chat_id, trigger, error = %e, "command failed"),
        }
        RouteOutcome::Command(trigger)
    }

    async fn forward(&self, update: InboundUpdate) -> RouteOutcome {
        let chat_id = update.chat_id;
        let Some((worker, session)) = self.state.locator.find(chat_id) else {
            return self.unrouted();
        };
        match worker.transport.forward(&session, &update.payload).await {
            Ok(()) => {
                self.state.stats.record_forward();
                RouteOutcome::Forwarded(worker.id)
            },
            Err(e) => {
                warn!(%chat_id, worker_id = %worker.id, error = %e, "forward to worker failed");
                self.unrouted()
            },
        }
    }

    fn unrouted(&self) -> RouteOutcome {
        self.state.stats.record_unrouted();
        #[cfg(feature = "metrics")]
        howl_metrics::counter!(howl_metrics::inbound::UNROUTED_TOTAL).increment(1);
        RouteOutcome::Unrouted
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        howl_common::{ChatId, UpdatePayload},
        howl_fleet::testutil::MockTransport,
    };

    use {
        super::*,
        crate::{
            builtin::builtin_commands,
            test_support::{Fixture, fixture, group_message, private_message},
        },
    };

    fn router(fx: &Fixture) -> Router {
        Router::new(fx.state.clone(), Arc::new(builtin_commands().unwrap()))
    }

    #[tokio::test]
    async fn ping_replies() {
        let fx = fixture();
        let outcome = router(&fx).handle(private_message(9, "/ping")).await;
        assert_eq!(outcome, RouteOutcome::Command("ping".into()));
        assert_eq!(fx.dispatcher.sent(), vec![(ChatId(9), "Pong!".to_string())]);
        assert_eq!(fx.state.stats.snapshot().commands_handled, 1);
    }

    #[tokio::test]
    async fn denied_command_sends_localized_reason() {
        let fx = fixture();
        let outcome = router(&fx).handle(private_message(9, "/startgame")).await;
        assert_eq!(outcome, RouteOutcome::Denied(Denial::NotInGroup));
        assert_eq!(fx.dispatcher.sent(), vec![(
            ChatId(9),
            "Games can only be played in groups.".to_string()
        )]);
    }

    #[tokio::test]
    async fn blocked_user_is_silently_ignored() {
        let fx = fixture();
        let outcome = router(&fx).handle(group_message(-1, 3, "/startgame")).await;
        assert_eq!(outcome, RouteOutcome::Denied(Denial::Blocked));
        assert!(fx.dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn game_traffic_goes_to_owning_worker() {
        let fx = fixture();
        let transport = MockTransport::connected();
        let worker_id = fx
            .state
            .controller
            .connect(transport.clone(), None)
            .unwrap();
        let router = router(&fx);

        router.handle(group_message(-7, 5, "/startgame")).await;
        let outcome = router.handle(group_message(-7, 5, "vote 3")).await;
        assert_eq!(outcome, RouteOutcome::Forwarded(worker_id));

        // Commands the control plane does not know belong to the game.
        let outcome = router.handle(group_message(-7, 5, "/join")).await;
        assert_eq!(outcome, RouteOutcome::Forwarded(worker_id));

        let forwarded = transport.forwarded();
        assert_eq!(forwarded.len(), 2);
        assert_eq!(forwarded[0].0.chat_id, ChatId(-7));
        assert_eq!(forwarded[0].1, UpdatePayload::Message {
            message_id: 1,
            text: "vote 3".into()
        });
        assert_eq!(fx.state.stats.snapshot().updates_forwarded, 2);
    }

    #[tokio::test]
    async fn chat_without_game_is_unrouted() {
        let fx = fixture();
        let outcome = router(&fx).handle(group_message(-8, 5, "hello")).await;
        assert_eq!(outcome, RouteOutcome::Unrouted);
        assert_eq!(fx.state.stats.snapshot().updates_unrouted, 1);
    }

    #[tokio::test]
    async fn disconnected_worker_is_unrouted() {
        let fx = fixture();
        let transport = MockTransport::connected();
        fx.state.controller.connect(transport.clone(), None).unwrap();
        let router = router(&fx);
        router.handle(group_message(-9, 5, "/startgame")).await;

        transport.disconnect();
        let outcome = router.handle(group_message(-9, 5, "vote")).await;
        assert_eq!(outcome, RouteOutcome::Unrouted);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let fx = fixture();
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let router = Arc::new(router(&fx));
        let task = {
            let router = Arc::clone(&router);
            let cancel = cancel.clone();
            tokio::spawn(async move { router.run(rx, cancel).await })
        };
        tx.send(private_message(9, "/ping")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(fx.state.stats.snapshot().updates_received, 1);
    }
}
