//! Shared fixtures for gateway unit tests.

use std::sync::Arc;

use {
    async_trait::async_trait,
    howl_common::{Catalog, ChatId, ChatKind, InboundUpdate, Sender, UpdatePayload, UserId},
    howl_config::AccessConfig,
    howl_fleet::{
        FleetPolicy, FleetRegistry, LifecycleController, SessionLocator,
        testutil::RecordingDispatcher,
    },
};

use crate::{
    server::default_catalog,
    state::{ChatAdmins, GatewayState, Stats},
};

/// Treats user 50 as the administrator of every group.
pub struct FixedAdmins;

#[async_trait]
impl ChatAdmins for FixedAdmins {
    async fn is_admin(&self, _chat_id: ChatId, user_id: UserId) -> bool {
        user_id == UserId(50)
    }
}

pub struct Fixture {
    pub state: Arc<GatewayState>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub fn fixture() -> Fixture {
    state_with_access(AccessConfig {
        dev_user_ids: vec![1],
        admin_user_ids: vec![2],
        blocked_user_ids: vec![3],
    })
}

pub fn state_with_access(access: AccessConfig) -> Fixture {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let catalog: Catalog = default_catalog("English");
    let localizer = Arc::new(catalog);
    let registry = Arc::new(FleetRegistry::new());
    let controller = Arc::new(LifecycleController::new(
        Arc::clone(&registry),
        dispatcher.clone(),
        localizer.clone(),
        FleetPolicy::default(),
    ));
    let state = Arc::new(GatewayState {
        controller,
        locator: SessionLocator::new(registry),
        dispatcher: dispatcher.clone(),
        localizer,
        admins: Arc::new(FixedAdmins),
        access,
        default_locale: "English".into(),
        bot_username: Some("howl_bot".into()),
        stats: Arc::new(Stats::default()),
    });
    Fixture { state, dispatcher }
}

fn message(chat_id: i64, chat_kind: ChatKind, user: i64, text: &str) -> InboundUpdate {
    InboundUpdate {
        chat_id: ChatId(chat_id),
        chat_kind,
        sender: Some(Sender {
            id: UserId(user),
            username: None,
            language_code: None,
        }),
        payload: UpdatePayload::Message {
            message_id: 1,
            text: text.to_string(),
        },
    }
}

pub fn group_message(chat_id: i64, user: i64, text: &str) -> InboundUpdate {
    message(chat_id, ChatKind::Supergroup, user, text)
}

pub fn private_message(user: i64, text: &str) -> InboundUpdate {
    message(user, ChatKind::Private, user, text)
}
