//! Chat command table.
//!
//! Commands are registered explicitly through [`CommandTable::builder`]; each
//! carries access flags that the router checks before running the handler.

use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use {
    howl_common::{InboundUpdate, UserId},
    tracing::debug,
};

use crate::state::GatewayState;

// ── Types ────────────────────────────────────────────────────────────────────

/// Context passed to every command handler.
pub struct CommandContext {
    pub state: Arc<GatewayState>,
    pub update: InboundUpdate,
    /// Text after the trigger, trimmed.
    pub args: String,
}

impl CommandContext {
    pub fn sender_id(&self) -> Option<UserId> {
        self.update.sender.as_ref().map(|s| s.id)
    }
}

/// Text to send back to the chat, if any.
pub type CommandResult = anyhow::Result<Option<String>>;

/// A boxed async command handler.
pub type HandlerFn = Box<
    dyn Fn(CommandContext) -> Pin<Box<dyn Future<Output = CommandResult> + Send>> + Send + Sync,
>;

/// Who may run a command and where.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags {
    /// Ignored for users on the block list.
    pub blockable: bool,
    pub dev_only: bool,
    pub global_admin_only: bool,
    pub group_admin_only: bool,
    pub in_group_only: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("duplicate command trigger: {0}")]
    DuplicateTrigger(String),

    #[error("invalid command trigger: {0:?}")]
    InvalidTrigger(String),
}

pub struct Command {
    trigger: String,
    description: String,
    flags: CommandFlags,
    handler: HandlerFn,
}

impl Command {
    pub fn new(trigger: impl Into<String>, description: impl Into<String>, handler: HandlerFn) -> Self {
        Self {
            trigger: trigger.into(),
            description: description.into(),
            flags: CommandFlags::default(),
            handler,
        }
    }

    #[must_use]
    pub fn blockable(mut self) -> Self {
        self.flags.blockable = true;
        self
    }

    #[must_use]
    pub fn dev_only(mut self) -> Self {
        self.flags.dev_only = true;
        self
    }

    #[must_use]
    pub fn global_admin_only(mut self) -> Self {
        self.flags.global_admin_only = true;
        self
    }

    #[must_use]
    pub fn group_admin_only(mut self) -> Self {
        self.flags.group_admin_only = true;
        self
    }

    #[must_use]
    pub fn in_group_only(mut self) -> Self {
        self.flags.in_group_only = true;
        self
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn flags(&self) -> CommandFlags {
        self.flags
    }

    pub async fn run(&self, ctx: CommandContext) -> CommandResult {
        (self.handler)(ctx).await
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("trigger", &self.trigger)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

// ── Table ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CommandTable {
    commands: HashMap<String, Command>,
}

#[derive(Debug, Default)]
pub struct CommandTableBuilder {
    commands: Vec<Command>,
}

impl CommandTableBuilder {
    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Triggers are lowercased; duplicates and triggers that are empty or
    /// contain whitespace, `/` or `@` are rejected.
    pub fn build(self) -> Result<CommandTable, CommandError> {
        let mut commands = HashMap::with_capacity(self.commands.len());
        for mut command in self.commands {
            let trigger = command.trigger.to_lowercase();
            if trigger.is_empty()
                || trigger
                    .chars()
                    .any(|c| c.is_whitespace() || c == '/' || c == '@')
            {
                return Err(CommandError::InvalidTrigger(command.trigger));
            }
            if commands.contains_key(&trigger) {
                return Err(CommandError::DuplicateTrigger(trigger));
            }
            command.trigger = trigger.clone();
            commands.insert(trigger, command);
        }
        debug!(count = commands.len(), "command table built");
        Ok(CommandTable { commands })
    }
}

impl CommandTable {
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder::default()
    }

    pub fn get(&self, trigger: &str) -> Option<&Command> {
        self.commands.get(trigger)
    }

    pub fn triggers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `(trigger, description)` pairs for platform autocomplete, sorted by
    /// trigger. Developer and admin commands are left out.
    pub fn public_descriptions(&self) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .commands
            .values()
            .filter(|c| !c.flags.dev_only && !c.flags.global_admin_only)
            .map(|c| (c.trigger.clone(), c.description.clone()))
            .collect();
        list.sort();
        list
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Split `/trigger@bot args` into a lowercase trigger and its arguments.
///
/// Returns `None` for text that is not a command or is addressed to a
/// different bot.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<(String, String)> {
    let rest = text.trim_start().strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let trigger = match head.split_once('@') {
        Some((trigger, target)) => {
            if let Some(me) = bot_username
                && !target.eq_ignore_ascii_case(me)
            {
                return None;
            }
            trigger
        },
        None => head,
    };
    if trigger.is_empty() {
        return None;
    }
    Some((trigger.to_lowercase(), args.to_string()))
}

// ── Access ───────────────────────────────────────────────────────────────────

/// Why a command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Sender is blocked; stay silent.
    Blocked,
    NotInGroup,
    NotAllowed,
}

impl Denial {
    /// Localized string key to reply with, if any.
    pub fn message_key(self) -> Option<&'static str> {
        match self {
            Self::Blocked => None,
            Self::NotInGroup => Some("NotInGroup"),
            Self::NotAllowed => Some("NotAllowed"),
        }
    }
}

/// Check a command's flags against the sender and chat.
pub async fn authorize(
    flags: CommandFlags,
    state: &GatewayState,
    update: &InboundUpdate,
) -> Result<(), Denial> {
    let sender = update.sender.as_ref().map(|s| s.id);

    if flags.blockable && sender.is_some_and(|id| state.is_blocked(id)) {
        return Err(Denial::Blocked);
    }
    if flags.in_group_only && !update.chat_kind.is_group() {
        return Err(Denial::NotInGroup);
    }
    if flags.dev_only && !sender.is_some_and(|id| state.is_dev(id)) {
        return Err(Denial::NotAllowed);
    }
    if flags.global_admin_only && !sender.is_some_and(|id| state.is_global_admin(id)) {
        return Err(Denial::NotAllowed);
    }
    if flags.group_admin_only {
        let Some(id) = sender else {
            return Err(Denial::NotAllowed);
        };
        if !update.chat_kind.is_group() {
            return Err(Denial::NotInGroup);
        }
        if !state.is_global_admin(id) && !state.admins.is_admin(update.chat_id, id).await {
            return Err(Denial::NotAllowed);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;

    use {
        super::*,
        crate::test_support::{group_message, private_message, state_with_access},
        howl_config::AccessConfig,
    };

    fn noop() -> HandlerFn {
        Box::new(|_ctx| Box::pin(async { Ok(None) }))
    }

    #[rstest]
    #[case("/startgame", None, Some(("startgame", "")))]
    #[case("/StartGame extra args ", None, Some(("startgame", "extra args")))]
    #[case("/ping@howl_bot", Some("howl_bot"), Some(("ping", "")))]
    #[case("/ping@HOWL_BOT now", Some("howl_bot"), Some(("ping", "now")))]
    #[case("/ping@other_bot", Some("howl_bot"), None)]
    #[case("/ping@other_bot", None, Some(("ping", "")))]
    #[case("ping", None, None)]
    #[case("/", None, None)]
    #[case("/@howl_bot", Some("howl_bot"), None)]
    fn parse_command_cases(
        #[case] text: &str,
        #[case] bot: Option<&str>,
        #[case] expected: Option<(&str, &str)>,
    ) {
        let parsed = parse_command(text, bot);
        let expected = expected.map(|(t, a)| (t.to_string(), a.to_string()));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn builder_rejects_duplicates() {
        let err = CommandTable::builder()
            .command(Command::new("ping", "", noop()))
            .command(Command::new("PING", "", noop()))
            .build()
            .unwrap_err();
        assert!(matches!(err, CommandError::DuplicateTrigger(t) if t == "ping"));
    }

    #[rstest]
    #[case("")]
    #[case("two words")]
    #[case("/slash")]
    #[case("at@bot")]
    fn builder_rejects_invalid_triggers(#[case] trigger: &str) {
        let err = CommandTable::builder()
            .command(Command::new(trigger, "", noop()))
            .build()
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidTrigger(_)));
    }

    #[test]
    fn public_descriptions_hide_privileged() {
        let table = CommandTable::builder()
            .command(Command::new("ping", "Check", noop()))
            .command(Command::new("nodes", "List", noop()).dev_only())
            .command(Command::new("stats", "Stats", noop()).global_admin_only())
            .build()
            .unwrap();
        assert_eq!(table.triggers(), vec!["nodes", "ping", "stats"]);
        assert_eq!(table.public_descriptions(), vec![(
            "ping".to_string(),
            "Check".to_string()
        )]);
    }

    fn access() -> AccessConfig {
        AccessConfig {
            dev_user_ids: vec![1],
            admin_user_ids: vec![2],
            blocked_user_ids: vec![3],
        }
    }

    #[rstest]
    #[case::blocked_user(CommandFlags { blockable: true, ..Default::default() }, 3, true, Err(Denial::Blocked))]
    #[case::blocked_but_not_blockable(CommandFlags::default(), 3, true, Ok(()))]
    #[case::group_only_in_private(CommandFlags { in_group_only: true, ..Default::default() }, 4, false, Err(Denial::NotInGroup))]
    #[case::group_only_in_group(CommandFlags { in_group_only: true, ..Default::default() }, 4, true, Ok(()))]
    #[case::dev_only_dev(CommandFlags { dev_only: true, ..Default::default() }, 1, false, Ok(()))]
    #[case::dev_only_admin(CommandFlags { dev_only: true, ..Default::default() }, 2, false, Err(Denial::NotAllowed))]
    #[case::admin_only_admin(CommandFlags { global_admin_only: true, ..Default::default() }, 2, false, Ok(()))]
    #[case::admin_only_dev(CommandFlags { global_admin_only: true, ..Default::default() }, 1, false, Ok(()))]
    #[case::admin_only_user(CommandFlags { global_admin_only: true, ..Default::default() }, 4, false, Err(Denial::NotAllowed))]
    #[case::group_admin_chat_admin(CommandFlags { group_admin_only: true, ..Default::default() }, 50, true, Ok(()))]
    #[case::group_admin_plain_member(CommandFlags { group_admin_only: true, ..Default::default() }, 4, true, Err(Denial::NotAllowed))]
    #[case::group_admin_global_admin(CommandFlags { group_admin_only: true, ..Default::default() }, 2, true, Ok(()))]
    #[tokio::test]
    async fn authorize_cases(
        #[case] flags: CommandFlags,
        #[case] user: i64,
        #[case] in_group: bool,
        #[case] expected: Result<(), Denial>,
    ) {
        let fx = state_with_access(access());
        let update = if in_group {
            group_message(-100, user, "/x")
        } else {
            private_message(user, "/x")
        };
        assert_eq!(authorize(flags, &fx.state, &update).await, expected);
    }

    #[test]
    fn denial_keys() {
        assert_eq!(Denial::Blocked.message_key(), None);
        assert_eq!(Denial::NotInGroup.message_key(), Some("NotInGroup"));
    }
}
