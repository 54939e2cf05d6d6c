//! Application command data model
//!
//! Commands are plain data here: what a command is named, where it lives
//! (global or one guild), and what options it takes. Dispatch callbacks are
//! attached separately by the interaction router, and the reconciler uses
//! [`CommandData::matches_remote`] to decide whether a remote definition
//! needs a write.
//!
//! Command kinds are a closed enum rather than a class-per-kind hierarchy,
//! so every consumer matches exhaustively and adding a kind is a compile
//! error until each site handles it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{HotclawError, Result};

/// Slash command names: lowercase, 1-32 chars, word characters and hyphens.
static SLASH_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]{1,32}$").expect("valid regex"));

/// What flavor of application command this is.
///
/// The wire protocol numbers these 1 (chat input), 2 (user context menu),
/// 3 (message context menu).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// A chat-input ("slash") command.
    Slash,
    /// A context-menu command on a user.
    UserContext,
    /// A context-menu command on a message.
    MessageContext,
}

impl CommandKind {
    /// The numeric command type used on the wire.
    pub fn wire_type(&self) -> u8 {
        match self {
            CommandKind::Slash => 1,
            CommandKind::UserContext => 2,
            CommandKind::MessageContext => 3,
        }
    }

    /// Parses a wire command type. Unknown numbers yield `None`.
    pub fn from_wire(value: u8) -> Option<CommandKind> {
        match value {
            1 => Some(CommandKind::Slash),
            2 => Some(CommandKind::UserContext),
            3 => Some(CommandKind::MessageContext),
            _ => None,
        }
    }
}

/// The kind of a command option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    SubCommand,
    SubCommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
}

impl OptionKind {
    /// The numeric option type used on the wire.
    pub fn wire_type(&self) -> u8 {
        match self {
            OptionKind::SubCommand => 1,
            OptionKind::SubCommandGroup => 2,
            OptionKind::String => 3,
            OptionKind::Integer => 4,
            OptionKind::Boolean => 5,
            OptionKind::User => 6,
            OptionKind::Channel => 7,
            OptionKind::Role => 8,
            OptionKind::Mentionable => 9,
            OptionKind::Number => 10,
        }
    }
}

/// A fixed choice offered for an option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandChoice {
    pub name: String,
    pub value: Value,
}

/// One option accepted by a slash command.
///
/// Sub-commands nest further options in `options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<CommandChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
}

impl CommandOption {
    /// Creates an option of the given kind with no choices or children.
    pub fn new(name: &str, description: &str, kind: OptionKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: false,
            choices: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Creates a required string option.
    pub fn string(name: &str, description: &str) -> Self {
        let mut opt = Self::new(name, description, OptionKind::String);
        opt.required = true;
        opt
    }

    /// Marks the option required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Adds a fixed choice.
    pub fn with_choice(mut self, name: &str, value: Value) -> Self {
        self.choices.push(CommandChoice {
            name: name.to_string(),
            value,
        });
        self
    }

    /// Adds a nested option (for sub-commands and groups).
    pub fn with_option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }
}

/// Where a command is registered.
///
/// Guild commands are visible in one guild and update instantly; global
/// commands are visible everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandScope {
    Global,
    Guild(String),
}

impl CommandScope {
    /// The scope part of a routing key: a guild id, or `"global"`.
    pub fn key_part(&self) -> &str {
        match self {
            CommandScope::Global => "global",
            CommandScope::Guild(id) => id,
        }
    }

    /// Builds the routing key for a command name in this scope.
    ///
    /// # Example
    ///
    /// ```
    /// use hotclaw::interactions::command::CommandScope;
    ///
    /// assert_eq!(CommandScope::Global.routing_key("ping"), "ping-global");
    /// let guild = CommandScope::Guild("123".to_string());
    /// assert_eq!(guild.routing_key("ping"), "ping-123");
    /// ```
    pub fn routing_key(&self, name: &str) -> String {
        format!("{}-{}", name, self.key_part())
    }
}

impl std::fmt::Display for CommandScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandScope::Global => write!(f, "global"),
            CommandScope::Guild(id) => write!(f, "guild {}", id),
        }
    }
}

/// The definition of an application command, minus any callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandData {
    pub name: String,
    /// Only meaningful for slash commands; context menus carry no description.
    #[serde(default)]
    pub description: String,
    pub kind: CommandKind,
    #[serde(default = "default_permission_default")]
    pub default_permission: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
}

fn default_permission_default() -> bool {
    true
}

impl CommandData {
    /// Creates a slash command definition.
    pub fn slash(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind: CommandKind::Slash,
            default_permission: true,
            options: Vec::new(),
        }
    }

    /// Creates a user context-menu command definition.
    pub fn user_context(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            kind: CommandKind::UserContext,
            default_permission: true,
            options: Vec::new(),
        }
    }

    /// Creates a message context-menu command definition.
    pub fn message_context(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            kind: CommandKind::MessageContext,
            default_permission: true,
            options: Vec::new(),
        }
    }

    /// Adds an option.
    pub fn with_option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    /// Sets the default permission flag.
    pub fn with_default_permission(mut self, allowed: bool) -> Self {
        self.default_permission = allowed;
        self
    }

    /// Validates the definition against wire constraints.
    ///
    /// # Errors
    ///
    /// - `HotclawError::InvalidDefinition` if the name is malformed for the
    ///   command kind
    /// - `HotclawError::InvalidDefinition` if a slash description is missing
    ///   or too long, or a context command carries one
    /// - `HotclawError::InvalidDefinition` if a context command carries
    ///   options, or a slash command has more than 25
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            CommandKind::Slash => {
                if !SLASH_NAME_RE.is_match(&self.name) {
                    return Err(HotclawError::InvalidDefinition(format!(
                        "Slash command name '{}' must be 1-32 lowercase word characters",
                        self.name
                    )));
                }
                if self.description.is_empty() || self.description.len() > 100 {
                    return Err(HotclawError::InvalidDefinition(format!(
                        "Slash command '{}' needs a description of 1-100 characters",
                        self.name
                    )));
                }
            }
            CommandKind::UserContext | CommandKind::MessageContext => {
                if self.name.is_empty() || self.name.len() > 32 {
                    return Err(HotclawError::InvalidDefinition(format!(
                        "Context command name '{}' must be 1-32 characters",
                        self.name
                    )));
                }
                if !self.description.is_empty() {
                    return Err(HotclawError::InvalidDefinition(format!(
                        "Context command '{}' cannot have a description",
                        self.name
                    )));
                }
                if !self.options.is_empty() {
                    return Err(HotclawError::InvalidDefinition(format!(
                        "Context command '{}' cannot have options",
                        self.name
                    )));
                }
            }
        }

        if self.options.len() > 25 {
            return Err(HotclawError::InvalidDefinition(format!(
                "Command '{}' has {} options; the limit is 25",
                self.name,
                self.options.len()
            )));
        }

        for option in &self.options {
            if !SLASH_NAME_RE.is_match(&option.name) {
                return Err(HotclawError::InvalidDefinition(format!(
                    "Option name '{}' on command '{}' must be 1-32 lowercase word characters",
                    option.name, self.name
                )));
            }
            if option.description.is_empty() || option.description.len() > 100 {
                return Err(HotclawError::InvalidDefinition(format!(
                    "Option '{}' on command '{}' needs a description of 1-100 characters",
                    option.name, self.name
                )));
            }
        }

        Ok(())
    }

    /// Compares this definition with a remote one, field by field.
    ///
    /// Returns `true` when the remote command already matches and no write
    /// is needed. Each differing field is logged at debug level so a sync
    /// run can be traced.
    ///
    /// Descriptions are compared only for slash commands; context menus do
    /// not carry one. Options are compared deeply and order matters, since
    /// the wire representation is ordered.
    pub fn matches_remote(&self, remote: &CommandData) -> bool {
        if self.name != remote.name {
            debug!(
                local = %self.name,
                remote = %remote.name,
                "Command name differs from remote"
            );
            return false;
        }
        if self.kind != remote.kind {
            debug!(command = %self.name, "Command kind differs from remote");
            return false;
        }
        if self.default_permission != remote.default_permission {
            debug!(command = %self.name, "Command default_permission differs from remote");
            return false;
        }
        if self.kind == CommandKind::Slash && self.description != remote.description {
            debug!(command = %self.name, "Command description differs from remote");
            return false;
        }
        if self.options != remote.options {
            debug!(command = %self.name, "Command options differ from remote");
            return false;
        }
        true
    }
}

/// A command as it exists remotely: its definition plus the id assigned
/// by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommand {
    pub id: String,
    #[serde(flatten)]
    pub data: CommandData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_types() {
        assert_eq!(CommandKind::Slash.wire_type(), 1);
        assert_eq!(CommandKind::UserContext.wire_type(), 2);
        assert_eq!(CommandKind::MessageContext.wire_type(), 3);

        assert_eq!(CommandKind::from_wire(1), Some(CommandKind::Slash));
        assert_eq!(CommandKind::from_wire(3), Some(CommandKind::MessageContext));
        assert_eq!(CommandKind::from_wire(9), None);
    }

    #[test]
    fn test_option_wire_types() {
        assert_eq!(OptionKind::SubCommand.wire_type(), 1);
        assert_eq!(OptionKind::String.wire_type(), 3);
        assert_eq!(OptionKind::Number.wire_type(), 10);
    }

    #[test]
    fn test_scope_routing_key() {
        assert_eq!(CommandScope::Global.routing_key("ping"), "ping-global");
        assert_eq!(
            CommandScope::Guild("42".into()).routing_key("ping"),
            "ping-42"
        );
        assert_eq!(CommandScope::Global.key_part(), "global");
        assert_eq!(CommandScope::Guild("42".into()).key_part(), "42");
    }

    #[test]
    fn test_slash_builder() {
        let cmd = CommandData::slash("greet", "Say hello")
            .with_option(CommandOption::string("who", "Who to greet"))
            .with_default_permission(false);

        assert_eq!(cmd.kind, CommandKind::Slash);
        assert_eq!(cmd.name, "greet");
        assert!(!cmd.default_permission);
        assert_eq!(cmd.options.len(), 1);
        assert!(cmd.options[0].required);
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn test_context_builders() {
        let user = CommandData::user_context("Inspect User");
        assert_eq!(user.kind, CommandKind::UserContext);
        assert!(user.validate().is_ok());

        let message = CommandData::message_context("Pin This");
        assert_eq!(message.kind, CommandKind::MessageContext);
        assert!(message.validate().is_ok());
    }

    // ---- validate tests ----

    #[test]
    fn test_validate_slash_uppercase_name() {
        let cmd = CommandData::slash("Greet", "Say hello");
        let err = cmd.validate().unwrap_err();
        assert!(err.to_string().contains("lowercase"));
    }

    #[test]
    fn test_validate_slash_name_with_spaces() {
        let cmd = CommandData::slash("say hello", "Say hello");
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_validate_slash_name_too_long() {
        let cmd = CommandData::slash(&"a".repeat(33), "desc");
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_validate_slash_missing_description() {
        let cmd = CommandData::slash("greet", "");
        let err = cmd.validate().unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn test_validate_slash_description_too_long() {
        let cmd = CommandData::slash("greet", &"d".repeat(101));
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_validate_context_name_can_have_spaces() {
        let cmd = CommandData::user_context("Show Profile");
        assert!(cmd.validate().is_ok());
    }

    #[test]
    fn test_validate_context_with_description_rejected() {
        let mut cmd = CommandData::user_context("Show Profile");
        cmd.description = "not allowed".to_string();
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_validate_context_with_options_rejected() {
        let mut cmd = CommandData::message_context("Pin This");
        cmd.options.push(CommandOption::string("x", "y"));
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_validate_bad_option_name() {
        let cmd = CommandData::slash("greet", "Say hello")
            .with_option(CommandOption::string("Who", "Who to greet"));
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_validate_too_many_options() {
        let mut cmd = CommandData::slash("greet", "Say hello");
        for i in 0..26 {
            cmd.options
                .push(CommandOption::string(&format!("opt{}", i), "An option"));
        }
        let err = cmd.validate().unwrap_err();
        assert!(err.to_string().contains("25"));
    }

    // ---- matches_remote tests ----

    #[test]
    fn test_matches_remote_identical() {
        let local = CommandData::slash("greet", "Say hello")
            .with_option(CommandOption::string("who", "Who to greet"));
        let remote = local.clone();
        assert!(local.matches_remote(&remote));
    }

    #[test]
    fn test_matches_remote_description_differs() {
        let local = CommandData::slash("greet", "Say hello");
        let mut remote = local.clone();
        remote.description = "Say goodbye".to_string();
        assert!(!local.matches_remote(&remote));
    }

    #[test]
    fn test_matches_remote_description_ignored_for_context() {
        // Context menus have no description on the wire, so a stray value
        // on either side must not force an update.
        let local = CommandData::user_context("Show Profile");
        let mut remote = local.clone();
        remote.description = "whatever came back".to_string();
        assert!(local.matches_remote(&remote));
    }

    #[test]
    fn test_matches_remote_kind_differs() {
        let local = CommandData::slash("greet", "Say hello");
        let mut remote = local.clone();
        remote.kind = CommandKind::UserContext;
        assert!(!local.matches_remote(&remote));
    }

    #[test]
    fn test_matches_remote_permission_differs() {
        let local = CommandData::slash("greet", "Say hello");
        let remote = local.clone().with_default_permission(false);
        assert!(!local.matches_remote(&remote));
    }

    #[test]
    fn test_matches_remote_option_changed() {
        let local = CommandData::slash("greet", "Say hello")
            .with_option(CommandOption::string("who", "Who to greet"));
        let mut remote = local.clone();
        remote.options[0].required = false;
        assert!(!local.matches_remote(&remote));
    }

    #[test]
    fn test_matches_remote_option_order_matters() {
        let a = CommandOption::string("first", "First option");
        let b = CommandOption::string("second", "Second option");
        let local = CommandData::slash("greet", "Say hello")
            .with_option(a.clone())
            .with_option(b.clone());
        let remote = CommandData::slash("greet", "Say hello")
            .with_option(b)
            .with_option(a);
        assert!(!local.matches_remote(&remote));
    }

    #[test]
    fn test_matches_remote_nested_options() {
        let sub = CommandOption::new("add", "Add a thing", OptionKind::SubCommand)
            .with_option(CommandOption::string("name", "Thing name"));
        let local = CommandData::slash("things", "Manage things").with_option(sub.clone());
        let remote = local.clone();
        assert!(local.matches_remote(&remote));

        let mut changed = remote.clone();
        changed.options[0].options[0].description = "Different".to_string();
        assert!(!local.matches_remote(&changed));
    }

    #[test]
    fn test_serde_roundtrip() {
        let cmd = CommandData::slash("greet", "Say hello").with_option(
            CommandOption::string("who", "Who to greet").with_choice("world", json!("world")),
        );
        let serialized = serde_json::to_string(&cmd).unwrap();
        let parsed: CommandData = serde_json::from_str(&serialized).unwrap();
        assert_eq!(cmd, parsed);
    }

    #[test]
    fn test_remote_command_flatten() {
        let remote = RemoteCommand {
            id: "100".to_string(),
            data: CommandData::slash("greet", "Say hello"),
        };
        let value = serde_json::to_value(&remote).unwrap();
        assert_eq!(value["id"], "100");
        assert_eq!(value["name"], "greet");
    }
}
