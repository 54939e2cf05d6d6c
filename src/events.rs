//! Runtime event vocabulary for hotclaw
//!
//! This module defines the closed set of events the runtime understands and
//! the static table that ties each event to its two external spellings:
//! the camelCase name used on the gateway wire and the snake_case handler
//! field plugins use to subscribe.
//!
//! The table is the single source of truth. Lookups in either direction go
//! through maps built from it once at first use, so an event name that is
//! not in the table is rejected instead of silently creating a new event
//! channel at runtime.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of runtime events.
///
/// Every event the bus can carry is one of these variants. Plugins subscribe
/// by variant; inbound gateway payloads are translated to a variant through
/// [`EventKind::from_gateway_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The gateway session is established and commands can be synced.
    #[serde(rename = "ready")]
    Ready,
    /// A slash command, component, or modal interaction arrived.
    #[serde(rename = "interactionCreate")]
    InteractionCreate,
    #[serde(rename = "messageCreate")]
    MessageCreate,
    #[serde(rename = "messageUpdate")]
    MessageUpdate,
    #[serde(rename = "messageDelete")]
    MessageDelete,
    #[serde(rename = "messageReactionAdd")]
    ReactionAdd,
    #[serde(rename = "messageReactionRemove")]
    ReactionRemove,
    #[serde(rename = "guildMemberAdd")]
    MemberAdd,
    #[serde(rename = "guildMemberRemove")]
    MemberRemove,
    #[serde(rename = "guildCreate")]
    GuildCreate,
    #[serde(rename = "guildDelete")]
    GuildDelete,
    #[serde(rename = "voiceStateUpdate")]
    VoiceStateUpdate,
}

/// One row of the static event table.
struct EventSpec {
    kind: EventKind,
    /// camelCase name as it appears on the gateway wire.
    gateway_name: &'static str,
    /// snake_case field name plugins use in their handler maps.
    handler_field: &'static str,
}

/// The static event table. Order here defines [`EventKind::all`] order.
static EVENT_TABLE: &[EventSpec] = &[
    EventSpec {
        kind: EventKind::Ready,
        gateway_name: "ready",
        handler_field: "on_ready",
    },
    EventSpec {
        kind: EventKind::InteractionCreate,
        gateway_name: "interactionCreate",
        handler_field: "on_interaction_create",
    },
    EventSpec {
        kind: EventKind::MessageCreate,
        gateway_name: "messageCreate",
        handler_field: "on_message_create",
    },
    EventSpec {
        kind: EventKind::MessageUpdate,
        gateway_name: "messageUpdate",
        handler_field: "on_message_update",
    },
    EventSpec {
        kind: EventKind::MessageDelete,
        gateway_name: "messageDelete",
        handler_field: "on_message_delete",
    },
    EventSpec {
        kind: EventKind::ReactionAdd,
        gateway_name: "messageReactionAdd",
        handler_field: "on_reaction_add",
    },
    EventSpec {
        kind: EventKind::ReactionRemove,
        gateway_name: "messageReactionRemove",
        handler_field: "on_reaction_remove",
    },
    EventSpec {
        kind: EventKind::MemberAdd,
        gateway_name: "guildMemberAdd",
        handler_field: "on_member_add",
    },
    EventSpec {
        kind: EventKind::MemberRemove,
        gateway_name: "guildMemberRemove",
        handler_field: "on_member_remove",
    },
    EventSpec {
        kind: EventKind::GuildCreate,
        gateway_name: "guildCreate",
        handler_field: "on_guild_create",
    },
    EventSpec {
        kind: EventKind::GuildDelete,
        gateway_name: "guildDelete",
        handler_field: "on_guild_delete",
    },
    EventSpec {
        kind: EventKind::VoiceStateUpdate,
        gateway_name: "voiceStateUpdate",
        handler_field: "on_voice_state_update",
    },
];

/// Lookup map from gateway wire name to event kind.
static BY_GATEWAY_NAME: Lazy<HashMap<&'static str, EventKind>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(EVENT_TABLE.len());
    for spec in EVENT_TABLE {
        let previous = map.insert(spec.gateway_name, spec.kind);
        debug_assert!(previous.is_none(), "duplicate gateway name in event table");
    }
    map
});

/// Lookup map from handler field name to event kind.
static BY_HANDLER_FIELD: Lazy<HashMap<&'static str, EventKind>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(EVENT_TABLE.len());
    for spec in EVENT_TABLE {
        let previous = map.insert(spec.handler_field, spec.kind);
        debug_assert!(previous.is_none(), "duplicate handler field in event table");
    }
    map
});

impl EventKind {
    /// Returns all event kinds in table order.
    pub fn all() -> Vec<EventKind> {
        EVENT_TABLE.iter().map(|spec| spec.kind).collect()
    }

    /// Returns the camelCase name used on the gateway wire.
    ///
    /// # Example
    ///
    /// ```
    /// use hotclaw::events::EventKind;
    ///
    /// assert_eq!(EventKind::MessageCreate.gateway_name(), "messageCreate");
    /// assert_eq!(EventKind::ReactionAdd.gateway_name(), "messageReactionAdd");
    /// ```
    pub fn gateway_name(&self) -> &'static str {
        EVENT_TABLE
            .iter()
            .find(|spec| spec.kind == *self)
            .map(|spec| spec.gateway_name)
            .unwrap_or("unknown")
    }

    /// Returns the snake_case handler field name plugins subscribe with.
    pub fn handler_field(&self) -> &'static str {
        EVENT_TABLE
            .iter()
            .find(|spec| spec.kind == *self)
            .map(|spec| spec.handler_field)
            .unwrap_or("unknown")
    }

    /// Looks up an event kind by its gateway wire name.
    ///
    /// Returns `None` for names outside the closed set, which callers should
    /// treat as "not an event this runtime handles".
    pub fn from_gateway_name(name: &str) -> Option<EventKind> {
        BY_GATEWAY_NAME.get(name).copied()
    }

    /// Looks up an event kind by its handler field name.
    pub fn from_handler_field(field: &str) -> Option<EventKind> {
        BY_HANDLER_FIELD.get(field).copied()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.gateway_name())
    }
}

/// A single runtime event: a kind plus its positional JSON arguments.
///
/// Arguments mirror the gateway payload for the event. For
/// [`EventKind::InteractionCreate`] the first argument is the raw
/// interaction object.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub args: Vec<Value>,
}

impl Event {
    /// Creates a new event with the given kind and arguments.
    pub fn new(kind: EventKind, args: Vec<Value>) -> Self {
        Self { kind, args }
    }

    /// Creates an event with no arguments.
    pub fn empty(kind: EventKind) -> Self {
        Self { kind, args: Vec::new() }
    }

    /// Returns the argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_covers_all_kinds() {
        // Every kind resolves to a table row in both directions.
        for kind in EventKind::all() {
            assert_ne!(kind.gateway_name(), "unknown");
            assert_ne!(kind.handler_field(), "unknown");
            assert_eq!(EventKind::from_gateway_name(kind.gateway_name()), Some(kind));
            assert_eq!(EventKind::from_handler_field(kind.handler_field()), Some(kind));
        }
    }

    #[test]
    fn test_table_names_are_unique() {
        let kinds = EventKind::all();
        let gateway: std::collections::HashSet<_> =
            kinds.iter().map(|k| k.gateway_name()).collect();
        let fields: std::collections::HashSet<_> =
            kinds.iter().map(|k| k.handler_field()).collect();
        assert_eq!(gateway.len(), kinds.len());
        assert_eq!(fields.len(), kinds.len());
    }

    #[test]
    fn test_gateway_names() {
        assert_eq!(EventKind::Ready.gateway_name(), "ready");
        assert_eq!(
            EventKind::InteractionCreate.gateway_name(),
            "interactionCreate"
        );
        assert_eq!(EventKind::ReactionAdd.gateway_name(), "messageReactionAdd");
        assert_eq!(EventKind::MemberRemove.gateway_name(), "guildMemberRemove");
    }

    #[test]
    fn test_handler_fields() {
        assert_eq!(EventKind::Ready.handler_field(), "on_ready");
        assert_eq!(
            EventKind::VoiceStateUpdate.handler_field(),
            "on_voice_state_update"
        );
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert_eq!(EventKind::from_gateway_name("notAnEvent"), None);
        assert_eq!(EventKind::from_gateway_name("message_create"), None);
        assert_eq!(EventKind::from_handler_field("on_not_an_event"), None);
        assert_eq!(EventKind::from_handler_field("messageCreate"), None);
    }

    #[test]
    fn test_serde_matches_gateway_name() {
        // The serialized form of a kind is exactly its gateway name.
        for kind in EventKind::all() {
            let serialized = serde_json::to_value(kind).unwrap();
            assert_eq!(serialized, json!(kind.gateway_name()));
            let parsed: EventKind = serde_json::from_value(serialized).unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_display_uses_gateway_name() {
        assert_eq!(EventKind::MessageCreate.to_string(), "messageCreate");
    }

    #[test]
    fn test_event_args() {
        let event = Event::new(
            EventKind::MessageCreate,
            vec![json!({"content": "hi"}), json!("extra")],
        );
        assert_eq!(event.arg(0).unwrap()["content"], "hi");
        assert_eq!(event.arg(1).unwrap(), "extra");
        assert!(event.arg(2).is_none());

        let empty = Event::empty(EventKind::Ready);
        assert!(empty.args.is_empty());
    }
}
