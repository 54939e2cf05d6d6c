//! Interaction routing for hotclaw
//!
//! One router instance owns three callback tables and feeds them from
//! `InteractionCreate` events:
//!
//! - Commands, keyed by name and scope. The lookup key embeds the
//!   interaction's own guild (or `global`), so a guild interaction only
//!   ever matches a binding for that exact guild.
//! - Components, keyed by the message that carries them. Publishing a
//!   row set replaces the table entry wholesale; the entry records the
//!   intended rows and survives a refused remote publish, so a later
//!   publish can retry.
//! - Modal waiters, keyed by modal custom id and user. A waiter fires at
//!   most once; the submit that consumes it removes it.
//!
//! Dispatch never fails the caller: malformed payloads and missing
//! callbacks are logged and dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::bus::HandlerId;
use crate::client::Client;
use crate::error::{HotclawError, Result};
use crate::events::EventKind;

use super::command::{CommandData, CommandScope};
use super::component::{ActionRow, ComponentPath, Modal};

/// Future returned by an interaction callback.
pub type CallbackFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A callback bound to a command, component, or modal.
pub type InteractionCallback = Arc<dyn Fn(InteractionCtx) -> CallbackFuture + Send + Sync>;

/// What kind of interaction a payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Command,
    Component,
    ModalSubmit,
}

impl InteractionKind {
    /// Maps a wire `type` discriminant. Returns `None` for kinds the
    /// router does not handle (pings, autocomplete).
    pub fn from_wire(wire: u64) -> Option<Self> {
        match wire {
            2 => Some(InteractionKind::Command),
            3 => Some(InteractionKind::Component),
            5 => Some(InteractionKind::ModalSubmit),
            _ => None,
        }
    }

    pub fn wire_type(&self) -> u64 {
        match self {
            InteractionKind::Command => 2,
            InteractionKind::Component => 3,
            InteractionKind::ModalSubmit => 5,
        }
    }
}

/// A parsed interaction payload.
///
/// `values` flattens what the user submitted: leaf command options by
/// option name, modal fields by field custom id, select choices under
/// `"values"`. Anything not captured here is still available in `raw`.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub id: String,
    pub kind: InteractionKind,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    /// Set for command interactions.
    pub command_name: Option<String>,
    /// Set for component and modal interactions.
    pub custom_id: Option<String>,
    /// Set for component interactions: the message carrying the rows.
    pub message_id: Option<String>,
    pub values: Map<String, Value>,
    pub raw: Value,
}

impl Interaction {
    /// Parses a gateway payload. Returns `None` when the payload is not
    /// an interaction the router handles.
    pub fn parse(payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;
        let id = obj.get("id")?.as_str()?.to_string();
        let kind = InteractionKind::from_wire(obj.get("type")?.as_u64()?)?;
        let data = obj.get("data")?.as_object()?;

        let user_id = obj
            .get("member")
            .and_then(|member| member.get("user"))
            .or_else(|| obj.get("user"))
            .and_then(|user| user.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message_id = obj
            .get("message")
            .and_then(|message| message.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let (command_name, custom_id) = match kind {
            InteractionKind::Command => (Some(data.get("name")?.as_str()?.to_string()), None),
            InteractionKind::Component | InteractionKind::ModalSubmit => {
                (None, Some(data.get("custom_id")?.as_str()?.to_string()))
            }
        };

        let mut values = Map::new();
        match kind {
            InteractionKind::Command => collect_option_values(data.get("options"), &mut values),
            InteractionKind::ModalSubmit => collect_modal_values(data, &mut values),
            InteractionKind::Component => {
                if let Some(selected) = data.get("values") {
                    values.insert("values".to_string(), selected.clone());
                }
            }
        }

        Some(Self {
            id,
            kind,
            guild_id: string_field(obj, "guild_id"),
            channel_id: string_field(obj, "channel_id"),
            user_id,
            command_name,
            custom_id,
            message_id,
            values,
            raw: payload.clone(),
        })
    }

    /// A submitted value by option name or field custom id.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// A submitted string value by option name or field custom id.
    pub fn string_value(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Flattens leaf command options into `out`, walking through sub-command
/// levels. Group and sub-command names themselves carry no value.
fn collect_option_values(options: Option<&Value>, out: &mut Map<String, Value>) {
    let Some(array) = options.and_then(Value::as_array) else {
        return;
    };
    for option in array {
        if let (Some(name), Some(value)) = (
            option.get("name").and_then(Value::as_str),
            option.get("value"),
        ) {
            out.insert(name.to_string(), value.clone());
        }
        collect_option_values(option.get("options"), out);
    }
}

fn collect_modal_values(data: &Map<String, Value>, out: &mut Map<String, Value>) {
    let Some(rows) = data.get("components").and_then(Value::as_array) else {
        return;
    };
    for row in rows {
        let Some(fields) = row.get("components").and_then(Value::as_array) else {
            continue;
        };
        for field in fields {
            if let (Some(custom_id), Some(value)) = (
                field.get("custom_id").and_then(Value::as_str),
                field.get("value"),
            ) {
                out.insert(custom_id.to_string(), value.clone());
            }
        }
    }
}

/// A command with its scope and optional callback, as handed to the
/// reconciler for registration.
#[derive(Clone)]
pub struct CommandDefinition {
    pub data: CommandData,
    pub scope: CommandScope,
    pub callback: Option<InteractionCallback>,
}

impl CommandDefinition {
    /// Starts a global definition without a callback.
    pub fn new(data: CommandData) -> Self {
        Self {
            data,
            scope: CommandScope::Global,
            callback: None,
        }
    }

    /// Scopes the command to one guild.
    pub fn guild(mut self, guild_id: &str) -> Self {
        self.scope = CommandScope::Guild(guild_id.to_string());
        self
    }

    pub fn scoped(mut self, scope: CommandScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the callback invoked when the command is used.
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(InteractionCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callback = Some(Arc::new(move |ctx| Box::pin(handler(ctx))));
        self
    }

    /// The routing key this definition binds under.
    pub fn routing_key(&self) -> String {
        self.scope.routing_key(&self.data.name)
    }
}

impl std::fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.data.name)
            .field("scope", &self.scope)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Component rows plus the callbacks behind their custom ids, published
/// to one message as a unit.
#[derive(Default)]
pub struct ComponentRowSet {
    rows: Vec<ActionRow>,
    callbacks: HashMap<String, InteractionCallback>,
}

impl ComponentRowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row.
    pub fn row(mut self, row: ActionRow) -> Self {
        self.rows.push(row);
        self
    }

    /// Binds a callback to a component custom id in this set.
    pub fn on<F, Fut>(mut self, custom_id: &str, callback: F) -> Self
    where
        F: Fn(InteractionCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.insert(
            custom_id.to_string(),
            Arc::new(move |ctx| Box::pin(callback(ctx))),
        );
        self
    }

    pub fn rows(&self) -> &[ActionRow] {
        &self.rows
    }

    /// Checks the set: every row valid, at most five rows, and every
    /// callback attached to a custom id some row actually shows.
    ///
    /// # Errors
    ///
    /// - `HotclawError::InvalidDefinition` if a row is invalid or there
    ///   are too many
    /// - `HotclawError::Registration` if a callback matches no component
    pub fn validate(&self) -> Result<()> {
        if self.rows.len() > 5 {
            return Err(HotclawError::InvalidDefinition(format!(
                "A message holds at most 5 component rows, got {}",
                self.rows.len()
            )));
        }
        for row in &self.rows {
            row.validate()?;
        }
        for custom_id in self.callbacks.keys() {
            if !self.contains_custom_id(custom_id) {
                return Err(HotclawError::Registration(format!(
                    "Callback '{}' matches no component in the set",
                    custom_id
                )));
            }
        }
        Ok(())
    }

    fn contains_custom_id(&self, custom_id: &str) -> bool {
        self.rows
            .iter()
            .flat_map(|row| row.components.iter())
            .any(|component| component.custom_id() == Some(custom_id))
    }

    fn into_parts(self) -> (Vec<ActionRow>, HashMap<String, InteractionCallback>) {
        (self.rows, self.callbacks)
    }
}

struct RowSetEntry {
    rows: Vec<ActionRow>,
    callbacks: HashMap<String, InteractionCallback>,
}

struct RouterInner {
    client: Client,
    /// Routing key (`name-scope`) to the bound callback. A key mapping
    /// to `None` is a registered command nobody handles locally.
    commands: RwLock<HashMap<String, Option<InteractionCallback>>>,
    /// Message path key (`channel/message`) to its published row set.
    components: RwLock<HashMap<String, RowSetEntry>>,
    /// Waiter key (`custom_id/user_id`) to the pending submit callback.
    modals: Mutex<HashMap<String, InteractionCallback>>,
}

/// Routes interactions to bound callbacks. Cheap to clone; clones share
/// the tables.
///
/// # Example
///
/// ```ignore
/// let router = InteractionRouter::new(client.clone());
/// router.attach().await;
///
/// router
///     .publish_components(
///         &ComponentPath::new("chan-1", "msg-1"),
///         ComponentRowSet::new()
///             .row(ActionRow::new().with(Component::button(
///                 "confirm",
///                 "Confirm",
///                 ButtonStyle::Primary,
///             )))
///             .on("confirm", |ctx| async move {
///                 println!("confirmed by {:?}", ctx.interaction.user_id);
///                 Ok(())
///             }),
///     )
///     .await?;
/// ```
#[derive(Clone)]
pub struct InteractionRouter {
    inner: Arc<RouterInner>,
}

impl InteractionRouter {
    pub fn new(client: Client) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                client,
                commands: RwLock::new(HashMap::new()),
                components: RwLock::new(HashMap::new()),
                modals: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribes the router to `InteractionCreate` on the client's bus.
    /// The first event argument is taken as the interaction payload.
    pub async fn attach(&self) -> HandlerId {
        let router = self.clone();
        self.inner
            .client
            .on(EventKind::InteractionCreate, move |event| {
                let router = router.clone();
                async move {
                    match event.args.into_iter().next() {
                        Some(payload) => {
                            router.dispatch(payload).await;
                        }
                        None => warn!("Interaction event without payload"),
                    }
                    Ok(())
                }
            })
            .await
    }

    /// Binds a command definition into the routing table. Rebinding the
    /// same routing key replaces the callback.
    pub async fn bind_command(&self, definition: &CommandDefinition) {
        let key = definition.routing_key();
        let mut commands = self.inner.commands.write().await;
        if commands
            .insert(key.clone(), definition.callback.clone())
            .is_some()
        {
            debug!(key = %key, "Rebound command callback");
        }
    }

    /// Publishes component rows to a message and records their callbacks.
    ///
    /// The table entry is the intended state: it is written before the
    /// gateway call and stays recorded even when the gateway refuses, so
    /// a later publish for the same path can retry.
    ///
    /// # Errors
    ///
    /// - Validation errors from [`ComponentRowSet::validate`]; nothing is
    ///   recorded or published in that case
    /// - `HotclawError::Gateway` if publishing remotely fails; the entry
    ///   remains recorded
    pub async fn publish_components(
        &self,
        path: &ComponentPath,
        set: ComponentRowSet,
    ) -> Result<()> {
        set.validate()?;
        let (rows, callbacks) = set.into_parts();

        {
            let mut components = self.inner.components.write().await;
            components.insert(path.key(), RowSetEntry { rows: rows.clone(), callbacks });
        }

        if let Err(e) = self
            .inner
            .client
            .gateway()
            .publish_components(path, &rows)
            .await
        {
            warn!(path = %path, error = %e, "Component rows recorded but not published");
            return Err(e);
        }

        debug!(path = %path, rows = rows.len(), "Component rows published");
        Ok(())
    }

    /// Forgets the rows recorded for a message, without touching the
    /// message remotely. For when the message is deleted out from under
    /// the router. Returns whether anything was recorded.
    pub async fn forget_components(&self, path: &ComponentPath) -> bool {
        self.inner
            .components
            .write()
            .await
            .remove(&path.key())
            .is_some()
    }

    /// Registers a modal waiter. Returns whether a pending waiter under
    /// the same key was replaced.
    pub(crate) async fn register_modal_waiter(
        &self,
        key: String,
        callback: InteractionCallback,
    ) -> bool {
        self.inner.modals.lock().await.insert(key, callback).is_some()
    }

    pub(crate) async fn remove_modal_waiter(&self, key: &str) -> bool {
        self.inner.modals.lock().await.remove(key).is_some()
    }

    /// Routes one interaction payload to its callback.
    ///
    /// # Returns
    ///
    /// `true` if a callback ran (even if it then returned an error),
    /// `false` if the payload was malformed or nothing was bound.
    pub async fn dispatch(&self, payload: Value) -> bool {
        let interaction = match Interaction::parse(&payload) {
            Some(interaction) => interaction,
            None => {
                warn!("Malformed interaction payload");
                return false;
            }
        };
        match interaction.kind {
            InteractionKind::Command => self.dispatch_command(interaction).await,
            InteractionKind::Component => self.dispatch_component(interaction).await,
            InteractionKind::ModalSubmit => self.dispatch_modal(interaction).await,
        }
    }

    async fn dispatch_command(&self, interaction: Interaction) -> bool {
        let name = match interaction.command_name.clone() {
            Some(name) => name,
            None => return false,
        };

        // Exact-key lookup. A command used in a guild is only served by a
        // binding for that guild, never by the global binding.
        let scope = match interaction.guild_id.clone() {
            Some(guild) => CommandScope::Guild(guild),
            None => CommandScope::Global,
        };
        let key = scope.routing_key(&name);
        let lookup = { self.inner.commands.read().await.get(&key).cloned() };

        match lookup {
            Some(Some(callback)) => self.invoke(callback, interaction).await,
            Some(None) => {
                warn!(key = %key, "No callback bound for command");
                false
            }
            None => {
                debug!(key = %key, "Unrouted command interaction");
                false
            }
        }
    }

    async fn dispatch_component(&self, interaction: Interaction) -> bool {
        let custom_id = match interaction.custom_id.clone() {
            Some(custom_id) => custom_id,
            None => return false,
        };
        let path_key = match (&interaction.channel_id, &interaction.message_id) {
            (Some(channel), Some(message)) => format!("{}/{}", channel, message),
            _ => {
                warn!(custom_id = %custom_id, "Component interaction without message path");
                return false;
            }
        };

        let lookup = {
            let components = self.inner.components.read().await;
            components.get(&path_key).map(|entry| {
                let shown = entry
                    .rows
                    .iter()
                    .flat_map(|row| row.components.iter())
                    .any(|component| component.custom_id() == Some(custom_id.as_str()));
                (shown, entry.callbacks.get(&custom_id).cloned())
            })
        };

        match lookup {
            Some((_, Some(callback))) => self.invoke(callback, interaction).await,
            Some((true, None)) => {
                warn!(path = %path_key, custom_id = %custom_id, "No callback bound for component");
                false
            }
            Some((false, None)) => {
                debug!(path = %path_key, custom_id = %custom_id, "Component no longer shown");
                false
            }
            None => {
                debug!(path = %path_key, "No component rows recorded for message");
                false
            }
        }
    }

    async fn dispatch_modal(&self, interaction: Interaction) -> bool {
        let custom_id = match interaction.custom_id.clone() {
            Some(custom_id) => custom_id,
            None => return false,
        };
        let user_id = match interaction.user_id.clone() {
            Some(user_id) => user_id,
            None => {
                warn!(custom_id = %custom_id, "Modal submit without user");
                return false;
            }
        };

        // Taking the waiter out makes it fire at most once.
        let key = Modal::waiter_key(&custom_id, &user_id);
        let waiter = { self.inner.modals.lock().await.remove(&key) };
        match waiter {
            Some(callback) => self.invoke(callback, interaction).await,
            None => {
                debug!(key = %key, "No waiter for modal submit");
                false
            }
        }
    }

    async fn invoke(&self, callback: InteractionCallback, interaction: Interaction) -> bool {
        let id = interaction.id.clone();
        let ctx = InteractionCtx {
            interaction,
            client: self.inner.client.clone(),
            router: self.clone(),
        };
        if let Err(e) = callback(ctx).await {
            error!(interaction = %id, error = %e, "Interaction callback failed");
        }
        true
    }

    /// Number of bound command routing keys.
    pub async fn command_count(&self) -> usize {
        self.inner.commands.read().await.len()
    }

    /// Number of messages with recorded component rows.
    pub async fn component_count(&self) -> usize {
        self.inner.components.read().await.len()
    }

    /// Number of pending modal waiters.
    pub async fn modal_waiter_count(&self) -> usize {
        self.inner.modals.lock().await.len()
    }
}

/// What a callback gets to work with: the parsed interaction plus the
/// client and router to respond through.
pub struct InteractionCtx {
    pub interaction: Interaction,
    client: Client,
    router: InteractionRouter,
}

impl InteractionCtx {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn router(&self) -> &InteractionRouter {
        &self.router
    }

    /// Shows a modal to the interacting user and arms `on_submit` for
    /// their submission.
    ///
    /// The waiter is registered before the gateway call; if the gateway
    /// refuses the modal, the waiter is removed again so nothing dangles.
    ///
    /// # Errors
    ///
    /// - `HotclawError::InvalidDefinition` if the modal fails validation
    /// - `HotclawError::Registration` if the interaction carries no user
    /// - `HotclawError::Gateway` if showing the modal fails remotely
    pub async fn show_modal<F, Fut>(&self, modal: Modal, on_submit: F) -> Result<()>
    where
        F: Fn(InteractionCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        modal.validate()?;
        let user_id = self.interaction.user_id.clone().ok_or_else(|| {
            HotclawError::Registration(format!(
                "Interaction {} has no user to wait on",
                self.interaction.id
            ))
        })?;

        let key = Modal::waiter_key(&modal.custom_id, &user_id);
        let callback: InteractionCallback = Arc::new(move |ctx| Box::pin(on_submit(ctx)));
        if self
            .router
            .register_modal_waiter(key.clone(), callback)
            .await
        {
            warn!(key = %key, "Replaced pending modal waiter");
        }

        if let Err(e) = self
            .client
            .gateway()
            .show_modal(&self.interaction.id, &modal)
            .await
        {
            self.router.remove_modal_waiter(&key).await;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::interactions::component::{ButtonStyle, Component, ModalField};
    use crate::testing::TestGateway;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_client() -> (Client, Arc<TestGateway>) {
        let gateway = Arc::new(TestGateway::new());
        (Client::new(gateway.clone()), gateway)
    }

    fn counting_callback(counter: Arc<AtomicUsize>) -> impl Fn(InteractionCtx) -> CallbackFuture {
        move |_ctx| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn command_payload(name: &str, guild: Option<&str>) -> Value {
        let mut payload = json!({
            "id": "int-1",
            "type": 2,
            "channel_id": "chan-1",
            "member": {"user": {"id": "user-1"}},
            "data": {"name": name, "type": 1, "options": [
                {"name": "city", "type": 3, "value": "Lisbon"}
            ]}
        });
        if let Some(guild) = guild {
            payload["guild_id"] = json!(guild);
        }
        payload
    }

    fn component_payload(channel: &str, message: &str, custom_id: &str) -> Value {
        json!({
            "id": "int-2",
            "type": 3,
            "channel_id": channel,
            "message": {"id": message},
            "user": {"id": "user-1"},
            "data": {"custom_id": custom_id, "component_type": 2}
        })
    }

    fn modal_payload(custom_id: &str, user: &str) -> Value {
        json!({
            "id": "int-3",
            "type": 5,
            "user": {"id": user},
            "data": {"custom_id": custom_id, "components": [
                {"type": 1, "components": [
                    {"type": 4, "custom_id": "body", "value": "hello there"}
                ]}
            ]}
        })
    }

    // ---- parsing tests ----

    #[test]
    fn test_parse_command_interaction() {
        let interaction = Interaction::parse(&command_payload("weather", Some("g1"))).unwrap();
        assert_eq!(interaction.kind, InteractionKind::Command);
        assert_eq!(interaction.command_name.as_deref(), Some("weather"));
        assert_eq!(interaction.guild_id.as_deref(), Some("g1"));
        assert_eq!(interaction.user_id.as_deref(), Some("user-1"));
        assert_eq!(interaction.string_value("city"), Some("Lisbon"));
        assert!(interaction.custom_id.is_none());
    }

    #[test]
    fn test_parse_component_interaction() {
        let interaction =
            Interaction::parse(&component_payload("chan-1", "msg-1", "confirm")).unwrap();
        assert_eq!(interaction.kind, InteractionKind::Component);
        assert_eq!(interaction.custom_id.as_deref(), Some("confirm"));
        assert_eq!(interaction.message_id.as_deref(), Some("msg-1"));
        assert_eq!(interaction.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_parse_modal_interaction_flattens_fields() {
        let interaction = Interaction::parse(&modal_payload("feedback", "user-9")).unwrap();
        assert_eq!(interaction.kind, InteractionKind::ModalSubmit);
        assert_eq!(interaction.custom_id.as_deref(), Some("feedback"));
        assert_eq!(interaction.string_value("body"), Some("hello there"));
    }

    #[test]
    fn test_parse_nested_subcommand_options() {
        let payload = json!({
            "id": "int-4",
            "type": 2,
            "user": {"id": "u"},
            "data": {"name": "admin", "type": 1, "options": [
                {"name": "ban", "type": 1, "options": [
                    {"name": "target", "type": 6, "value": "user-2"},
                    {"name": "days", "type": 4, "value": 7}
                ]}
            ]}
        });
        let interaction = Interaction::parse(&payload).unwrap();
        assert_eq!(interaction.string_value("target"), Some("user-2"));
        assert_eq!(interaction.value("days"), Some(&json!(7)));
    }

    #[test]
    fn test_parse_rejects_unhandled_types() {
        // Ping
        assert!(Interaction::parse(&json!({"id": "x", "type": 1, "data": {}})).is_none());
        // Autocomplete
        assert!(Interaction::parse(&json!({"id": "x", "type": 4, "data": {}})).is_none());
        // Not an object
        assert!(Interaction::parse(&json!("nope")).is_none());
        // Missing data
        assert!(Interaction::parse(&json!({"id": "x", "type": 2})).is_none());
    }

    // ---- command dispatch tests ----

    #[tokio::test]
    async fn test_dispatch_global_command() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client);
        let counter = Arc::new(AtomicUsize::new(0));

        let definition = CommandDefinition::new(CommandData::slash("weather", "Forecast"))
            .handler(counting_callback(counter.clone()));
        router.bind_command(&definition).await;

        assert!(router.dispatch(command_payload("weather", None)).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_command_lookup_is_scope_exact() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client);
        let global = Arc::new(AtomicUsize::new(0));
        let guild = Arc::new(AtomicUsize::new(0));

        router
            .bind_command(
                &CommandDefinition::new(CommandData::slash("weather", "Forecast"))
                    .handler(counting_callback(global.clone())),
            )
            .await;
        router
            .bind_command(
                &CommandDefinition::new(CommandData::slash("weather", "Forecast"))
                    .guild("g1")
                    .handler(counting_callback(guild.clone())),
            )
            .await;

        assert!(router.dispatch(command_payload("weather", Some("g1"))).await);
        assert_eq!(guild.load(Ordering::SeqCst), 1);
        assert_eq!(global.load(Ordering::SeqCst), 0);

        assert!(router.dispatch(command_payload("weather", None)).await);
        assert_eq!(global.load(Ordering::SeqCst), 1);

        // A guild without its own binding matches nothing, global included
        assert!(!router.dispatch(command_payload("weather", Some("g2"))).await);
        assert_eq!(guild.load(Ordering::SeqCst), 1);
        assert_eq!(global.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_unbound_command() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client);
        assert!(!router.dispatch(command_payload("missing", None)).await);
    }

    #[tokio::test]
    async fn test_dispatch_command_without_callback() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client);
        router
            .bind_command(&CommandDefinition::new(CommandData::slash(
                "remote-only",
                "Handled elsewhere",
            )))
            .await;

        // Bound key, no callback: logged and dropped
        assert!(!router.dispatch(command_payload("remote-only", None)).await);
    }

    #[tokio::test]
    async fn test_callback_error_is_contained() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client);
        router
            .bind_command(
                &CommandDefinition::new(CommandData::slash("fragile", "Always fails")).handler(
                    |_ctx| async { Err(anyhow::anyhow!("callback exploded")) },
                ),
            )
            .await;

        // The callback ran; its error is logged, not propagated
        assert!(router.dispatch(command_payload("fragile", None)).await);
    }

    // ---- component dispatch tests ----

    fn confirm_set(counter: Arc<AtomicUsize>) -> ComponentRowSet {
        ComponentRowSet::new()
            .row(ActionRow::new().with(Component::button(
                "confirm",
                "Confirm",
                ButtonStyle::Primary,
            )))
            .on("confirm", move |_ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
    }

    #[tokio::test]
    async fn test_publish_and_dispatch_component() {
        let (client, gateway) = test_client();
        let router = InteractionRouter::new(client);
        let counter = Arc::new(AtomicUsize::new(0));
        let path = ComponentPath::new("chan-1", "msg-1");

        router
            .publish_components(&path, confirm_set(counter.clone()))
            .await
            .unwrap();
        assert_eq!(gateway.published().len(), 1);
        assert_eq!(router.component_count().await, 1);

        assert!(
            router
                .dispatch(component_payload("chan-1", "msg-1", "confirm"))
                .await
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Clicks on other messages do not route
        assert!(
            !router
                .dispatch(component_payload("chan-1", "msg-2", "confirm"))
                .await
        );
    }

    #[tokio::test]
    async fn test_republish_replaces_rows_and_callbacks() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let path = ComponentPath::new("chan-1", "msg-1");

        router
            .publish_components(&path, confirm_set(first.clone()))
            .await
            .unwrap();
        router
            .publish_components(
                &path,
                ComponentRowSet::new()
                    .row(ActionRow::new().with(Component::button(
                        "retry",
                        "Retry",
                        ButtonStyle::Secondary,
                    )))
                    .on("retry", {
                        let second = second.clone();
                        move |_ctx| {
                            let second = second.clone();
                            async move {
                                second.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            }
                        }
                    }),
            )
            .await
            .unwrap();
        assert_eq!(router.component_count().await, 1);

        // The old custom id no longer routes, the new one does
        assert!(
            !router
                .dispatch(component_payload("chan-1", "msg-1", "confirm"))
                .await
        );
        assert!(
            router
                .dispatch(component_payload("chan-1", "msg-1", "retry"))
                .await
        );
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_component_shown_without_callback_warns() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client);
        let path = ComponentPath::new("chan-1", "msg-1");

        // Rows can be published with no callbacks at all
        let set = ComponentRowSet::new().row(ActionRow::new().with(Component::button(
            "lonely",
            "Lonely",
            ButtonStyle::Primary,
        )));
        router.publish_components(&path, set).await.unwrap();

        assert!(
            !router
                .dispatch(component_payload("chan-1", "msg-1", "lonely"))
                .await
        );
    }

    #[tokio::test]
    async fn test_publish_validates_set() {
        let (client, gateway) = test_client();
        let router = InteractionRouter::new(client);
        let path = ComponentPath::new("chan-1", "msg-1");

        // Callback without a matching component
        let set = ComponentRowSet::new()
            .row(ActionRow::new().with(Component::button(
                "confirm",
                "Confirm",
                ButtonStyle::Primary,
            )))
            .on("other", |_ctx| async { Ok(()) });
        let result = router.publish_components(&path, set).await;

        assert!(matches!(result, Err(HotclawError::Registration(_))));
        assert!(gateway.published().is_empty());
        assert_eq!(router.component_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_publish_keeps_intended_rows() {
        let (client, gateway) = test_client();
        let router = InteractionRouter::new(client);
        let old = Arc::new(AtomicUsize::new(0));
        let retried = Arc::new(AtomicUsize::new(0));
        let path = ComponentPath::new("chan-1", "msg-1");

        router
            .publish_components(&path, confirm_set(old.clone()))
            .await
            .unwrap();

        gateway.refuse_publishes(true);
        let replacement = ComponentRowSet::new()
            .row(ActionRow::new().with(Component::button(
                "retry",
                "Retry",
                ButtonStyle::Secondary,
            )))
            .on("retry", {
                let retried = retried.clone();
                move |_ctx| {
                    let retried = retried.clone();
                    async move {
                        retried.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }
            });
        let result = router.publish_components(&path, replacement).await;
        assert!(matches!(result, Err(HotclawError::Gateway(_))));

        // The replacement is the intended state even though the remote
        // publish failed; the displaced rows no longer route
        assert!(
            router
                .dispatch(component_payload("chan-1", "msg-1", "retry"))
                .await
        );
        assert!(
            !router
                .dispatch(component_payload("chan-1", "msg-1", "confirm"))
                .await
        );
        assert_eq!(retried.load(Ordering::SeqCst), 1);
        assert_eq!(old.load(Ordering::SeqCst), 0);

        // A refused first publish still records its entry for retry
        let fresh = ComponentPath::new("chan-1", "msg-2");
        let result = router
            .publish_components(&fresh, confirm_set(Arc::new(AtomicUsize::new(0))))
            .await;
        assert!(result.is_err());
        assert_eq!(router.component_count().await, 2);
    }

    #[tokio::test]
    async fn test_forget_components() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client);
        let path = ComponentPath::new("chan-1", "msg-1");

        router
            .publish_components(&path, confirm_set(Arc::new(AtomicUsize::new(0))))
            .await
            .unwrap();
        assert!(router.forget_components(&path).await);
        assert!(!router.forget_components(&path).await);
        assert!(
            !router
                .dispatch(component_payload("chan-1", "msg-1", "confirm"))
                .await
        );
    }

    // ---- modal tests ----

    /// Binds a command whose callback shows a modal counting submits.
    async fn bind_modal_command(router: &InteractionRouter, submits: Arc<AtomicUsize>) {
        router
            .bind_command(
                &CommandDefinition::new(CommandData::slash("feedback", "Leave feedback")).handler(
                    move |ctx| {
                        let submits = submits.clone();
                        async move {
                            let modal = Modal::new("feedback-form", "Your feedback")
                                .with_field(ModalField::paragraph("body", "What happened?"));
                            ctx.show_modal(modal, move |submit_ctx| {
                                let submits = submits.clone();
                                async move {
                                    assert_eq!(
                                        submit_ctx.interaction.string_value("body"),
                                        Some("hello there")
                                    );
                                    submits.fetch_add(1, Ordering::SeqCst);
                                    Ok(())
                                }
                            })
                            .await?;
                            Ok(())
                        }
                    },
                ),
            )
            .await;
    }

    #[tokio::test]
    async fn test_modal_round_trip_fires_once() {
        let (client, gateway) = test_client();
        let router = InteractionRouter::new(client);
        let submits = Arc::new(AtomicUsize::new(0));
        bind_modal_command(&router, submits.clone()).await;

        // Command shows the modal and arms the waiter
        assert!(router.dispatch(command_payload("feedback", None)).await);
        assert_eq!(gateway.modals_shown().len(), 1);
        assert_eq!(router.modal_waiter_count().await, 1);

        // The matching submit consumes the waiter
        assert!(
            router
                .dispatch(modal_payload("feedback-form", "user-1"))
                .await
        );
        assert_eq!(submits.load(Ordering::SeqCst), 1);
        assert_eq!(router.modal_waiter_count().await, 0);

        // A second submit finds nothing
        assert!(
            !router
                .dispatch(modal_payload("feedback-form", "user-1"))
                .await
        );
        assert_eq!(submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_modal_waiter_is_per_user() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client);
        let submits = Arc::new(AtomicUsize::new(0));
        bind_modal_command(&router, submits.clone()).await;

        router.dispatch(command_payload("feedback", None)).await;

        // Another user's submit does not match user-1's waiter
        assert!(
            !router
                .dispatch(modal_payload("feedback-form", "user-2"))
                .await
        );
        assert_eq!(router.modal_waiter_count().await, 1);
    }

    #[tokio::test]
    async fn test_refused_modal_rolls_back_waiter() {
        let (client, gateway) = test_client();
        let router = InteractionRouter::new(client);
        let submits = Arc::new(AtomicUsize::new(0));
        bind_modal_command(&router, submits.clone()).await;

        gateway.refuse_modals(true);
        // The callback runs and swallows the gateway error into the log
        assert!(router.dispatch(command_payload("feedback", None)).await);
        assert_eq!(router.modal_waiter_count().await, 0);
        assert!(gateway.modals_shown().is_empty());
    }

    // ---- bus attachment ----

    #[tokio::test]
    async fn test_attach_routes_bus_events() {
        let (client, _gateway) = test_client();
        let router = InteractionRouter::new(client.clone());
        let counter = Arc::new(AtomicUsize::new(0));
        router
            .bind_command(
                &CommandDefinition::new(CommandData::slash("weather", "Forecast"))
                    .handler(counting_callback(counter.clone())),
            )
            .await;
        router.attach().await;

        client
            .emit(Event::new(
                EventKind::InteractionCreate,
                vec![command_payload("weather", None)],
            ))
            .await;

        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("interaction never reached the handler");
    }
}
