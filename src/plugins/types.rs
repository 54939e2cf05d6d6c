//! Core plugin types for hotclaw
//!
//! A plugin is anything implementing [`PluginEntry`]: it has a name and an
//! async `init` that receives a [`PluginContext`] and returns the
//! [`HandlerMap`] of events it wants to hear. Compiled plugin artifacts
//! export a [`PluginDecl`] under [`ENTRY_SYMBOL`] via the
//! [`declare_plugin!`](crate::declare_plugin) macro; in-process plugins are
//! registered directly, usually through [`FnPlugin`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::bus::EventHandler;
use crate::client::Client;
use crate::error::{HotclawError, Result};
use crate::events::{Event, EventKind};
use crate::plugins::resource::ScopedResource;
use crate::store::{ConfigFile, ConfigStore};

/// Version of the plugin ABI. Bumped whenever [`PluginDecl`],
/// [`PluginEntry`], or [`PluginContext`] change shape. Artifacts declaring
/// a different version are refused at load.
pub const API_VERSION: u32 = 1;

/// Symbol name compiled plugin artifacts export their [`PluginDecl`] under.
pub const ENTRY_SYMBOL: &[u8] = b"HOTCLAW_PLUGIN";

/// Identifier of a loaded plugin instance. Ids are unique per load: the
/// same file reloaded gets a fresh id.
pub type PluginId = String;

/// The declaration a compiled plugin artifact exports.
///
/// Host and plugin must be built with the same toolchain; `api_version`
/// guards against shape drift between the two.
pub struct PluginDecl {
    pub api_version: u32,
    pub create: fn() -> Box<dyn PluginEntry>,
}

/// Declares the exported entry point of a compiled plugin crate.
///
/// # Example
///
/// ```ignore
/// use hotclaw::declare_plugin;
/// use hotclaw::plugins::{FnPlugin, HandlerMap, PluginEntry};
///
/// fn create() -> Box<dyn PluginEntry> {
///     Box::new(FnPlugin::new("greeter", |_ctx| async {
///         Ok(HandlerMap::new())
///     }))
/// }
///
/// declare_plugin!(create);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($create:expr) => {
        #[no_mangle]
        pub static HOTCLAW_PLUGIN: $crate::plugins::PluginDecl = $crate::plugins::PluginDecl {
            api_version: $crate::plugins::API_VERSION,
            create: $create,
        };
    };
}

/// The contract every plugin implements.
#[async_trait::async_trait]
pub trait PluginEntry: Send + Sync {
    /// The plugin's name. Names are unique among loaded plugins; loading a
    /// second plugin with the same name replaces the first.
    fn name(&self) -> &str;

    /// Initializes the plugin and returns its event subscriptions.
    ///
    /// Runs once per load. If this returns an error the plugin is not
    /// activated and everything handed over in `ctx` is torn down again.
    async fn init(&self, ctx: PluginContext) -> anyhow::Result<HandlerMap>;
}

/// Everything a plugin gets at init time.
pub struct PluginContext {
    /// Shared client for emitting and subscribing outside the handler map.
    pub client: Client,
    /// This plugin's config document.
    pub config: Arc<ConfigFile>,
    /// This plugin's scoped resource handle.
    pub resource: ScopedResource,
    /// Directory the plugin may use for its own files.
    pub data_dir: PathBuf,
    store: ConfigStore,
    mailbox: Option<mpsc::UnboundedReceiver<Vec<Value>>>,
}

impl PluginContext {
    /// Assembles a context. The host calls this once per load.
    pub fn new(
        client: Client,
        config: Arc<ConfigFile>,
        store: ConfigStore,
        resource: ScopedResource,
        data_dir: PathBuf,
        mailbox: mpsc::UnboundedReceiver<Vec<Value>>,
    ) -> Self {
        Self {
            client,
            config,
            store,
            resource,
            data_dir,
            mailbox: Some(mailbox),
        }
    }

    /// Opens (or seeds) a named document in this plugin's own config
    /// directory, for plugins that keep state beyond the primary
    /// [`config`](Self::config) document.
    ///
    /// # Errors
    ///
    /// - `HotclawError::Config` on an invalid document name or non-object
    ///   defaults
    /// - `HotclawError::Io` / `HotclawError::Json` on unreadable or
    ///   malformed documents
    pub fn open_config(&self, name: &str, default: Value) -> Result<ConfigFile> {
        self.store.open(name, default)
    }

    /// Takes the mailbox receiver for host messages sent via
    /// `PluginHost::send`. Can be taken once; typically moved into a task
    /// the plugin spawns during init.
    pub fn take_mailbox(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<Value>>> {
        self.mailbox.take()
    }
}

/// The event subscriptions a plugin returns from init.
///
/// At most one callback per event kind; a later `on` for the same kind
/// replaces the earlier one. Iteration order is insertion order, which is
/// also the order the host registers the callbacks on the bus.
#[derive(Default)]
pub struct HandlerMap {
    entries: Vec<(EventKind, EventHandler)>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to an event kind (builder style).
    pub fn on<F, Fut>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.insert(kind, Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Subscribes by handler field name (`"on_message_create"`).
    ///
    /// # Errors
    ///
    /// `HotclawError::InvalidDefinition` when the field is not in the event
    /// table, so a typo fails the plugin load instead of silently never
    /// firing.
    pub fn on_field<F, Fut>(self, field: &str, handler: F) -> Result<Self>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let kind = EventKind::from_handler_field(field).ok_or_else(|| {
            HotclawError::InvalidDefinition(format!("Unknown handler field '{}'", field))
        })?;
        Ok(self.on(kind, handler))
    }

    /// Inserts a type-erased handler, replacing any existing one for the
    /// same kind.
    pub fn insert(&mut self, kind: EventKind, handler: EventHandler) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == kind) {
            slot.1 = handler;
        } else {
            self.entries.push((kind, handler));
        }
    }

    /// The kinds subscribed to, in insertion order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.entries.iter().map(|(kind, _)| *kind).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the map into its entries.
    pub fn into_entries(self) -> Vec<(EventKind, EventHandler)> {
        self.entries
    }
}

impl std::fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerMap")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// A plugin defined by a name and an init closure, without a dedicated
/// struct. The usual way to write in-process plugins and test fixtures.
///
/// # Example
///
/// ```
/// use hotclaw::events::EventKind;
/// use hotclaw::plugins::{FnPlugin, HandlerMap};
///
/// let plugin = FnPlugin::new("echo", |_ctx| async {
///     Ok(HandlerMap::new().on(EventKind::MessageCreate, |_event| async { Ok(()) }))
/// });
/// ```
pub struct FnPlugin {
    name: String,
    init_fn: Box<dyn Fn(PluginContext) -> InitFuture + Send + Sync>,
}

type InitFuture = BoxFuture<'static, anyhow::Result<HandlerMap>>;

impl FnPlugin {
    pub fn new<F, Fut>(name: &str, init: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HandlerMap>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            init_fn: Box::new(move |ctx| Box::pin(init(ctx))),
        }
    }
}

#[async_trait::async_trait]
impl PluginEntry for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, ctx: PluginContext) -> anyhow::Result<HandlerMap> {
        (self.init_fn)(ctx).await
    }
}

/// Snapshot of one loaded plugin, as returned by `PluginHost::list`.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub id: PluginId,
    pub listens_to: Vec<EventKind>,
    pub loaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_map_builder() {
        let map = HandlerMap::new()
            .on(EventKind::MessageCreate, |_| async { Ok(()) })
            .on(EventKind::Ready, |_| async { Ok(()) });

        assert_eq!(map.len(), 2);
        assert_eq!(map.kinds(), vec![EventKind::MessageCreate, EventKind::Ready]);
    }

    #[test]
    fn test_handler_map_replaces_same_kind() {
        let map = HandlerMap::new()
            .on(EventKind::Ready, |_| async { Ok(()) })
            .on(EventKind::Ready, |_| async { Ok(()) });

        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_handler_map_on_field() {
        let map = HandlerMap::new()
            .on_field("on_message_create", |_| async { Ok(()) })
            .unwrap();
        assert_eq!(map.kinds(), vec![EventKind::MessageCreate]);
    }

    #[test]
    fn test_handler_map_on_field_unknown() {
        let result = HandlerMap::new().on_field("on_mesage_create", |_| async { Ok(()) });
        assert!(result.is_err());
        assert!(result
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default()
            .contains("on_mesage_create"));
    }

    #[test]
    fn test_handler_map_empty() {
        let map = HandlerMap::new();
        assert!(map.is_empty());
        assert!(map.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_fn_plugin_name_and_init() {
        use crate::store::ConfigStore;
        use crate::testing::TestGateway;

        let plugin = FnPlugin::new("echo", |_ctx| async {
            Ok(HandlerMap::new().on(EventKind::MessageCreate, |_| async { Ok(()) }))
        });
        assert_eq!(plugin.name(), "echo");

        let tmp = tempfile::TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path());
        let config = Arc::new(store.open("echo", serde_json::json!({})).unwrap());
        let (_tx, rx) = mpsc::unbounded_channel();
        let ctx = PluginContext::new(
            Client::new(Arc::new(TestGateway::new())),
            config,
            store.scoped("echo").unwrap(),
            ScopedResource::disconnected("echo"),
            tmp.path().join("data"),
            rx,
        );

        let map = plugin.init(ctx).await.unwrap();
        assert_eq!(map.kinds(), vec![EventKind::MessageCreate]);
    }

    #[tokio::test]
    async fn test_context_mailbox_taken_once() {
        use crate::store::ConfigStore;
        use crate::testing::TestGateway;

        let tmp = tempfile::TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path());
        let config = Arc::new(store.open("echo", serde_json::json!({})).unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut ctx = PluginContext::new(
            Client::new(Arc::new(TestGateway::new())),
            config,
            store.scoped("echo").unwrap(),
            ScopedResource::disconnected("echo"),
            tmp.path().join("data"),
            rx,
        );

        let mut mailbox = ctx.take_mailbox().expect("first take succeeds");
        assert!(ctx.take_mailbox().is_none());

        tx.send(vec![serde_json::json!("ping")]).unwrap();
        let received = mailbox.recv().await.unwrap();
        assert_eq!(received[0], "ping");
    }

    #[tokio::test]
    async fn test_context_opens_scoped_documents() {
        use crate::store::ConfigStore;
        use crate::testing::TestGateway;

        let tmp = tempfile::TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path());
        let config = Arc::new(store.open("echo", serde_json::json!({})).unwrap());
        let (_tx, rx) = mpsc::unbounded_channel();
        let ctx = PluginContext::new(
            Client::new(Arc::new(TestGateway::new())),
            config,
            store.scoped("echo").unwrap(),
            ScopedResource::disconnected("echo"),
            tmp.path().join("data"),
            rx,
        );

        let doc = ctx
            .open_config("counters", serde_json::json!({"seen": 0}))
            .unwrap();
        assert_eq!(doc.get("seen"), Some(serde_json::json!(0)));
        assert!(tmp.path().join("echo").join("counters.json").exists());
    }

    #[test]
    fn test_api_version_and_symbol() {
        assert_eq!(API_VERSION, 1);
        assert_eq!(ENTRY_SYMBOL, b"HOTCLAW_PLUGIN");
    }
}
