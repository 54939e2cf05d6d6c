//! Plugin lifecycle host for hotclaw
//!
//! The host owns every loaded plugin. It resolves modules, initializes
//! them with a scoped context, registers their event handlers on the bus,
//! and tears all of that down again on unload. A directory watch can
//! drive the same lifecycle from file changes, which is what hot reload
//! is: `Added` loads, `Changed` reloads, `Removed` unloads.
//!
//! Reloads are fail-closed. The replacement module must resolve and
//! initialize before the running version is touched; if any step fails,
//! the running version stays live and the error is logged.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::bus::{EventHandler, HandlerId};
use crate::client::Client;
use crate::error::{HotclawError, Result};
use crate::events::EventKind;
use crate::store::ConfigStore;

use super::resolver::{LoadedModule, ModuleResolver};
use super::resource::{ResourceConnector, ScopedResource};
use super::types::{PluginContext, PluginEntry, PluginId, PluginSummary};
use super::watcher::{PluginFileEvent, PluginWatcher, WatchConfig};

/// One live plugin and everything needed to take it down again.
struct PluginRecord {
    id: PluginId,
    name: String,
    path: Option<PathBuf>,
    /// Keeps the backing module (and any dynamic library) alive for as
    /// long as the record exists.
    #[allow(dead_code)]
    module: Arc<LoadedModule>,
    handler_ids: Vec<(EventKind, HandlerId)>,
    mailbox: mpsc::UnboundedSender<Vec<Value>>,
    resource: ScopedResource,
    loaded_at: chrono::DateTime<Utc>,
}

impl PluginRecord {
    fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name.clone(),
            id: self.id.clone(),
            listens_to: self.handler_ids.iter().map(|(kind, _)| *kind).collect(),
            loaded_at: self.loaded_at,
        }
    }
}

/// The running directory watch, if any.
struct WatchTask {
    watcher: PluginWatcher,
    supervisor: tokio::task::JoinHandle<()>,
}

/// Owns and supervises all loaded plugins.
///
/// It provides methods to:
/// - Load plugins from module files or in-process entries
/// - Reload and unload plugins at runtime without restarting the host
/// - Watch a directory and mirror its file changes into the plugin set
/// - Send messages to plugin mailboxes and snapshot what is loaded
///
/// Cloning is cheap; clones share all state. Lifecycle operations (load,
/// reload, unload) are serialized through one internal lock, so a watch
/// event and a manual call never interleave halfway.
///
/// # Architecture
///
/// ```text
/// PluginHost
///     ├── resolver: ModuleResolver        (module files -> entries)
///     ├── records: HashMap<id, record>    (live plugins)
///     ├── store: ConfigStore              (per-plugin config documents)
///     └── watch supervisor (optional)     (file events -> lifecycle)
/// ```
///
/// # Example
///
/// ```ignore
/// let client = Client::new(gateway);
/// let host = PluginHost::new(client, ConfigStore::new("/etc/hotclaw"));
///
/// host.load_path("/var/lib/hotclaw/plugins/greeter.so").await?;
/// host.watch(WatchConfig::new("/var/lib/hotclaw/plugins"))?;
/// ```
#[derive(Clone)]
pub struct PluginHost {
    client: Client,
    resolver: Arc<ModuleResolver>,
    store: Arc<ConfigStore>,
    connector: Option<Arc<dyn ResourceConnector>>,
    data_root: PathBuf,
    records: Arc<RwLock<HashMap<PluginId, PluginRecord>>>,
    by_name: Arc<RwLock<HashMap<String, PluginId>>>,
    lifecycle: Arc<Mutex<()>>,
    watch_task: Arc<StdMutex<Option<WatchTask>>>,
}

impl PluginHost {
    /// Creates a host with the default resolver and data root.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared client whose bus receives plugin handlers
    /// * `store` - Config store that seeds one document per plugin
    pub fn new(client: Client, store: ConfigStore) -> Self {
        Self {
            client,
            resolver: Arc::new(ModuleResolver::with_defaults()),
            store: Arc::new(store),
            connector: None,
            data_root: Self::default_data_root(),
            records: Arc::new(RwLock::new(HashMap::new())),
            by_name: Arc::new(RwLock::new(HashMap::new())),
            lifecycle: Arc::new(Mutex::new(())),
            watch_task: Arc::new(StdMutex::new(None)),
        }
    }

    /// The platform data directory for plugin files, or `.hotclaw-data`
    /// when the platform reports none.
    pub fn default_data_root() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("hotclaw"))
            .unwrap_or_else(|| PathBuf::from(".hotclaw-data"))
    }

    /// Replaces the module resolver. Callers keep their own clone of the
    /// `Arc` when they need to register loaders or inspect the cache.
    pub fn with_resolver(mut self, resolver: Arc<ModuleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Sets the resource connector handed to every plugin's scoped handle.
    pub fn with_connector(mut self, connector: Arc<dyn ResourceConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the root under which each plugin gets its data directory.
    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = root.into();
        self
    }

    /// The client this host registers plugin handlers on.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Loads the plugin module at `path`.
    ///
    /// If the path already backs a loaded plugin this is a reload: the
    /// watcher can report an existing file as `Added` after a fast
    /// remove-and-recreate, and both cases must end with exactly one live
    /// instance.
    ///
    /// # Returns
    ///
    /// The id of the loaded plugin instance.
    ///
    /// # Errors
    ///
    /// - `HotclawError::Load` if no loader matches, the module fails to
    ///   load, or the plugin's init returns an error
    /// - `HotclawError::Config` if the plugin's config document is invalid
    pub async fn load_path(&self, path: impl AsRef<Path>) -> Result<PluginId> {
        let path = path.as_ref();
        let _guard = self.lifecycle.lock().await;
        if self.record_id_for_path(path).await.is_some() {
            return self.reload_locked(path).await;
        }
        let module = self.resolver.resolve(path).await?;
        self.init_module(module).await
    }

    /// Loads an in-process plugin entry, bypassing the module loaders.
    ///
    /// # Errors
    ///
    /// - `HotclawError::Load` if the plugin's init returns an error
    /// - `HotclawError::Config` if the plugin's config document is invalid
    pub async fn load_static(&self, entry: Box<dyn PluginEntry>) -> Result<PluginId> {
        let _guard = self.lifecycle.lock().await;
        let module = self.resolver.register_static(entry).await;
        self.init_module(module).await
    }

    /// Replaces the plugin backed by `path` with a freshly loaded version.
    ///
    /// Fail-closed: the old version keeps running until the new one has
    /// initialized successfully. On error the old version is untouched.
    ///
    /// # Errors
    ///
    /// Same as [`load_path`](PluginHost::load_path).
    pub async fn reload_path(&self, path: impl AsRef<Path>) -> Result<PluginId> {
        let _guard = self.lifecycle.lock().await;
        self.reload_locked(path.as_ref()).await
    }

    /// Unloads a plugin by name or id.
    ///
    /// # Errors
    ///
    /// - `HotclawError::Load` if no such plugin is loaded
    pub async fn unload(&self, plugin: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let id = self.id_for(plugin).await.ok_or_else(|| {
            HotclawError::Load(format!("Plugin '{}' is not loaded", plugin))
        })?;
        let record = self.unload_record(&id).await;
        if let Some(record) = record {
            if let Some(path) = record.path {
                self.resolver.invalidate(&path).await;
            }
        }
        Ok(())
    }

    /// Unloads whatever plugin the given module path backs. No-op when
    /// the path backs nothing, so a stray `Removed` event is harmless.
    pub async fn unload_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let _guard = self.lifecycle.lock().await;
        if let Some(id) = self.record_id_for_path(path).await {
            self.unload_record(&id).await;
        }
        self.resolver.invalidate(path).await;
        Ok(())
    }

    /// Delivers a message to a plugin's mailbox.
    ///
    /// # Arguments
    ///
    /// * `plugin` - Plugin name or id
    /// * `args` - Message payload, handed to the mailbox as-is
    ///
    /// # Returns
    ///
    /// `true` if the plugin exists and took its mailbox at init; `false`
    /// if it is unknown or never listened.
    pub async fn send(&self, plugin: &str, args: Vec<Value>) -> bool {
        let id = match self.id_for(plugin).await {
            Some(id) => id,
            None => return false,
        };
        let records = self.records.read().await;
        match records.get(&id) {
            Some(record) => record.mailbox.send(args).is_ok(),
            None => false,
        }
    }

    /// Snapshots all loaded plugins, sorted by name.
    pub async fn list(&self) -> Vec<PluginSummary> {
        let records = self.records.read().await;
        let mut summaries: Vec<PluginSummary> =
            records.values().map(PluginRecord::summary).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Snapshots one plugin by name or id.
    pub async fn get(&self, plugin: &str) -> Option<PluginSummary> {
        let id = self.id_for(plugin).await?;
        let records = self.records.read().await;
        records.get(&id).map(PluginRecord::summary)
    }

    /// Reverse lookup of a loaded plugin's id by its declared name.
    pub async fn get_id(&self, name: &str) -> Option<PluginId> {
        self.by_name.read().await.get(name).cloned()
    }

    /// Names of all loaded plugins, sorted.
    pub async fn names(&self) -> Vec<String> {
        let by_name = self.by_name.read().await;
        let mut names: Vec<String> = by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of loaded plugins.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Starts watching a directory and mirroring its changes into the
    /// plugin set. Files already present are loaded immediately.
    ///
    /// # Errors
    ///
    /// - `HotclawError::Watch` if a watch is already running or the
    ///   directory cannot be watched
    pub fn watch(&self, config: WatchConfig) -> Result<()> {
        let mut slot = self
            .watch_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Err(HotclawError::Watch(
                "Plugin watch already running".to_string(),
            ));
        }

        let (watcher, mut events) = PluginWatcher::spawn(config)?;
        let host = self.clone();
        let supervisor = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    PluginFileEvent::Added(path) => {
                        if let Err(e) = host.load_path(&path).await {
                            warn!(path = %path.display(), error = %e, "Plugin load failed");
                        }
                    }
                    PluginFileEvent::Changed(path) => {
                        if let Err(e) = host.reload_path(&path).await {
                            warn!(
                                path = %path.display(),
                                error = %e,
                                "Plugin reload failed, previous version keeps running"
                            );
                        }
                    }
                    PluginFileEvent::Removed(path) => {
                        if let Err(e) = host.unload_path(&path).await {
                            warn!(path = %path.display(), error = %e, "Plugin unload failed");
                        }
                    }
                }
            }
        });

        *slot = Some(WatchTask {
            watcher,
            supervisor,
        });
        Ok(())
    }

    /// Stops the directory watch, if one is running. Loaded plugins stay
    /// loaded.
    pub fn unwatch(&self) {
        let task = {
            let mut slot = self
                .watch_task
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take()
        };
        if let Some(task) = task {
            task.supervisor.abort();
            task.watcher.stop();
            info!("Plugin watch stopped");
        }
    }

    /// Stops the watch and unloads every plugin.
    pub async fn shutdown(&self) {
        self.unwatch();
        let _guard = self.lifecycle.lock().await;
        let ids: Vec<PluginId> = self.records.read().await.keys().cloned().collect();
        for id in ids {
            self.unload_record(&id).await;
        }
        info!("Plugin host stopped");
    }

    // Lifecycle internals. All of these assume the caller holds the
    // lifecycle lock.

    async fn reload_locked(&self, path: &Path) -> Result<PluginId> {
        let old_id = self.record_id_for_path(path).await;
        self.resolver.invalidate(path).await;
        let module = self.resolver.resolve(path).await?;
        let new_id = self.init_module(module).await?;
        // The new version is live. Retire the old instance unless a name
        // collision inside init_module already did.
        if let Some(old_id) = old_id {
            if old_id != new_id {
                self.unload_record(&old_id).await;
            }
        }
        Ok(new_id)
    }

    /// Initializes a resolved module and registers it as a live plugin.
    /// On init failure everything handed to the plugin is torn down and
    /// the module leaves the resolver cache.
    async fn init_module(&self, module: Arc<LoadedModule>) -> Result<PluginId> {
        let name = module.entry().name().to_string();
        if name.is_empty() {
            self.resolver.discard(module.id()).await;
            return Err(HotclawError::Load(format!(
                "Module {} reports an empty plugin name",
                module.id()
            )));
        }

        let prepared = self.prepare_context(&name).await;
        let (context, mail_tx, resource) = match prepared {
            Ok(parts) => parts,
            Err(e) => {
                self.resolver.discard(module.id()).await;
                return Err(e);
            }
        };

        debug!(plugin = %name, module = %module.id(), "Initializing plugin");
        let handlers = match module.entry().init(context).await {
            Ok(handlers) => handlers,
            Err(e) => {
                let _ = resource.close().await;
                self.resolver.discard(module.id()).await;
                return Err(HotclawError::Load(format!(
                    "Plugin '{}' init failed: {}",
                    name, e
                )));
            }
        };

        let mut handler_ids = Vec::new();
        for (kind, handler) in handlers.into_entries() {
            let id = self
                .client
                .on_boxed(kind, hold_module(module.clone(), handler))
                .await;
            handler_ids.push((kind, id));
        }

        let record = PluginRecord {
            id: module.id().to_string(),
            name: name.clone(),
            path: module.path().map(Path::to_path_buf),
            module: module.clone(),
            handler_ids,
            mailbox: mail_tx,
            resource,
            loaded_at: Utc::now(),
        };
        let plugin_id = record.id.clone();
        let events = record.handler_ids.len();

        let displaced = {
            let mut by_name = self.by_name.write().await;
            let mut records = self.records.write().await;
            let displaced = by_name.insert(name.clone(), plugin_id.clone());
            records.insert(plugin_id.clone(), record);
            displaced.filter(|old| *old != plugin_id)
        };
        if let Some(old_id) = displaced {
            warn!(
                plugin = %name,
                old = %old_id,
                new = %plugin_id,
                "Plugin name collision, replacing previous instance"
            );
            self.unload_record(&old_id).await;
        }

        info!(plugin = %name, id = %plugin_id, events, "Plugin loaded");
        Ok(plugin_id)
    }

    /// Builds the config document, resource handle, mailbox, and data
    /// directory for a plugin about to initialize.
    async fn prepare_context(
        &self,
        name: &str,
    ) -> Result<(
        PluginContext,
        mpsc::UnboundedSender<Vec<Value>>,
        ScopedResource,
    )> {
        let config = self.store.open(name, json!({}))?;
        let scoped_store = self.store.scoped(name)?;
        let resource = ScopedResource::new(name, self.connector.clone());
        let (mail_tx, mail_rx) = mpsc::unbounded_channel();
        let data_dir = self.data_root.join(name);
        fs::create_dir_all(&data_dir)?;

        let context = PluginContext::new(
            self.client.clone(),
            Arc::new(config),
            scoped_store,
            resource.clone(),
            data_dir,
            mail_rx,
        );
        Ok((context, mail_tx, resource))
    }

    /// Removes a record and tears down what it owns: bus handlers come
    /// off, the resource closes, the mailbox sender drops. Returns the
    /// removed record, or `None` if the id was not loaded.
    async fn unload_record(&self, id: &str) -> Option<PluginRecord> {
        let record = {
            let mut by_name = self.by_name.write().await;
            let mut records = self.records.write().await;
            match records.remove(id) {
                Some(record) => {
                    if by_name.get(&record.name).map(String::as_str) == Some(id) {
                        by_name.remove(&record.name);
                    }
                    record
                }
                None => return None,
            }
        };

        for (kind, handler_id) in &record.handler_ids {
            self.client.off(*kind, *handler_id).await;
        }
        let _ = record.resource.close().await;
        info!(plugin = %record.name, id = %id, "Plugin unloaded");
        Some(record)
    }

    async fn id_for(&self, plugin: &str) -> Option<PluginId> {
        {
            let by_name = self.by_name.read().await;
            if let Some(id) = by_name.get(plugin) {
                return Some(id.clone());
            }
        }
        let records = self.records.read().await;
        records.contains_key(plugin).then(|| plugin.to_string())
    }

    async fn record_id_for_path(&self, path: &Path) -> Option<PluginId> {
        let records = self.records.read().await;
        records
            .values()
            .find(|record| record.path.as_deref() == Some(path))
            .map(|record| record.id.clone())
    }
}

/// Wraps a plugin handler so every in-flight invocation keeps the backing
/// module alive, even after the plugin is unloaded mid-event.
fn hold_module(module: Arc<LoadedModule>, inner: EventHandler) -> EventHandler {
    Arc::new(move |event| {
        let module = module.clone();
        let inner_future = inner(event);
        Box::pin(async move {
            let _module = module;
            inner_future.await
        })
    })
}
