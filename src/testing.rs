//! Test doubles for hotclaw
//!
//! In-memory stand-ins used by the crate's own tests and doctests, and
//! useful to downstream crates testing their plugins:
//!
//! - [`TestGateway`] records every gateway call instead of talking to a
//!   chat platform, and can be flipped ready or made to refuse any
//!   remote write
//! - [`TestLoader`] turns plain text files into in-process plugins, so
//!   the module and hot-reload machinery can be exercised without
//!   compiling dynamic libraries

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::Gateway;
use crate::error::{HotclawError, Result};
use crate::interactions::command::{CommandData, CommandScope, RemoteCommand};
use crate::interactions::component::{ActionRow, ComponentPath, Modal};
use crate::plugins::resolver::{ModuleLoader, ResolvedEntry};
use crate::plugins::types::{FnPlugin, HandlerMap, PluginEntry};

/// An in-memory [`Gateway`].
///
/// Starts not-ready with no commands registered. Everything written
/// through it is held in memory and can be inspected afterwards; call
/// counters expose how often each remote operation ran, which is what
/// reconciler tests assert on.
pub struct TestGateway {
    ready: AtomicBool,
    application_id: String,
    commands: Mutex<HashMap<CommandScope, Vec<RemoteCommand>>>,
    published: Mutex<Vec<(ComponentPath, Vec<ActionRow>)>>,
    modals: Mutex<Vec<(String, Modal)>>,
    next_id: AtomicU64,
    fetch_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    refuse_modals: AtomicBool,
    refuse_publishes: AtomicBool,
    refuse_commands: AtomicBool,
}

impl TestGateway {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            application_id: "test-app".to_string(),
            commands: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            modals: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fetch_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            refuse_modals: AtomicBool::new(false),
            refuse_publishes: AtomicBool::new(false),
            refuse_commands: AtomicBool::new(false),
        }
    }

    /// Flips session readiness.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Makes every subsequent `show_modal` fail with a gateway error.
    pub fn refuse_modals(&self, refuse: bool) {
        self.refuse_modals.store(refuse, Ordering::SeqCst);
    }

    /// Makes every subsequent `publish_components` fail with a gateway
    /// error.
    pub fn refuse_publishes(&self, refuse: bool) {
        self.refuse_publishes.store(refuse, Ordering::SeqCst);
    }

    /// Makes every subsequent command fetch, create, and update fail
    /// with a gateway error.
    pub fn refuse_commands(&self, refuse: bool) {
        self.refuse_commands.store(refuse, Ordering::SeqCst);
    }

    /// Plants a command as already registered remotely, returning it with
    /// its assigned id.
    pub fn seed_command(&self, scope: &CommandScope, data: CommandData) -> RemoteCommand {
        let remote = RemoteCommand {
            id: self.assign_id(),
            data,
        };
        let mut commands = lock(&self.commands);
        commands
            .entry(scope.clone())
            .or_default()
            .push(remote.clone());
        remote
    }

    /// The commands currently registered in a scope.
    pub fn commands_in(&self, scope: &CommandScope) -> Vec<RemoteCommand> {
        lock(&self.commands).get(scope).cloned().unwrap_or_default()
    }

    /// Every `publish_components` call so far, oldest first.
    pub fn published(&self) -> Vec<(ComponentPath, Vec<ActionRow>)> {
        lock(&self.published).clone()
    }

    /// Every modal shown so far as `(interaction_id, modal)`, oldest first.
    pub fn modals_shown(&self) -> Vec<(String, Modal)> {
        lock(&self.modals).clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn assign_id(&self) -> String {
        format!("cmd-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TestGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for TestGateway {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn application_id(&self) -> String {
        self.application_id.clone()
    }

    async fn fetch_commands(&self, scope: &CommandScope) -> Result<Vec<RemoteCommand>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_commands.load(Ordering::SeqCst) {
            return Err(HotclawError::Gateway("Fetch refused".to_string()));
        }
        Ok(self.commands_in(scope))
    }

    async fn create_command(
        &self,
        scope: &CommandScope,
        data: &CommandData,
    ) -> Result<RemoteCommand> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_commands.load(Ordering::SeqCst) {
            return Err(HotclawError::Gateway("Create refused".to_string()));
        }
        let remote = RemoteCommand {
            id: self.assign_id(),
            data: data.clone(),
        };
        let mut commands = lock(&self.commands);
        commands
            .entry(scope.clone())
            .or_default()
            .push(remote.clone());
        Ok(remote)
    }

    async fn update_command(
        &self,
        scope: &CommandScope,
        id: &str,
        data: &CommandData,
    ) -> Result<RemoteCommand> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_commands.load(Ordering::SeqCst) {
            return Err(HotclawError::Gateway("Update refused".to_string()));
        }
        let mut commands = lock(&self.commands);
        let slot = commands
            .get_mut(scope)
            .and_then(|list| list.iter_mut().find(|remote| remote.id == id))
            .ok_or_else(|| {
                HotclawError::Gateway(format!("Unknown command id {} in scope {}", id, scope))
            })?;
        slot.data = data.clone();
        Ok(slot.clone())
    }

    async fn publish_components(&self, path: &ComponentPath, rows: &[ActionRow]) -> Result<()> {
        if self.refuse_publishes.load(Ordering::SeqCst) {
            return Err(HotclawError::Gateway("Publish refused".to_string()));
        }
        lock(&self.published).push((path.clone(), rows.to_vec()));
        Ok(())
    }

    async fn show_modal(&self, interaction_id: &str, modal: &Modal) -> Result<()> {
        if self.refuse_modals.load(Ordering::SeqCst) {
            return Err(HotclawError::Gateway("Modal refused".to_string()));
        }
        lock(&self.modals).push((interaction_id.to_string(), modal.clone()));
        Ok(())
    }
}

/// A [`ModuleLoader`] for plain text files.
///
/// Matches one extension (`plug` by default) and reads the trimmed file
/// content as the plugin name. The factory decides what entry that name
/// becomes; by default it is an [`FnPlugin`] with no handlers.
pub struct TestLoader {
    extension: String,
    factory: Arc<dyn Fn(String) -> Box<dyn PluginEntry> + Send + Sync>,
}

impl TestLoader {
    pub fn new() -> Self {
        Self {
            extension: "plug".to_string(),
            factory: Arc::new(|name| {
                Box::new(FnPlugin::new(&name, |_ctx| async { Ok(HandlerMap::new()) }))
            }),
        }
    }

    /// Changes the matched file extension.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    /// Replaces the entry factory. The factory runs once per load, so a
    /// reload observes a freshly built entry.
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(String) -> Box<dyn PluginEntry> + Send + Sync + 'static,
    {
        self.factory = Arc::new(factory);
        self
    }
}

impl Default for TestLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for TestLoader {
    fn matches(&self, path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(self.extension.as_str())
    }

    fn load(&self, path: &Path) -> Result<ResolvedEntry> {
        let content = fs::read_to_string(path).map_err(|e| {
            HotclawError::Load(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let name = content.trim().to_string();
        if name.is_empty() {
            return Err(HotclawError::Load(format!(
                "{} names no plugin",
                path.display()
            )));
        }
        Ok(ResolvedEntry::in_process((self.factory)(name)))
    }
}

/// Locks a mutex, recovering the value if a test panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
