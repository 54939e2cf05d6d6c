//! Module resolution for hotclaw
//!
//! The resolver turns plugin file paths into live [`LoadedModule`]s and
//! caches them in a versioned table. Each successful load gets a fresh
//! generation number and a fresh [`PluginId`], so "reload" is never
//! "mutate in place": the watcher invalidates the path, the next resolve
//! produces a new module, and any code still holding the old `Arc` keeps a
//! working module until it lets go.
//!
//! What counts as a loadable file is decided by [`ModuleLoader`]
//! implementations. [`DylibLoader`] handles compiled artifacts through
//! `libloading`; tests and embedders can install their own loaders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use libloading::{Library, Symbol};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::{HotclawError, Result};
use crate::plugins::types::{PluginDecl, PluginEntry, PluginId, API_VERSION, ENTRY_SYMBOL};

/// What a loader hands back: the plugin entry plus, for dylib-backed
/// modules, the library that must stay alive as long as the entry does.
pub struct ResolvedEntry {
    pub entry: Box<dyn PluginEntry>,
    pub library: Option<Library>,
}

impl ResolvedEntry {
    /// Wraps an entry with no backing artifact.
    pub fn in_process(entry: Box<dyn PluginEntry>) -> Self {
        Self {
            entry,
            library: None,
        }
    }
}

/// Turns files into plugin entries.
pub trait ModuleLoader: Send + Sync {
    /// Whether this loader understands the given path.
    fn matches(&self, path: &Path) -> bool;

    /// Loads the file into a plugin entry.
    ///
    /// # Errors
    ///
    /// `HotclawError::Load` for anything wrong with the artifact.
    fn load(&self, path: &Path) -> Result<ResolvedEntry>;
}

/// Loads compiled plugin artifacts (`.so`, `.dylib`, `.dll`).
///
/// The artifact must export a [`PluginDecl`] under
/// [`ENTRY_SYMBOL`](crate::plugins::ENTRY_SYMBOL), normally written by the
/// [`declare_plugin!`](crate::declare_plugin) macro, and must declare the
/// host's plugin API version.
pub struct DylibLoader;

impl ModuleLoader for DylibLoader {
    fn matches(&self, path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("so") | Some("dylib") | Some("dll")
        )
    }

    fn load(&self, path: &Path) -> Result<ResolvedEntry> {
        let library = unsafe { Library::new(path) }.map_err(|e| {
            HotclawError::Load(format!("Failed to open {}: {}", path.display(), e))
        })?;

        // Copy the declaration fields out so the symbol borrow ends before
        // the library moves into the result.
        let (api_version, create) = unsafe {
            let decl: Symbol<*const PluginDecl> = library.get(ENTRY_SYMBOL).map_err(|e| {
                HotclawError::Load(format!(
                    "No plugin declaration in {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let decl = &**decl;
            (decl.api_version, decl.create)
        };

        if api_version != API_VERSION {
            return Err(HotclawError::Load(format!(
                "{} declares plugin API v{}, this host speaks v{}",
                path.display(),
                api_version,
                API_VERSION
            )));
        }

        let entry = create();
        Ok(ResolvedEntry {
            entry,
            library: Some(library),
        })
    }
}

/// A loaded module: one generation of one plugin source.
pub struct LoadedModule {
    id: PluginId,
    path: Option<PathBuf>,
    generation: u64,
    entry: Box<dyn PluginEntry>,
    // Declared after `entry` so the entry drops first; for dylib-backed
    // modules its vtable lives inside this library.
    _library: Option<Library>,
}

impl LoadedModule {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entry(&self) -> &dyn PluginEntry {
        self.entry.as_ref()
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("generation", &self.generation)
            .finish()
    }
}

struct ResolverState {
    /// All live modules by id, current and superseded alike.
    modules: HashMap<PluginId, Arc<LoadedModule>>,
    /// The current module id for each path.
    current: HashMap<PathBuf, PluginId>,
}

/// The versioned module table.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use hotclaw::plugins::{DylibLoader, ModuleResolver};
///
/// # tokio_test::block_on(async {
/// let resolver = ModuleResolver::new().with_loader(Box::new(DylibLoader));
/// let module = resolver.resolve(Path::new("plugins/greeter.so")).await.unwrap();
/// println!("loaded {} (generation {})", module.id(), module.generation());
/// # })
/// ```
pub struct ModuleResolver {
    loaders: Vec<Box<dyn ModuleLoader>>,
    state: RwLock<ResolverState>,
    generation: AtomicU64,
}

impl ModuleResolver {
    /// Creates a resolver with no loaders installed.
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
            state: RwLock::new(ResolverState {
                modules: HashMap::new(),
                current: HashMap::new(),
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Creates a resolver with the standard [`DylibLoader`] installed.
    pub fn with_defaults() -> Self {
        Self::new().with_loader(Box::new(DylibLoader))
    }

    /// Installs a loader (builder style). Loaders are tried in installation
    /// order; the first whose `matches` returns true wins.
    pub fn with_loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Resolves a path to its current module, loading it if the path has no
    /// current generation.
    ///
    /// # Errors
    ///
    /// - `HotclawError::Load` if no installed loader matches the path
    /// - `HotclawError::Load` if the matching loader fails
    pub async fn resolve(&self, path: &Path) -> Result<Arc<LoadedModule>> {
        let mut state = self.state.write().await;

        if let Some(id) = state.current.get(path) {
            if let Some(module) = state.modules.get(id) {
                return Ok(module.clone());
            }
        }

        let loader = self
            .loaders
            .iter()
            .find(|loader| loader.matches(path))
            .ok_or_else(|| {
                HotclawError::Load(format!("No loader matches {}", path.display()))
            })?;

        let resolved = loader.load(path)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}#{}", path.display(), generation);
        let module = Arc::new(LoadedModule {
            id: id.clone(),
            path: Some(path.to_path_buf()),
            generation,
            entry: resolved.entry,
            _library: resolved.library,
        });

        info!(
            path = %path.display(),
            id = %id,
            generation,
            "Module loaded"
        );
        state.modules.insert(id.clone(), module.clone());
        state.current.insert(path.to_path_buf(), id);
        Ok(module)
    }

    /// Drops the current generation for a path, so the next resolve loads
    /// fresh. Returns the dropped module id, if the path had one.
    ///
    /// Holders of the old `Arc<LoadedModule>` are unaffected; the module
    /// only leaves memory when the last clone drops.
    pub async fn invalidate(&self, path: &Path) -> Option<PluginId> {
        let mut state = self.state.write().await;
        let id = state.current.remove(path)?;
        state.modules.remove(&id);
        info!(path = %path.display(), id = %id, "Module invalidated");
        Some(id)
    }

    /// Drops a module by id, whatever kind it is. Used when a freshly
    /// resolved module fails to initialize and must not be served from
    /// cache again.
    pub async fn discard(&self, id: &str) {
        let mut state = self.state.write().await;
        if state.modules.remove(id).is_some() {
            state.current.retain(|_, current| current != id);
            info!(id = %id, "Module discarded");
        }
    }

    /// Registers an in-process entry as a module, outside any file path.
    /// Its id is `static:<uuid>`.
    pub async fn register_static(&self, entry: Box<dyn PluginEntry>) -> Arc<LoadedModule> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("static:{}", Uuid::new_v4());
        let module = Arc::new(LoadedModule {
            id: id.clone(),
            path: None,
            generation,
            entry,
            _library: None,
        });

        let mut state = self.state.write().await;
        state.modules.insert(id, module.clone());
        module
    }

    /// Looks up a live module by id.
    pub async fn get(&self, id: &str) -> Option<Arc<LoadedModule>> {
        let state = self.state.read().await;
        state.modules.get(id).cloned()
    }

    /// Number of modules currently in the table.
    pub async fn module_count(&self) -> usize {
        let state = self.state.read().await;
        state.modules.len()
    }

    /// Paths that currently have a resolved generation.
    pub async fn cached_paths(&self) -> Vec<PathBuf> {
        let state = self.state.read().await;
        state.current.keys().cloned().collect()
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}
