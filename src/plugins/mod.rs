//! Plugin system for hotclaw
//!
//! This module provides hot-reloadable plugins: units of behavior that
//! subscribe to gateway events and can be loaded, replaced, and removed
//! while the host keeps running. Plugins ship either as dynamic
//! libraries exporting a [`PluginDecl`] via [`declare_plugin!`], or as
//! in-process [`PluginEntry`] values registered directly.
//!
//! # Architecture
//!
//! - **types**: The plugin contract (`PluginEntry`, `PluginContext`,
//!   `HandlerMap`, `declare_plugin!`)
//! - **resolver**: Turns module files into entries through pluggable
//!   [`ModuleLoader`]s, one generation per load
//! - **runtime**: The [`PluginHost`] that owns lifecycle, config,
//!   resources, and handler registration
//! - **watcher**: Debounced directory watching that classifies file
//!   changes into `Added`, `Changed`, and `Removed`
//! - **resource**: Per-plugin [`ScopedResource`] handles opened lazily
//!   and closed on unload
//!
//! # Plugin Directory
//!
//! ```text
//! /var/lib/hotclaw/plugins/
//! ├── greeter.so         <- loaded at watch start
//! ├── moderation.so      <- replaced on rebuild, old version unloads
//! └── stats.so           <- deleting the file unloads the plugin
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hotclaw::client::Client;
//! use hotclaw::plugins::{PluginHost, WatchConfig};
//! use hotclaw::store::ConfigStore;
//! use hotclaw::testing::TestGateway;
//!
//! # tokio_test::block_on(async {
//! let client = Client::new(Arc::new(TestGateway::new()));
//! let host = PluginHost::new(client, ConfigStore::new("/etc/hotclaw"));
//!
//! host.watch(WatchConfig::new("/var/lib/hotclaw/plugins")).unwrap();
//! println!("{} plugins loaded", host.count().await);
//! # })
//! ```

pub mod resolver;
pub mod resource;
pub mod runtime;
pub mod types;
pub mod watcher;

pub use resolver::{DylibLoader, LoadedModule, ModuleLoader, ModuleResolver, ResolvedEntry};
pub use resource::{CloseOutcome, ResourceConnector, ResourceHandle, ScopedResource};
pub use crate::declare_plugin;
pub use runtime::PluginHost;
pub use types::{
    FnPlugin, HandlerMap, PluginContext, PluginDecl, PluginEntry, PluginId, PluginSummary,
    API_VERSION, ENTRY_SYMBOL,
};
pub use watcher::{PluginFileEvent, PluginWatcher, WatchConfig};
