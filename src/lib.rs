//! hotclaw - Hot-reloadable plugin runtime for chat platform bots
//!
//! hotclaw turns a bot process into a plugin host. Behavior lives in
//! plugins that subscribe to gateway events, register slash commands,
//! and wire up message components and modals; the host loads those
//! plugins from a watched directory and swaps them live when their
//! files change, without dropping the session.
//!
//! # Architecture
//!
//! ```text
//!  gateway events ──▶ EventBus ──▶ plugin handlers
//!                        │
//!                        └──▶ InteractionRouter ──▶ command / component /
//!                                                   modal callbacks
//!
//!  plugin dir  ──▶ PluginWatcher ──▶ PluginHost ──▶ ModuleResolver
//!  (*.so files)     (debounced)       (lifecycle)    (load / reload)
//! ```
//!
//! - [`events`] / [`bus`]: The closed set of gateway event kinds and the
//!   async bus that fans them out
//! - [`client`]: The [`Client`](client::Client) facade over the bus and
//!   the [`Gateway`](client::Gateway) seam to the platform
//! - [`plugins`]: The plugin contract, module resolution, the hosting
//!   runtime, and the directory watcher behind hot reload
//! - [`interactions`]: Command declaration and reconciliation, plus
//!   routing of commands, components, and modals to callbacks
//! - [`store`]: Per-plugin JSON config documents with seeded defaults
//! - [`testing`]: In-memory gateway and loader doubles
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hotclaw::client::Client;
//! use hotclaw::interactions::{CommandData, CommandDefinition, CommandReconciler, InteractionRouter};
//! use hotclaw::plugins::{PluginHost, WatchConfig};
//! use hotclaw::store::ConfigStore;
//! use hotclaw::testing::TestGateway;
//!
//! # tokio_test::block_on(async {
//! let client = Client::new(Arc::new(TestGateway::new()));
//!
//! // Interactions: declare commands, router answers them
//! let router = InteractionRouter::new(client.clone());
//! router.attach().await;
//! let reconciler = CommandReconciler::new(client.clone(), router);
//! reconciler
//!     .register(vec![
//!         CommandDefinition::new(CommandData::slash("ping", "Check latency"))
//!             .handler(|_ctx| async { Ok(()) })
//!             .into(),
//!     ])
//!     .await
//!     .unwrap();
//!
//! // Plugins: host a watched directory of modules
//! let host = PluginHost::new(client, ConfigStore::new("/etc/hotclaw"));
//! host.watch(WatchConfig::new("/var/lib/hotclaw/plugins")).unwrap();
//! # })
//! ```

pub mod bus;
pub mod client;
pub mod error;
pub mod events;
pub mod interactions;
pub mod plugins;
pub mod store;
pub mod testing;

pub use bus::{EventBus, EventHandler, HandlerId};
pub use client::{Client, Gateway};
pub use error::{HotclawError, Result};
pub use events::{Event, EventKind};
