//! Client facade and gateway seam for hotclaw
//!
//! The `Client` bundles the event bus with a [`Gateway`] implementation and
//! is the one object handed to plugins, the router, and the reconciler.
//! It is cheap to clone; all clones share the same bus and gateway.
//!
//! `Gateway` is the trait boundary to the chat platform. The runtime never
//! talks to the network itself; it asks the gateway to fetch and write
//! command definitions, publish component rows, and show modals. Tests swap
//! in an in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::{EventBus, EventHandler, HandlerId};
use crate::error::Result;
use crate::events::{Event, EventKind};
use crate::interactions::command::{CommandData, CommandScope, RemoteCommand};
use crate::interactions::component::{ActionRow, ComponentPath, Modal};

/// Connection to the chat platform.
///
/// Implementations wrap whatever transport the deployment uses. All methods
/// that write remotely return `HotclawError::Gateway` on transport failure.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Whether the session is established. Command syncs are deferred until
    /// this is true.
    fn is_ready(&self) -> bool;

    /// The application id this session authenticated as.
    fn application_id(&self) -> String;

    /// Fetches the commands currently registered in a scope.
    async fn fetch_commands(&self, scope: &CommandScope) -> Result<Vec<RemoteCommand>>;

    /// Creates a command in a scope, returning it with its assigned id.
    async fn create_command(&self, scope: &CommandScope, data: &CommandData)
        -> Result<RemoteCommand>;

    /// Overwrites an existing command by id.
    async fn update_command(
        &self,
        scope: &CommandScope,
        id: &str,
        data: &CommandData,
    ) -> Result<RemoteCommand>;

    /// Replaces the component rows on a message.
    async fn publish_components(&self, path: &ComponentPath, rows: &[ActionRow]) -> Result<()>;

    /// Shows a modal in response to an interaction.
    async fn show_modal(&self, interaction_id: &str, modal: &Modal) -> Result<()>;
}

/// The client facade shared across the runtime.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use hotclaw::client::Client;
/// use hotclaw::events::{Event, EventKind};
/// use hotclaw::testing::TestGateway;
///
/// # tokio_test::block_on(async {
/// let client = Client::new(Arc::new(TestGateway::new()));
/// client.on(EventKind::Ready, |_event| async { Ok(()) }).await;
/// client.emit(Event::empty(EventKind::Ready)).await;
/// # })
/// ```
#[derive(Clone)]
pub struct Client {
    bus: Arc<EventBus>,
    gateway: Arc<dyn Gateway>,
}

impl Client {
    /// Creates a client over the given gateway with a fresh event bus.
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            bus: Arc::new(EventBus::new()),
            gateway,
        }
    }

    /// Returns the shared event bus.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Returns the gateway.
    pub fn gateway(&self) -> Arc<dyn Gateway> {
        self.gateway.clone()
    }

    /// Whether the gateway session is established.
    pub fn is_ready(&self) -> bool {
        self.gateway.is_ready()
    }

    /// Registers a persistent event handler. See [`EventBus::on`].
    pub async fn on<F, Fut>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.bus.on(kind, handler).await
    }

    /// Registers a one-shot event handler. See [`EventBus::once`].
    pub async fn once<F, Fut>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.bus.once(kind, handler).await
    }

    /// Registers an already-boxed handler.
    pub async fn on_boxed(&self, kind: EventKind, handler: EventHandler) -> HandlerId {
        self.bus.on_boxed(kind, handler).await
    }

    /// Removes an event handler.
    pub async fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.bus.off(kind, id).await
    }

    /// Emits an event to all registered handlers.
    pub async fn emit(&self, event: Event) -> usize {
        self.bus.emit(event).await
    }
}
