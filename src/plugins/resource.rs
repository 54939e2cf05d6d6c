//! Scoped resources for hotclaw plugins
//!
//! A scoped resource is a per-plugin handle to something external, usually
//! a database connection. The host hands each plugin a [`ScopedResource`]
//! at init; the underlying handle is opened lazily on first use and closed
//! by the host when the plugin unloads, so a plugin can neither leak its
//! connection across reloads nor keep one open it never used.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{HotclawError, Result};

/// An open resource. Implementations wrap whatever the deployment connects
/// plugins to.
#[async_trait]
pub trait ResourceHandle: Send + Sync {
    /// Closes the resource. Called once by the owning [`ScopedResource`].
    async fn close(&self) -> anyhow::Result<()>;
}

/// Opens resources on demand. One connector serves all plugins; each open
/// call produces an independent handle.
#[async_trait]
pub trait ResourceConnector: Send + Sync {
    async fn open(&self) -> anyhow::Result<Arc<dyn ResourceHandle>>;
}

/// What happened when a scoped resource was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The handle was open and closed cleanly.
    Closed,
    /// Nothing was ever opened, so there was nothing to do.
    NotOpened,
    /// The handle's close call failed; the error has been logged.
    Failed,
}

/// A lazily-opened, plugin-scoped resource handle.
///
/// Clones share one underlying slot, so the handle a plugin's event
/// callbacks see is the same one the host closes at unload.
#[derive(Clone)]
pub struct ScopedResource {
    /// Plugin name, for log context.
    owner: String,
    connector: Option<Arc<dyn ResourceConnector>>,
    slot: Arc<Mutex<Option<Arc<dyn ResourceHandle>>>>,
}

impl ScopedResource {
    /// Creates a resource scoped to `owner`, opened through `connector` on
    /// first use.
    pub fn new(owner: &str, connector: Option<Arc<dyn ResourceConnector>>) -> Self {
        Self {
            owner: owner.to_string(),
            connector,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a resource with no connector. Every `get` warns and yields
    /// nothing.
    pub fn disconnected(owner: &str) -> Self {
        Self::new(owner, None)
    }

    /// Returns the open handle, opening it on first call.
    ///
    /// With no connector configured this logs a warning and returns `None`,
    /// as does a failed open. Use [`ScopedResource::open`] when the caller
    /// needs the error.
    pub async fn get(&self) -> Option<Arc<dyn ResourceHandle>> {
        match self.open().await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(plugin = %self.owner, error = %e, "Resource unavailable");
                None
            }
        }
    }

    /// Returns the open handle, opening it on first call, surfacing errors.
    ///
    /// # Errors
    ///
    /// - `HotclawError::Resource` if no connector is configured
    /// - `HotclawError::Resource` if the connector's open fails
    pub async fn open(&self) -> Result<Arc<dyn ResourceHandle>> {
        let connector = self.connector.as_ref().ok_or_else(|| {
            HotclawError::Resource(format!("No resource connector configured for '{}'", self.owner))
        })?;

        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let handle = connector.open().await.map_err(|e| {
            HotclawError::Resource(format!("Open failed for '{}': {}", self.owner, e))
        })?;
        debug!(plugin = %self.owner, "Resource opened");
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Whether the resource has been opened and not yet closed.
    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Closes the resource if it was opened.
    ///
    /// Idempotent: closing an unopened (or already closed) resource is quiet
    /// and returns [`CloseOutcome::NotOpened`]. A failing close is logged
    /// and reported as [`CloseOutcome::Failed`]; the handle is dropped
    /// either way.
    pub async fn close(&self) -> CloseOutcome {
        let handle = self.slot.lock().await.take();
        match handle {
            None => CloseOutcome::NotOpened,
            Some(handle) => match handle.close().await {
                Ok(()) => {
                    debug!(plugin = %self.owner, "Resource closed");
                    CloseOutcome::Closed
                }
                Err(e) => {
                    warn!(plugin = %self.owner, error = %e, "Resource close failed");
                    CloseOutcome::Failed
                }
            },
        }
    }
}
