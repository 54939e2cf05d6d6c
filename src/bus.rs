//! Event bus for hotclaw
//!
//! This module provides the `EventBus`, the fan-out hub every other part of
//! the runtime hangs off:
//! - Plugins and the interaction router register handlers with `on`
//! - One-shot work (like deferred command syncs) registers with `once`
//! - The gateway adapter pushes events in with `emit`
//!
//! Each delivery runs in its own spawned task, so a slow or hung handler
//! stalls only itself. Handler errors are logged and never propagate to the
//! emitter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::events::{Event, EventKind};

/// The boxed future every event handler returns.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A registered event handler.
///
/// Stored as an `Arc` so emit-time snapshots are cheap clones.
pub type EventHandler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Opaque identifier returned by `on`/`once`, used to deregister with `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// One registration slot in the bus.
struct Registration {
    id: HandlerId,
    once: bool,
    handler: EventHandler,
}

/// The `EventBus` routes events to registered handlers.
///
/// Handlers for a given event kind are invoked in registration order, each in
/// its own task. `once` handlers are removed atomically when the emit that
/// fires them snapshots the registration list, so they run at most one time
/// even under concurrent emits.
///
/// # Example
///
/// ```
/// use hotclaw::bus::EventBus;
/// use hotclaw::events::{Event, EventKind};
///
/// # tokio_test::block_on(async {
/// let bus = EventBus::new();
/// bus.on(EventKind::Ready, |_event| async { Ok(()) }).await;
/// let started = bus.emit(Event::empty(EventKind::Ready)).await;
/// assert_eq!(started, 1);
/// # })
/// ```
pub struct EventBus {
    /// Handlers per event kind, in registration order
    handlers: RwLock<HashMap<EventKind, Vec<Registration>>>,
    /// Source for unique handler ids
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates a new, empty event bus.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a handler for an event kind.
    ///
    /// The handler runs every time the event is emitted, until removed
    /// with [`EventBus::off`].
    ///
    /// # Arguments
    ///
    /// * `kind` - The event kind to listen for
    /// * `handler` - Async closure invoked with each matching event
    ///
    /// # Returns
    ///
    /// A [`HandlerId`] that can be passed to [`EventBus::off`].
    pub async fn on<F, Fut>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(kind, wrap_handler(handler), false).await
    }

    /// Registers a handler that runs at most once.
    ///
    /// The handler is removed from the registry at the moment an emit
    /// snapshots it, so two concurrent emits cannot both fire it.
    pub async fn once<F, Fut>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(kind, wrap_handler(handler), true).await
    }

    /// Registers an already-boxed handler. Used by the plugin host, which
    /// stores handlers in type-erased form.
    pub async fn on_boxed(&self, kind: EventKind, handler: EventHandler) -> HandlerId {
        self.register(kind, handler, false).await
    }

    async fn register(&self, kind: EventKind, handler: EventHandler, once: bool) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write().await;
        handlers
            .entry(kind)
            .or_default()
            .push(Registration { id, once, handler });
        debug!(event = %kind, id = id.0, once, "Handler registered");
        id
    }

    /// Removes a handler registration.
    ///
    /// # Returns
    ///
    /// `true` if the handler was present and removed, `false` if it was
    /// already gone (including `once` handlers that have fired).
    pub async fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().await;
        let mut removed = false;
        let mut now_empty = false;
        if let Some(list) = handlers.get_mut(&kind) {
            let before = list.len();
            list.retain(|reg| reg.id != id);
            removed = list.len() != before;
            now_empty = list.is_empty();
        }
        if now_empty {
            handlers.remove(&kind);
        }
        if removed {
            debug!(event = %kind, id = id.0, "Handler removed");
        }
        removed
    }

    /// Emits an event to all handlers registered for its kind.
    ///
    /// Each handler runs in its own spawned task; this method returns as soon
    /// as all tasks are started. Tasks start in registration order. Handler
    /// errors are logged with the event kind and never propagate.
    ///
    /// # Returns
    ///
    /// The number of handlers the event was delivered to.
    pub async fn emit(&self, event: Event) -> usize {
        let mut snapshot: Vec<(HandlerId, EventHandler)> = Vec::new();
        {
            let mut handlers = self.handlers.write().await;
            let mut now_empty = false;
            if let Some(list) = handlers.get_mut(&event.kind) {
                snapshot = list
                    .iter()
                    .map(|reg| (reg.id, reg.handler.clone()))
                    .collect();
                // once-handlers leave the registry at snapshot time
                list.retain(|reg| !reg.once);
                now_empty = list.is_empty();
            }
            if now_empty {
                handlers.remove(&event.kind);
            }
        }

        let delivered = snapshot.len();
        for (id, handler) in snapshot {
            let event = event.clone();
            let kind = event.kind;
            tokio::spawn(async move {
                if let Err(e) = handler(event).await {
                    error!(event = %kind, handler = id.0, error = %e, "Event handler failed");
                }
            });
        }
        delivered
    }

    /// Returns the number of handlers currently registered for a kind.
    pub async fn handler_count(&self, kind: EventKind) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(&kind).map(|list| list.len()).unwrap_or(0)
    }

    /// Returns the total number of handlers across all kinds.
    pub async fn total_handlers(&self) -> usize {
        let handlers = self.handlers.read().await;
        handlers.values().map(|list| list.len()).sum()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Boxes a plain async closure into the stored handler shape.
fn wrap_handler<F, Fut>(handler: F) -> EventHandler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(handler(event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Helper returning a handler that counts invocations.
    fn counting_handler(
        counter: Arc<AtomicUsize>,
    ) -> impl Fn(Event) -> std::future::Ready<anyhow::Result<()>> + Send + Sync {
        move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    /// Waits until the counter reaches the expected value or the timeout
    /// expires. Emit only starts tasks, so tests must wait for completion.
    async fn wait_for_count(counter: &Arc<AtomicUsize>, expected: usize) {
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), expected, "timed out waiting");
    }

    #[tokio::test]
    async fn test_on_and_emit() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.on(EventKind::MessageCreate, counting_handler(counter.clone()))
            .await;

        let delivered = bus.emit(Event::empty(EventKind::MessageCreate)).await;
        assert_eq!(delivered, 1);
        wait_for_count(&counter, 1).await;
    }

    #[tokio::test]
    async fn test_emit_without_handlers() {
        let bus = EventBus::new();
        let delivered = bus.emit(Event::empty(EventKind::Ready)).await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_emit_only_matching_kind() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.on(EventKind::MessageCreate, counting_handler(counter.clone()))
            .await;

        bus.emit(Event::empty(EventKind::MessageDelete)).await;
        bus.emit(Event::empty(EventKind::Ready)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_multiple_handlers_all_fire() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            bus.on(EventKind::Ready, counting_handler(counter.clone()))
                .await;
        }

        let delivered = bus.emit(Event::empty(EventKind::Ready)).await;
        assert_eq!(delivered, 3);
        wait_for_count(&counter, 3).await;
    }

    #[tokio::test]
    async fn test_once_fires_exactly_once() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.once(EventKind::Ready, counting_handler(counter.clone()))
            .await;

        assert_eq!(bus.emit(Event::empty(EventKind::Ready)).await, 1);
        assert_eq!(bus.emit(Event::empty(EventKind::Ready)).await, 0);
        wait_for_count(&counter, 1).await;
        assert_eq!(bus.handler_count(EventKind::Ready).await, 0);
    }

    #[tokio::test]
    async fn test_off_removes_handler() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = bus
            .on(EventKind::MessageCreate, counting_handler(counter.clone()))
            .await;

        assert!(bus.off(EventKind::MessageCreate, id).await);
        assert_eq!(bus.emit(Event::empty(EventKind::MessageCreate)).await, 0);

        // Second off is a no-op
        assert!(!bus.off(EventKind::MessageCreate, id).await);
    }

    #[tokio::test]
    async fn test_off_unknown_id() {
        let bus = EventBus::new();
        bus.on(EventKind::Ready, |_| async { Ok(()) }).await;
        let bogus = HandlerId(9999);
        assert!(!bus.off(EventKind::Ready, bogus).await);
        assert_eq!(bus.handler_count(EventKind::Ready).await, 1);
    }

    #[tokio::test]
    async fn test_handler_error_does_not_affect_others() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.on(EventKind::Ready, |_| async { anyhow::bail!("boom") })
            .await;
        bus.on(EventKind::Ready, counting_handler(counter.clone()))
            .await;

        let delivered = bus.emit(Event::empty(EventKind::Ready)).await;
        assert_eq!(delivered, 2);
        wait_for_count(&counter, 1).await;

        // The failing handler stays registered
        assert_eq!(bus.handler_count(EventKind::Ready).await, 2);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_affect_others() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.on(EventKind::Ready, |_| async { panic!("handler blew up") })
            .await;
        bus.on(EventKind::Ready, counting_handler(counter.clone()))
            .await;

        // Each delivery runs in its own task, so the panic is contained
        bus.emit(Event::empty(EventKind::Ready)).await;
        wait_for_count(&counter, 1).await;

        bus.emit(Event::empty(EventKind::Ready)).await;
        wait_for_count(&counter, 2).await;
    }

    #[tokio::test]
    async fn test_slow_handler_does_not_block_emit() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.on(EventKind::Ready, |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        bus.on(EventKind::Ready, counting_handler(counter.clone()))
            .await;

        let start = std::time::Instant::now();
        bus.emit(Event::empty(EventKind::Ready)).await;
        assert!(start.elapsed() < Duration::from_secs(1));

        // The fast handler completes even though the slow one is stuck
        wait_for_count(&counter, 1).await;
    }

    #[tokio::test]
    async fn test_event_args_reach_handler() {
        let bus = EventBus::new();
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        bus.on(EventKind::MessageCreate, move |event: Event| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().await.push(event.args);
                Ok(())
            }
        })
        .await;

        bus.emit(Event::new(
            EventKind::MessageCreate,
            vec![json!({"content": "hello"})],
        ))
        .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0]["content"], "hello");
    }

    #[tokio::test]
    async fn test_handler_counts() {
        let bus = EventBus::new();
        assert_eq!(bus.total_handlers().await, 0);

        bus.on(EventKind::Ready, |_| async { Ok(()) }).await;
        bus.on(EventKind::Ready, |_| async { Ok(()) }).await;
        bus.on(EventKind::MessageCreate, |_| async { Ok(()) }).await;

        assert_eq!(bus.handler_count(EventKind::Ready).await, 2);
        assert_eq!(bus.handler_count(EventKind::MessageCreate).await, 1);
        assert_eq!(bus.handler_count(EventKind::MessageDelete).await, 0);
        assert_eq!(bus.total_handlers().await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_emits_once_handler() {
        // Under concurrent emits a once-handler must still fire at most once.
        let bus = Arc::new(EventBus::new());
        let counter = Arc::new(AtomicUsize::new(0));
        bus.once(EventKind::Ready, counting_handler(counter.clone()))
            .await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let bus = bus.clone();
            tasks.push(tokio::spawn(async move {
                bus.emit(Event::empty(EventKind::Ready)).await
            }));
        }
        let mut total = 0;
        for task in tasks {
            total += task.await.unwrap();
        }
        assert_eq!(total, 1);
        wait_for_count(&counter, 1).await;
    }
}
