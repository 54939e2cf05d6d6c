//! Command and component registration for hotclaw
//!
//! Registration is declarative: callers hand over the full set of
//! commands and component row sets they want live, and the reconciler
//! makes the remote side match with as few writes as possible. Per scope
//! it fetches the remote commands once, then creates what is missing,
//! updates what differs, and leaves the rest alone. Component row sets
//! are published as-is; the remote message always gets the full set.
//!
//! Command callbacks are bound into the router before any network
//! traffic, so an interaction arriving mid-sync already routes.
//! Component sets are applied at sync time, together with their remote
//! publish. When the session is not ready, the whole batch is deferred
//! until the `Ready` event and registration returns immediately.
//!
//! Remote failures never abort a batch: the failed definition is logged,
//! counted in the report, and stays recorded locally so a later
//! `register` call can retry it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use tracing::{debug, error, info};

use crate::client::Client;
use crate::error::{HotclawError, Result};
use crate::events::EventKind;

use super::command::CommandScope;
use super::component::ComponentPath;
use super::router::{CommandDefinition, ComponentRowSet, InteractionRouter};

/// One item of a registration batch.
pub enum Registrable {
    Command(CommandDefinition),
    /// Component rows published to the message at the given path.
    Components(ComponentPath, ComponentRowSet),
}

impl From<CommandDefinition> for Registrable {
    fn from(definition: CommandDefinition) -> Self {
        Registrable::Command(definition)
    }
}

impl From<(ComponentPath, ComponentRowSet)> for Registrable {
    fn from((path, set): (ComponentPath, ComponentRowSet)) -> Self {
        Registrable::Components(path, set)
    }
}

/// What one sync pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterReport {
    /// Commands that did not exist remotely and were created.
    pub created: usize,
    /// Commands whose remote definition differed and was overwritten.
    pub updated: usize,
    /// Commands already registered exactly as defined.
    pub unchanged: usize,
    /// Component row sets published to their messages.
    pub rows_published: usize,
    /// Commands and row sets whose remote write failed. They stay
    /// recorded locally; a later `register` call retries them.
    pub failed: usize,
}

impl RegisterReport {
    /// Commands whose remote state is known converged.
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

/// Reconciles declared commands and components against what the
/// platform has.
///
/// # Example
///
/// ```ignore
/// let reconciler = CommandReconciler::new(client, router);
/// let report = reconciler
///     .register(vec![
///         CommandDefinition::new(CommandData::slash("weather", "Forecast for a city"))
///             .handler(|ctx| async move {
///                 println!("asked for {:?}", ctx.interaction.string_value("city"));
///                 Ok(())
///             })
///             .into(),
///     ])
///     .await?;
/// ```
#[derive(Clone)]
pub struct CommandReconciler {
    client: Client,
    router: InteractionRouter,
}

impl CommandReconciler {
    pub fn new(client: Client, router: InteractionRouter) -> Self {
        Self { client, router }
    }

    /// Registers a batch of commands and component row sets.
    ///
    /// The whole batch is validated before anything else happens: one
    /// bad definition fails the call with nothing bound and nothing
    /// written. After validation the command callbacks go into the
    /// router, then the batch is synced against the remote side, or
    /// deferred until `Ready` when the session is not ready yet.
    ///
    /// # Returns
    ///
    /// The sync report, or `None` when the sync was deferred.
    ///
    /// # Errors
    ///
    /// - `HotclawError::InvalidDefinition` if a definition fails validation
    /// - `HotclawError::Registration` if the batch defines the same
    ///   command twice in one scope
    ///
    /// Remote failures do not surface here; they are logged and counted
    /// in the report's `failed` field.
    pub async fn register(&self, batch: Vec<Registrable>) -> Result<Option<RegisterReport>> {
        let mut seen = HashSet::new();
        for item in &batch {
            match item {
                Registrable::Command(definition) => {
                    definition.data.validate()?;
                    let identity = (definition.routing_key(), definition.data.kind);
                    if !seen.insert(identity) {
                        return Err(HotclawError::Registration(format!(
                            "Command '{}' is defined twice in scope {}",
                            definition.data.name, definition.scope
                        )));
                    }
                }
                Registrable::Components(_, set) => set.validate()?,
            }
        }

        for item in &batch {
            if let Registrable::Command(definition) = item {
                self.router.bind_command(definition).await;
            }
        }

        if self.client.is_ready() {
            return Ok(Some(self.apply(batch).await));
        }

        let commands = batch
            .iter()
            .filter(|item| matches!(item, Registrable::Command(_)))
            .count();
        info!(
            commands,
            row_sets = batch.len() - commands,
            "Session not ready, registration deferred"
        );
        let pending: Arc<StdMutex<Option<Vec<Registrable>>>> =
            Arc::new(StdMutex::new(Some(batch)));
        let reconciler = self.clone();
        self.client
            .once(EventKind::Ready, move |_event| {
                let reconciler = reconciler.clone();
                let pending = pending.clone();
                async move {
                    let batch = {
                        let mut slot = pending
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        slot.take()
                    };
                    if let Some(batch) = batch {
                        reconciler.apply(batch).await;
                    }
                    Ok(())
                }
            })
            .await;
        Ok(None)
    }

    /// Syncs a validated batch against the platform right now.
    async fn apply(&self, batch: Vec<Registrable>) -> RegisterReport {
        let mut commands = Vec::new();
        let mut sets = Vec::new();
        for item in batch {
            match item {
                Registrable::Command(definition) => commands.push(definition),
                Registrable::Components(path, set) => sets.push((path, set)),
            }
        }

        let mut report = self.sync_commands(&commands).await;
        for (path, set) in sets {
            match self.router.publish_components(&path, set).await {
                Ok(()) => report.rows_published += 1,
                Err(e) => {
                    error!(path = %path, error = %e, "Component registration failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            rows_published = report.rows_published,
            failed = report.failed,
            "Registration sync complete"
        );
        report
    }

    /// Reconciles command definitions, one fetch per scope. A command
    /// matches a remote one by name and kind, and is only written when
    /// its definition differs. A failed fetch skips the whole scope; a
    /// failed write skips that command. Either way the rest of the pass
    /// continues and the failure lands in the report.
    async fn sync_commands(&self, definitions: &[CommandDefinition]) -> RegisterReport {
        let mut by_scope: HashMap<CommandScope, Vec<&CommandDefinition>> = HashMap::new();
        for definition in definitions {
            by_scope
                .entry(definition.scope.clone())
                .or_default()
                .push(definition);
        }

        let gateway = self.client.gateway();
        let mut report = RegisterReport::default();
        for (scope, scoped) in by_scope {
            let remotes = match gateway.fetch_commands(&scope).await {
                Ok(remotes) => remotes,
                Err(e) => {
                    error!(scope = %scope, error = %e, "Command fetch failed, scope skipped");
                    report.failed += scoped.len();
                    continue;
                }
            };
            for definition in scoped {
                let data = &definition.data;
                let existing = remotes
                    .iter()
                    .find(|remote| remote.data.name == data.name && remote.data.kind == data.kind);
                match existing {
                    None => {
                        debug!(command = %data.name, scope = %scope, "Creating command");
                        match gateway.create_command(&scope, data).await {
                            Ok(_) => report.created += 1,
                            Err(e) => {
                                error!(command = %data.name, scope = %scope, error = %e, "Command create failed");
                                report.failed += 1;
                            }
                        }
                    }
                    Some(remote) if data.matches_remote(&remote.data) => {
                        debug!(command = %data.name, scope = %scope, "Command up to date");
                        report.unchanged += 1;
                    }
                    Some(remote) => {
                        debug!(command = %data.name, scope = %scope, "Updating command");
                        match gateway.update_command(&scope, &remote.id, data).await {
                            Ok(_) => report.updated += 1,
                            Err(e) => {
                                error!(command = %data.name, scope = %scope, error = %e, "Command update failed");
                                report.failed += 1;
                            }
                        }
                    }
                }
            }
        }
        report
    }
}
