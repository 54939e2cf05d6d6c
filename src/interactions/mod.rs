//! Interaction handling for hotclaw
//!
//! Everything between a slash command definition and the callback that
//! answers a click lives here. Commands are declared as data, reconciled
//! against what the platform already has, and routed to callbacks when
//! used; component rows and modals ride the same router.
//!
//! # Architecture
//!
//! - **command**: Command definitions as data (`CommandData`,
//!   `CommandScope`, options, validation, remote comparison)
//! - **component**: Message components and modals as data (`ActionRow`,
//!   `Component`, `Modal`, validation)
//! - **router**: The [`InteractionRouter`] mapping interactions to
//!   callbacks, plus [`InteractionCtx`] handed to every callback
//! - **reconciler**: The [`CommandReconciler`] that registers declared
//!   commands and component rows with the fewest possible remote writes
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hotclaw::client::Client;
//! use hotclaw::interactions::command::CommandData;
//! use hotclaw::interactions::reconciler::CommandReconciler;
//! use hotclaw::interactions::router::{CommandDefinition, InteractionRouter};
//! use hotclaw::testing::TestGateway;
//!
//! # tokio_test::block_on(async {
//! let client = Client::new(Arc::new(TestGateway::new()));
//! let router = InteractionRouter::new(client.clone());
//! router.attach().await;
//!
//! let reconciler = CommandReconciler::new(client, router);
//! reconciler
//!     .register(vec![
//!         CommandDefinition::new(CommandData::slash("ping", "Check latency"))
//!             .handler(|_ctx| async { Ok(()) })
//!             .into(),
//!     ])
//!     .await
//!     .unwrap();
//! # })
//! ```

pub mod command;
pub mod component;
pub mod reconciler;
pub mod router;

pub use command::{
    CommandChoice, CommandData, CommandKind, CommandOption, CommandScope, OptionKind,
    RemoteCommand,
};
pub use component::{
    ActionRow, ButtonStyle, Component, ComponentPath, Modal, ModalField, SelectOption,
    TextFieldStyle,
};
pub use reconciler::{CommandReconciler, RegisterReport, Registrable};
pub use router::{
    CallbackFuture, CommandDefinition, ComponentRowSet, Interaction, InteractionCallback,
    InteractionCtx, InteractionKind, InteractionRouter,
};
