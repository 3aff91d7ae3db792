//! Host-side statistics table records and callback table.
//!
//! # Responsibility
//! - Describe the fixed callback shape the host understands.
//! - Hold one registered table: identity, callbacks and opaque user data.
//!
//! # Invariants
//! - `output` is always bound; every other slot is optional.
//! - User data is opaque to the host and only handed back by reference.

use crate::host::memory::HostString;
use crate::host::{Host, HookResult};
use crate::stage::Stage;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::io::Write;
use uuid::Uuid;

/// Handle to one table entry of one host instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId {
    pub(crate) host: Uuid,
    pub(crate) index: usize,
}

impl TableId {
    /// Id of the host instance this entry belongs to.
    pub fn host_id(&self) -> Uuid {
        self.host
    }
}

/// Copies a table into another host instance.
pub type TableCopyFn = fn(&Host, TableId, &mut Host) -> HookResult<()>;
/// Lifecycle callback without extra arguments.
pub type TableHookFn = fn(&Host, TableId) -> HookResult<()>;
/// Writes the table report to a sink.
pub type TableOutputFn = fn(&Host, TableId, &mut dyn Write) -> HookResult<()>;

/// Function table the host calls for one statistics table.
#[derive(Clone, Copy)]
pub struct TableCallbacks {
    pub copy: Option<TableCopyFn>,
    pub free: Option<TableHookFn>,
    pub init: Option<TableHookFn>,
    pub exit: Option<TableHookFn>,
    pub init_solve: Option<TableHookFn>,
    pub exit_solve: Option<TableHookFn>,
    pub output: TableOutputFn,
}

impl TableCallbacks {
    /// Callback table with only the mandatory output slot bound.
    pub fn new(output: TableOutputFn) -> Self {
        Self {
            copy: None,
            free: None,
            init: None,
            exit: None,
            init_solve: None,
            exit_solve: None,
            output,
        }
    }
}

impl Debug for TableCallbacks {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCallbacks")
            .field("copy", &self.copy.is_some())
            .field("free", &self.free.is_some())
            .field("init", &self.init.is_some())
            .field("exit", &self.exit.is_some())
            .field("init_solve", &self.init_solve.is_some())
            .field("exit_solve", &self.exit_solve.is_some())
            .finish()
    }
}

/// Registration request for [`Host::include_table`].
pub struct TableDefinition {
    pub name: String,
    pub description: String,
    pub position: i32,
    pub earliest_stage: Stage,
    pub active: bool,
    pub callbacks: TableCallbacks,
    pub user_data: Option<Box<dyn Any>>,
}

impl TableDefinition {
    /// Active table definition without user data.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        position: i32,
        earliest_stage: Stage,
        callbacks: TableCallbacks,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            position,
            earliest_stage,
            active: true,
            callbacks,
            user_data: None,
        }
    }

    /// Attaches opaque user data.
    pub fn with_user_data(mut self, user_data: Box<dyn Any>) -> Self {
        self.user_data = Some(user_data);
        self
    }
}

/// One registered statistics table.
pub struct TableEntry {
    pub(crate) id: TableId,
    pub(crate) name: HostString,
    pub(crate) description: HostString,
    pub(crate) position: i32,
    pub(crate) earliest_stage: Stage,
    pub(crate) active: bool,
    pub(crate) initialized: bool,
    pub(crate) solving: bool,
    pub(crate) callbacks: TableCallbacks,
    pub(crate) user_data: Option<Box<dyn Any>>,
}

impl TableEntry {
    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn earliest_stage(&self) -> Stage {
        self.earliest_stage
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether `init` ran and `exit` has not yet.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether `init_solve` ran and `exit_solve` has not yet.
    pub fn is_solving(&self) -> bool {
        self.solving
    }

    pub fn callbacks(&self) -> &TableCallbacks {
        &self.callbacks
    }

    /// Opaque user data stored at registration.
    pub fn user_data(&self) -> Option<&dyn Any> {
        self.user_data.as_deref()
    }
}

impl Debug for TableEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("position", &self.position)
            .field("earliest_stage", &self.earliest_stage)
            .field("active", &self.active)
            .field("initialized", &self.initialized)
            .field("solving", &self.solving)
            .field("callbacks", &self.callbacks)
            .field("user_data", &self.user_data.is_some())
            .finish()
    }
}
