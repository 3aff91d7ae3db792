//! Object-style statistics table extensions.
//!
//! # Responsibility
//! - Carry the identity every table extension is built with.
//! - Define the lifecycle hooks an extension may override.
//!
//! # Invariants
//! - Name and description are host-allocated copies owned by the identity;
//!   they are released exactly once, when the identity drops.
//! - Position and earliest stage never change after construction.
//! - `output` has no default; every extension provides it.

use crate::extension::bridge::SharedTable;
use crate::host::{Host, HostError, HostHandle, HostString, HookResult, TableId};
use crate::stage::Stage;
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Write;

pub type TableResult<T> = Result<T, TableError>;

/// Table construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// Host could not allocate a copy of `field`.
    Allocation {
        field: &'static str,
        value: String,
        source: HostError,
    },
}

impl Display for TableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allocation {
                field,
                value,
                source,
            } => write!(f, "failed to copy table {field} `{value}`: {source}"),
        }
    }
}

impl Error for TableError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Allocation { source, .. } => Some(source),
        }
    }
}

/// Identity shared by every table extension.
///
/// Fields drop in declaration order: name first, then description.
pub struct TableIdentity {
    name: HostString,
    description: HostString,
    position: i32,
    earliest_stage: Stage,
    host: HostHandle,
}

impl TableIdentity {
    /// Copies `name` and `description` into host memory.
    ///
    /// # Errors
    /// - `TableError::Allocation` when either copy fails. A name copy made
    ///   before a failing description copy is released before returning.
    pub fn new(
        host: &HostHandle,
        name: &str,
        description: &str,
        position: i32,
        earliest_stage: Stage,
    ) -> TableResult<Self> {
        let name_copy = duplicate_field(host, "name", name)?;
        let description_copy = duplicate_field(host, "description", description)?;
        debug!(
            "event=table_identity module=extension status=ok table={} position={} earliest_stage={}",
            name, position, earliest_stage
        );
        Ok(Self {
            name: name_copy,
            description: description_copy,
            position,
            earliest_stage,
            host: host.clone(),
        })
    }

    pub fn host(&self) -> &HostHandle {
        &self.host
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
}

impl std::fmt::Debug for TableIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableIdentity")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("position", &self.position)
            .field("earliest_stage", &self.earliest_stage)
            .field("host", &self.host.id())
            .finish()
    }
}

fn duplicate_field(host: &HostHandle, field: &'static str, value: &str) -> TableResult<HostString> {
    host.duplicate_string(value)
        .map_err(|source| TableError::Allocation {
            field,
            value: value.to_string(),
            source,
        })
}

/// Statistics table implemented as an object.
///
/// Only [`identity`](Self::identity) and [`output`](Self::output) must be
/// provided; every other hook defaults to a successful no-op.
pub trait TableExtension {
    fn identity(&self) -> &TableIdentity;

    /// Host is shutting down. Runs in both ownership modes.
    fn free(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        Ok(())
    }

    /// Problem was transformed.
    fn init(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        Ok(())
    }

    /// Transformed problem is about to be freed.
    fn exit(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        Ok(())
    }

    /// Search is about to begin.
    fn init_solve(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        Ok(())
    }

    /// Search data is about to be freed.
    fn exit_solve(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        Ok(())
    }

    /// Writes the table report.
    fn output(&mut self, host: &Host, table: TableId, sink: &mut dyn Write) -> HookResult<()>;

    /// Builds an equivalent extension bound to `target`.
    ///
    /// `None` means the table is not copied into other host instances.
    fn clone_for(&self, _target: &HostHandle) -> HookResult<Option<SharedTable>> {
        Ok(None)
    }
}
