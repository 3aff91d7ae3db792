//! Minimal host engine model owning the statistics table registry.
//!
//! # Responsibility
//! - Own the plugin table and the memory ledger of one host instance.
//! - Drive table callbacks at fixed lifecycle points.
//!
//! # Invariants
//! - Tables can only be included in `init` or `problem` stage.
//! - Table names are unique per host instance.
//! - Every table's `free` callback runs exactly once, at teardown, before its
//!   user data is released.
//!
//! # See also
//! - `crate::extension::bridge` for the object adapter installed on entries.

use crate::config::HostConfig;
use crate::stage::Stage;
use log::{debug, info, warn};
use std::any::Any;
use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};
use std::rc::Rc;
use uuid::Uuid;

pub mod memory;
pub mod table;

pub use memory::{HostString, MemoryStats};
pub use table::{
    TableCallbacks, TableCopyFn, TableDefinition, TableEntry, TableHookFn, TableId, TableOutputFn,
};

use memory::MemoryLedger;

pub type HostResult<T> = Result<T, HostError>;
pub type HookResult<T> = Result<T, HookError>;

/// Host-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    DuplicateTable(String),
    InvalidStage {
        operation: &'static str,
        stage: Stage,
    },
    TableNotFound(String),
    OutOfMemory {
        requested: usize,
        limit: usize,
        in_use: usize,
    },
    Hook {
        table: String,
        hook: &'static str,
        source: HookError,
    },
}

impl Display for HostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateTable(name) => write!(f, "statistics table <{name}> already included"),
            Self::InvalidStage { operation, stage } => {
                write!(f, "{operation} is not allowed in stage {stage}")
            }
            Self::TableNotFound(name) => write!(f, "statistics table <{name}> not found"),
            Self::OutOfMemory {
                requested,
                limit,
                in_use,
            } => write!(
                f,
                "host memory exhausted: requested {requested} bytes with {in_use} of {limit} in use"
            ),
            Self::Hook {
                table,
                hook,
                source,
            } => write!(f, "{hook} callback of table <{table}> failed: {source}"),
        }
    }
}

impl Error for HostError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Hook { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure reported by one table callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// Extension-defined failure.
    Failed(String),
    /// Writing to the output sink failed.
    Io { kind: io::ErrorKind, message: String },
    /// Entry carries no object installed by the extension bridge.
    Unbound(String),
    /// Caller-owned object was dropped while still registered.
    ObjectReleased(String),
    /// Object is already borrowed by a callback further up the stack.
    Busy(String),
    /// Host operation issued from inside a callback failed.
    Host(Box<HostError>),
}

impl HookError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl Display for HookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(message) => write!(f, "{message}"),
            Self::Io { kind, message } => write!(f, "output error ({kind:?}): {message}"),
            Self::Unbound(name) => write!(f, "table <{name}> has no extension object"),
            Self::ObjectReleased(name) => {
                write!(f, "extension object of table <{name}> was already released")
            }
            Self::Busy(name) => write!(f, "extension object of table <{name}> is in use"),
            Self::Host(err) => write!(f, "{err}"),
        }
    }
}

impl Error for HookError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Host(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for HookError {
    fn from(value: io::Error) -> Self {
        Self::Io {
            kind: value.kind(),
            message: value.to_string(),
        }
    }
}

impl From<HostError> for HookError {
    fn from(value: HostError) -> Self {
        Self::Host(Box::new(value))
    }
}

struct HostShared {
    id: Uuid,
    name: String,
    stage: Cell<Stage>,
    ledger: Rc<MemoryLedger>,
}

/// Cloneable handle to one host instance.
///
/// Extension objects keep one to allocate through the host and to read its
/// identity. The handle stays valid after the host itself is freed.
#[derive(Clone)]
pub struct HostHandle {
    shared: Rc<HostShared>,
}

impl HostHandle {
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn stage(&self) -> Stage {
        self.shared.stage.get()
    }

    /// Copies `value` into memory charged to this host.
    pub fn duplicate_string(&self, value: &str) -> HostResult<HostString> {
        HostString::duplicate(&self.shared.ledger, value)
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.shared.ledger.stats()
    }

    /// Whether both handles refer to the same host instance.
    pub fn same_host(&self, other: &HostHandle) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("stage", &self.shared.stage.get())
            .finish()
    }
}

/// One host engine instance.
pub struct Host {
    handle: HostHandle,
    tables: Vec<TableEntry>,
    torn_down: bool,
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        let shared = HostShared {
            id: Uuid::new_v4(),
            name: config.name,
            stage: Cell::new(config.initial_stage),
            ledger: Rc::new(MemoryLedger::new(config.memory_limit_bytes)),
        };
        info!(
            "event=host_create module=host status=ok host={} id={} stage={}",
            shared.name,
            shared.id,
            config.initial_stage
        );
        Self {
            handle: HostHandle {
                shared: Rc::new(shared),
            },
            tables: Vec::new(),
            torn_down: false,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HostConfig::default())
    }

    pub fn handle(&self) -> &HostHandle {
        &self.handle
    }

    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    pub fn stage(&self) -> Stage {
        self.handle.stage()
    }

    /// Moves the host to `stage` without running callbacks.
    pub fn set_stage(&mut self, stage: Stage) {
        self.handle.shared.stage.set(stage);
    }

    /// Registers one statistics table.
    ///
    /// # Errors
    /// - `InvalidStage` outside `init`/`problem`.
    /// - `DuplicateTable` when the name is taken; the existing entry is kept.
    /// - `OutOfMemory` when name or description cannot be copied.
    pub fn include_table(&mut self, definition: TableDefinition) -> HostResult<TableId> {
        let stage = self.stage();
        if !matches!(stage, Stage::Init | Stage::Problem) {
            return Err(HostError::InvalidStage {
                operation: "include_table",
                stage,
            });
        }
        if self.find_table(&definition.name).is_some() {
            warn!(
                "event=table_include module=host status=rejected reason=duplicate table={}",
                definition.name
            );
            return Err(HostError::DuplicateTable(definition.name));
        }

        let name = self.handle.duplicate_string(&definition.name)?;
        let description = self.handle.duplicate_string(&definition.description)?;
        let id = TableId {
            host: self.id(),
            index: self.tables.len(),
        };
        self.tables.push(TableEntry {
            id,
            name,
            description,
            position: definition.position,
            earliest_stage: definition.earliest_stage,
            active: definition.active,
            initialized: false,
            solving: false,
            callbacks: definition.callbacks,
            user_data: definition.user_data,
        });
        info!(
            "event=table_include module=host status=ok table={} position={} earliest_stage={}",
            definition.name, definition.position, definition.earliest_stage
        );
        Ok(id)
    }

    /// Returns the entry id registered under `name`.
    pub fn find_table(&self, name: &str) -> Option<TableId> {
        self.tables
            .iter()
            .find(|entry| entry.name() == name)
            .map(TableEntry::id)
    }

    /// Returns the entry for `id`, if it belongs to this host.
    pub fn table(&self, id: TableId) -> Option<&TableEntry> {
        if id.host != self.id() {
            return None;
        }
        self.tables.get(id.index)
    }

    /// Returns the opaque user data stored on an entry.
    pub fn table_data(&self, id: TableId) -> Option<&dyn Any> {
        self.table(id).and_then(TableEntry::user_data)
    }

    /// Entries in registration order.
    pub fn tables(&self) -> impl Iterator<Item = &TableEntry> {
        self.tables.iter()
    }

    /// Entries sorted by position; ties keep registration order.
    pub fn tables_by_position(&self) -> Vec<&TableEntry> {
        let mut sorted: Vec<&TableEntry> = self.tables.iter().collect();
        sorted.sort_by_key(|entry| entry.position);
        sorted
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn set_table_active(&mut self, name: &str, active: bool) -> HostResult<()> {
        let entry = self
            .tables
            .iter_mut()
            .find(|entry| entry.name() == name)
            .ok_or_else(|| HostError::TableNotFound(name.to_string()))?;
        entry.active = active;
        debug!(
            "event=table_active module=host status=ok table={} active={}",
            name, active
        );
        Ok(())
    }

    /// Problem -> Transformed, running every `init` callback.
    ///
    /// On an `init` failure the tables initialized so far get their `exit`
    /// callback and the host returns to Problem.
    pub fn transform(&mut self) -> HostResult<()> {
        self.require_stage("transform", &[Stage::Problem])?;
        self.set_stage(Stage::Transforming);
        for index in 0..self.tables.len() {
            if let Err(err) = self.run_hook(index, "init", |callbacks| callbacks.init) {
                self.set_stage(Stage::FreeTrans);
                let _ = self.release_transform();
                self.set_stage(Stage::Problem);
                return Err(err);
            }
            self.tables[index].initialized = true;
        }
        self.set_stage(Stage::Transformed);
        Ok(())
    }

    /// Transformed -> Solved, running `init_solve` before the search starts.
    ///
    /// On an `init_solve` failure the tables started so far get their
    /// `exit_solve` callback and the host returns to Transformed.
    pub fn solve(&mut self) -> HostResult<()> {
        self.require_stage("solve", &[Stage::Transformed])?;
        self.set_stage(Stage::InitSolve);
        for index in 0..self.tables.len() {
            if let Err(err) = self.run_hook(index, "init_solve", |callbacks| callbacks.init_solve)
            {
                self.set_stage(Stage::ExitSolve);
                let _ = self.release_solve();
                self.set_stage(Stage::Transformed);
                return Err(err);
            }
            self.tables[index].solving = true;
        }
        self.set_stage(Stage::Solving);
        self.set_stage(Stage::Solved);
        info!(
            "event=host_solve module=host status=ok host={}",
            self.handle.name()
        );
        Ok(())
    }

    /// Solving/Solved -> Transformed, running every `exit_solve` callback.
    ///
    /// Every started table gets `exit_solve` even if an earlier one fails;
    /// the first failure is returned.
    pub fn free_solve(&mut self) -> HostResult<()> {
        self.require_stage("free_solve", &[Stage::Solving, Stage::Solved])?;
        self.set_stage(Stage::ExitSolve);
        let result = self.release_solve();
        self.set_stage(Stage::Transformed);
        result
    }

    /// Back to Problem, running every `exit` callback.
    ///
    /// A pending solve is freed first. Every initialized table gets `exit`
    /// even if an earlier one fails; the first failure is returned.
    pub fn free_transform(&mut self) -> HostResult<()> {
        let mut first_error = None;
        if matches!(self.stage(), Stage::Solving | Stage::Solved) {
            if let Err(err) = self.free_solve() {
                first_error.get_or_insert(err);
            }
        }
        self.require_stage("free_transform", &[Stage::Transformed])?;
        self.set_stage(Stage::FreeTrans);
        if let Err(err) = self.release_transform() {
            first_error.get_or_insert(err);
        }
        self.set_stage(Stage::Problem);
        first_error.map_or(Ok(()), Err)
    }

    /// Writes every active table whose earliest stage was reached, by position.
    pub fn print_statistics(&self, sink: &mut dyn Write) -> HostResult<()> {
        let stage = self.stage();
        for entry in self.tables_by_position() {
            if !entry.active || !stage.reached(entry.earliest_stage) {
                continue;
            }
            (entry.callbacks.output)(self, entry.id, &mut *sink)
                .map_err(|source| hook_failure(entry, "output", source))?;
        }
        Ok(())
    }

    /// Runs every copy callback against `target`. Returns how many ran.
    pub fn copy_tables_into(&self, target: &mut Host) -> HostResult<usize> {
        let mut copied = 0;
        for entry in &self.tables {
            let Some(copy) = entry.callbacks.copy else {
                continue;
            };
            copy(self, entry.id, target).map_err(|source| hook_failure(entry, "copy", source))?;
            copied += 1;
        }
        debug!(
            "event=host_copy module=host status=ok source={} target={} tables={}",
            self.handle.name(),
            target.handle.name(),
            copied
        );
        Ok(copied)
    }

    /// Shuts the host down.
    ///
    /// Every table's `free` callback runs, then its user data is released.
    /// Teardown continues past failures; the first one is returned.
    pub fn free(mut self) -> HostResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> HostResult<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let mut first_error = None;
        if self
            .tables
            .iter()
            .any(|entry| entry.initialized || entry.solving)
        {
            self.set_stage(Stage::FreeTrans);
            if let Err(err) = self.release_transform() {
                first_error.get_or_insert(err);
            }
        }
        self.set_stage(Stage::Free);

        for index in 0..self.tables.len() {
            if let Err(err) = self.run_hook(index, "free", |callbacks| callbacks.free) {
                first_error.get_or_insert(err);
            }
            drop(self.tables[index].user_data.take());
        }
        let released = self.tables.len();
        self.tables.clear();

        info!(
            "event=host_free module=host status={} host={} tables={}",
            if first_error.is_some() { "error" } else { "ok" },
            self.handle.name(),
            released
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Runs `exit_solve` on every started table, continuing past failures.
    fn release_solve(&mut self) -> HostResult<()> {
        let mut first_error = None;
        for index in 0..self.tables.len() {
            if !self.tables[index].solving {
                continue;
            }
            if let Err(err) = self.run_hook(index, "exit_solve", |callbacks| callbacks.exit_solve) {
                first_error.get_or_insert(err);
            }
            self.tables[index].solving = false;
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Frees any pending solve, then runs `exit` on every initialized table.
    fn release_transform(&mut self) -> HostResult<()> {
        let mut first_error = self.release_solve().err();
        for index in 0..self.tables.len() {
            if !self.tables[index].initialized {
                continue;
            }
            if let Err(err) = self.run_hook(index, "exit", |callbacks| callbacks.exit) {
                first_error.get_or_insert(err);
            }
            self.tables[index].initialized = false;
        }
        first_error.map_or(Ok(()), Err)
    }

    fn require_stage(&self, operation: &'static str, allowed: &[Stage]) -> HostResult<()> {
        let stage = self.stage();
        if allowed.contains(&stage) {
            Ok(())
        } else {
            Err(HostError::InvalidStage { operation, stage })
        }
    }

    fn run_hook(
        &self,
        index: usize,
        hook: &'static str,
        pick: fn(&TableCallbacks) -> Option<TableHookFn>,
    ) -> HostResult<()> {
        let entry = &self.tables[index];
        let Some(callback) = pick(&entry.callbacks) else {
            return Ok(());
        };
        debug!(
            "event=table_hook module=host hook={} table={}",
            hook,
            entry.name()
        );
        callback(self, entry.id).map_err(|source| hook_failure(entry, hook, source))
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            warn!(
                "event=host_free module=host status=error host={} error={}",
                self.handle.name(),
                err
            );
        }
    }
}

fn hook_failure(entry: &TableEntry, hook: &'static str, source: HookError) -> HostError {
    warn!(
        "event=table_hook module=host status=error hook={} table={} error={}",
        hook,
        entry.name(),
        source
    );
    HostError::Hook {
        table: entry.name().to_string(),
        hook,
        source,
    }
}
