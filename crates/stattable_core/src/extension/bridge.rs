//! Bridge between [`TableExtension`] objects and the host table registry.
//!
//! The host only understands a table of plain function pointers plus opaque
//! user data. The bridge installs one set of forwarding callbacks for every
//! extension and stores the object itself in the entry's user data.
//!
//! # Invariants
//! - User data written here is always an `ExtensionSlot`; foreign user data
//!   is never reinterpreted.
//! - A host-owned object is dropped by host teardown, after its `free` hook.
//!   Its handle must be unique at registration.
//! - A caller-owned object is only observed; the host never drops it.

use crate::extension::adapter::TableExtension;
use crate::host::{
    Host, HostError, HookError, HookResult, TableCallbacks, TableDefinition, TableId,
};
use log::{info, warn};
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::rc::{Rc, Weak};

/// Shared handle to a registered extension object.
pub type SharedTable = Rc<RefCell<dyn TableExtension>>;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Who destroys a registered extension object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Host keeps the object alive and drops it during teardown.
    Host,
    /// Caller keeps the object alive and must drop it after host teardown.
    Caller,
}

/// Extension registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    Host(HostError),
    /// Object was built with a handle of another host instance.
    HostMismatch { table: String },
    /// Object is mutably borrowed and its identity cannot be read.
    ObjectBusy,
    /// Host ownership was requested while other strong handles exist.
    SharedHostOwned { table: String, refs: usize },
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host(err) => write!(f, "{err}"),
            Self::HostMismatch { table } => {
                write!(f, "statistics table <{table}> belongs to another host")
            }
            Self::ObjectBusy => write!(f, "extension object is in use"),
            Self::SharedHostOwned { table, refs } => write!(
                f,
                "statistics table <{table}> cannot be host-owned while {refs} handles share it"
            ),
        }
    }
}

impl Error for BridgeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HostError> for BridgeError {
    fn from(value: HostError) -> Self {
        Self::Host(value)
    }
}

enum SlotObject {
    Owned(SharedTable),
    Observed(Weak<RefCell<dyn TableExtension>>),
}

/// User data the bridge stores on each entry it creates.
struct ExtensionSlot {
    name: String,
    object: SlotObject,
}

impl ExtensionSlot {
    fn ownership(&self) -> Ownership {
        match self.object {
            SlotObject::Owned(_) => Ownership::Host,
            SlotObject::Observed(_) => Ownership::Caller,
        }
    }

    fn object(&self) -> Option<SharedTable> {
        match &self.object {
            SlotObject::Owned(object) => Some(Rc::clone(object)),
            SlotObject::Observed(object) => object.upgrade(),
        }
    }
}

/// Registers `object` as a statistics table of `host`.
///
/// With [`Ownership::Host`] the host takes over `object`, which must be the
/// only strong handle. With [`Ownership::Caller`] the entry keeps a weak observer and
/// the caller must keep its own handle alive until [`Host::free`] returns.
///
/// # Errors
/// - `HostMismatch` when the object's identity names another host.
/// - `SharedHostOwned` when host ownership is requested for a shared handle.
/// - `Host(DuplicateTable)` on a name collision; the first entry stays.
/// - `Host(InvalidStage | OutOfMemory)` from the host registry.
pub fn include_table_extension(
    host: &mut Host,
    object: SharedTable,
    ownership: Ownership,
) -> BridgeResult<TableId> {
    let (name, description, position, earliest_stage) = {
        let extension = object.try_borrow().map_err(|_| BridgeError::ObjectBusy)?;
        let identity = extension.identity();
        if !identity.host().same_host(host.handle()) {
            return Err(BridgeError::HostMismatch {
                table: identity.name().to_string(),
            });
        }
        (
            identity.name().to_string(),
            identity.description().to_string(),
            identity.position(),
            identity.earliest_stage(),
        )
    };

    let refs = Rc::strong_count(&object);
    if ownership == Ownership::Host && refs > 1 {
        warn!(
            "event=table_include module=bridge status=rejected reason=shared_host_owned table={} refs={}",
            name, refs
        );
        return Err(BridgeError::SharedHostOwned { table: name, refs });
    }
    let slot_object = match ownership {
        Ownership::Host => SlotObject::Owned(object),
        Ownership::Caller => SlotObject::Observed(Rc::downgrade(&object)),
    };
    let slot = ExtensionSlot {
        name: name.clone(),
        object: slot_object,
    };

    let definition = TableDefinition::new(
        name.as_str(),
        description,
        position,
        earliest_stage,
        forwarding_callbacks(),
    )
    .with_user_data(Box::new(slot));
    let id = host.include_table(definition)?;
    info!(
        "event=table_include module=bridge status=ok table={} ownership={:?}",
        name, ownership
    );
    Ok(id)
}

/// Registers `extension` as a host-owned table.
pub fn include_owned_table_extension<T>(host: &mut Host, extension: T) -> BridgeResult<TableId>
where
    T: TableExtension + 'static,
{
    include_table_extension(host, Rc::new(RefCell::new(extension)), Ownership::Host)
}

/// Returns the extension registered under `name`.
///
/// `None` when no such table exists, when the table was not registered
/// through this bridge, or when a caller-owned object was already dropped.
pub fn find_table_extension(host: &Host, name: &str) -> Option<SharedTable> {
    host.find_table(name)
        .and_then(|table| get_table_extension(host, table))
}

/// Returns the extension stored on entry `table`.
pub fn get_table_extension(host: &Host, table: TableId) -> Option<SharedTable> {
    extension_slot(host, table).and_then(ExtensionSlot::object)
}

/// Returns how the extension on `table` is owned, if it was registered here.
pub fn table_ownership(host: &Host, table: TableId) -> Option<Ownership> {
    extension_slot(host, table).map(ExtensionSlot::ownership)
}

fn extension_slot(host: &Host, table: TableId) -> Option<&ExtensionSlot> {
    host.table_data(table)?.downcast_ref::<ExtensionSlot>()
}

fn forwarding_callbacks() -> TableCallbacks {
    TableCallbacks {
        copy: Some(table_copy),
        free: Some(table_free),
        init: Some(table_init),
        exit: Some(table_exit),
        init_solve: Some(table_init_solve),
        exit_solve: Some(table_exit_solve),
        output: table_output,
    }
}

fn with_extension<R>(
    host: &Host,
    table: TableId,
    call: impl FnOnce(&mut dyn TableExtension) -> HookResult<R>,
) -> HookResult<R> {
    let slot = extension_slot(host, table).ok_or_else(|| {
        let name = host
            .table(table)
            .map(|entry| entry.name().to_string())
            .unwrap_or_default();
        HookError::Unbound(name)
    })?;
    let object = slot
        .object()
        .ok_or_else(|| HookError::ObjectReleased(slot.name.clone()))?;
    let mut extension = object
        .try_borrow_mut()
        .map_err(|_| HookError::Busy(slot.name.clone()))?;
    call(&mut *extension)
}

fn table_free(host: &Host, table: TableId) -> HookResult<()> {
    with_extension(host, table, |extension| extension.free(host, table))
}

fn table_init(host: &Host, table: TableId) -> HookResult<()> {
    with_extension(host, table, |extension| extension.init(host, table))
}

fn table_exit(host: &Host, table: TableId) -> HookResult<()> {
    with_extension(host, table, |extension| extension.exit(host, table))
}

fn table_init_solve(host: &Host, table: TableId) -> HookResult<()> {
    with_extension(host, table, |extension| extension.init_solve(host, table))
}

fn table_exit_solve(host: &Host, table: TableId) -> HookResult<()> {
    with_extension(host, table, |extension| extension.exit_solve(host, table))
}

fn table_output(host: &Host, table: TableId, sink: &mut dyn Write) -> HookResult<()> {
    with_extension(host, table, |extension| extension.output(host, table, sink))
}

fn table_copy(source: &Host, table: TableId, target: &mut Host) -> HookResult<()> {
    let copy = with_extension(source, table, |extension| {
        extension.clone_for(target.handle())
    })?;
    let Some(copy) = copy else {
        return Ok(());
    };
    include_table_extension(target, copy, Ownership::Host).map_err(|err| match err {
        BridgeError::Host(host_err) => HookError::from(host_err),
        other => HookError::failed(other.to_string()),
    })?;
    Ok(())
}
