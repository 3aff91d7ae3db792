//! Statistics table extensions for an optimization host.
//!
//! Extension authors implement [`TableExtension`] on their own type and hand
//! it to [`include_table_extension`]; the host only ever sees a plain
//! callback table and opaque user data.

pub mod config;
pub mod extension;
pub mod host;
pub mod logging;
pub mod stage;

pub use config::HostConfig;
pub use extension::adapter::{TableError, TableExtension, TableIdentity, TableResult};
pub use extension::bridge::{
    find_table_extension, get_table_extension, include_owned_table_extension,
    include_table_extension, table_ownership, BridgeError, BridgeResult, Ownership, SharedTable,
};
pub use host::{
    HookError, HookResult, Host, HostError, HostHandle, HostResult, HostString, MemoryStats,
    TableCallbacks, TableDefinition, TableEntry, TableId,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use stage::{parse_stage, Stage, StageParseError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
