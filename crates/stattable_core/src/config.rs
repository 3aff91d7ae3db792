//! Host instance configuration.
//!
//! # Responsibility
//! - Carry the few knobs a host instance is created with.
//! - Stay deserializable so embedding applications can load it from their
//!   own config files.

use crate::stage::Stage;
use serde::{Deserialize, Serialize};

const DEFAULT_HOST_NAME: &str = "host";

/// Settings applied when a [`Host`](crate::host::Host) is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Display name used in log events.
    pub name: String,
    /// Upper bound on bytes the host memory ledger may hand out.
    /// `None` means unlimited.
    pub memory_limit_bytes: Option<usize>,
    /// Stage the host starts in. Tables can only be included while the
    /// host is in `init` or `problem`.
    pub initial_stage: Stage,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_HOST_NAME.to_string(),
            memory_limit_bytes: None,
            initial_stage: Stage::Problem,
        }
    }
}

impl HostConfig {
    /// Returns a copy with the memory limit set.
    pub fn with_memory_limit(mut self, limit_bytes: usize) -> Self {
        self.memory_limit_bytes = Some(limit_bytes);
        self
    }
}
