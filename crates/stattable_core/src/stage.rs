//! Host lifecycle stages.
//!
//! # Invariants
//! - Variant declaration order is the lifecycle order; `Ord` follows it.
//! - String ids are stable and lowercase.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Position of a host instance in its run lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Host created, no problem loaded.
    #[default]
    Init,
    /// Original problem is being built.
    Problem,
    /// Working copy is being created; `init` callbacks run.
    Transforming,
    /// Working copy of the problem exists.
    Transformed,
    /// Presolving is about to start.
    InitPresolve,
    /// Presolving is running.
    Presolving,
    /// Presolving is about to finish.
    ExitPresolve,
    /// Presolving finished.
    Presolved,
    /// Search is about to start; `init_solve` callbacks run.
    InitSolve,
    /// Search is running.
    Solving,
    /// Search finished.
    Solved,
    /// Search data is being freed; `exit_solve` callbacks run.
    ExitSolve,
    /// Working copy is being freed; `exit` callbacks run.
    FreeTrans,
    /// Host is tearing down.
    Free,
}

const ALL_STAGES: &[Stage] = &[
    Stage::Init,
    Stage::Problem,
    Stage::Transforming,
    Stage::Transformed,
    Stage::InitPresolve,
    Stage::Presolving,
    Stage::ExitPresolve,
    Stage::Presolved,
    Stage::InitSolve,
    Stage::Solving,
    Stage::Solved,
    Stage::ExitSolve,
    Stage::FreeTrans,
    Stage::Free,
];

impl Stage {
    /// All stages in lifecycle order.
    pub fn all() -> &'static [Stage] {
        ALL_STAGES
    }

    /// Stable string id.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Problem => "problem",
            Self::Transforming => "transforming",
            Self::Transformed => "transformed",
            Self::InitPresolve => "init_presolve",
            Self::Presolving => "presolving",
            Self::ExitPresolve => "exit_presolve",
            Self::Presolved => "presolved",
            Self::InitSolve => "init_solve",
            Self::Solving => "solving",
            Self::Solved => "solved",
            Self::ExitSolve => "exit_solve",
            Self::FreeTrans => "free_trans",
            Self::Free => "free",
        }
    }

    /// Returns whether this stage is `earliest` or later.
    pub fn reached(self, earliest: Stage) -> bool {
        self >= earliest
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses one stage from its string id.
pub fn parse_stage(value: &str) -> Result<Stage, StageParseError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(StageParseError::Empty);
    }
    ALL_STAGES
        .iter()
        .copied()
        .find(|stage| stage.as_str() == normalized)
        .ok_or_else(|| StageParseError::Unknown(normalized.to_string()))
}

/// Stage parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageParseError {
    Empty,
    Unknown(String),
}

impl Display for StageParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "stage value must not be empty"),
            Self::Unknown(value) => write!(f, "unknown stage: {value}"),
        }
    }
}

impl Error for StageParseError {}
