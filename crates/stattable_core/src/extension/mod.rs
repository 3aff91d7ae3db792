//! Object-style statistics table extensions.
//!
//! `adapter` defines what an extension author implements; `bridge` plugs
//! such objects into the host table registry and recovers them again.

pub mod adapter;
pub mod bridge;
