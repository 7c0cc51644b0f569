//! State persistence for the KubeAgent orchestration engine.
//!
//! The executor and planner write tasks, plans and context snapshots through
//! the [`StateStore`] trait on a best-effort basis. Two backends ship here:
//! [`MemoryStateStore`] for tests and one-shot runs, and [`FileStateStore`]
//! which keeps one JSON document per record on disk.

/// Storage trait and backends.
pub mod store;

pub use store::{FileStateStore, MemoryStateStore, StateStore};
