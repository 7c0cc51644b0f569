//! Dependency-aware orchestration of specialist agents.
//!
//! A request is classified and decomposed into an [`ExecutionPlan`] by the
//! [`Planner`], checked by the [`validate`] pass and then run round by round
//! by the [`Executor`]: every task whose dependencies are processed runs
//! concurrently with its peers, conditional tasks are gated on the outcome of
//! their prerequisites, and the results are folded into one response.
//!
//! # Main types
//!
//! - [`Coordinator`]: Top-level façade: registry, planning and execution.
//! - [`AgentRegistry`]: One worker per capability type, deterministic dispatch.
//! - [`Executor`]: Round-based scheduler with time boxing and cancellation.
//! - [`Planner`]: LLM-backed intent classification and task decomposition.
//!
//! [`ExecutionPlan`]: kubeagent_core::ExecutionPlan

/// Run-condition evaluation for gated tasks.
pub mod condition;
/// Coordinator façade.
pub mod coordinator;
/// Round-based plan executor.
pub mod executor;
/// Request planning.
pub mod planner;
/// Worker registry and dispatch.
pub mod registry;
/// Task graph validation.
pub mod validator;

#[cfg(test)]
mod testing;

pub use condition::{evaluate, Gate};
pub use coordinator::Coordinator;
pub use executor::{Executor, ExecutorConfig};
pub use planner::{parse_decomposition, Planner};
pub use registry::AgentRegistry;
pub use validator::validate;
