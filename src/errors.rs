//! The central error type for the agent core.
//!
//! This hierarchy enables programmatic recovery and unified error handling
//! across orchestrator, tool, critic, task, and self-modification layers.
//! Mirrors the subsystem boundaries of the design: most subsystem methods
//! swallow their own errors into a status enum (per the error propagation
//! policy) and log via `tracing`; this hierarchy exists for the remaining
//! boundary crossings that do return `Result`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentCoreError {
    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("self-modification error: {0}")]
    SelfMod(#[from] SelfModError),

    #[error("task error: {0}")]
    Task(#[from] TaskError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("persistence error at {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("planner returned no plan")]
    EmptyPlan,

    #[error("plan could not be parsed: {0}")]
    UnparseablePlan(String),

    #[error("replan bound of {limit} exceeded for this goal")]
    ReplanBoundExceeded { limit: usize },
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool '{name}' not found")]
    NotFound { name: String },

    #[error("tool '{name}' failed: {message}")]
    Execution { name: String, message: String },

    #[error("invalid arguments for tool '{name}': {message}")]
    InvalidArguments { name: String, message: String },
}

#[derive(Error, Debug)]
pub enum SelfModError {
    #[error("could not resolve module path '{module_path}' under {root}")]
    ModuleNotFound { module_path: String, root: PathBuf },

    #[error("function '{function_name}' not found in {path}")]
    FunctionNotFound {
        function_name: String,
        path: PathBuf,
    },

    #[error("new code did not parse as a single top-level function: {0}")]
    InvalidFunctionSource(String),

    #[error("critics rejected the change")]
    CriticRejected,

    #[error("failed while applying change: {0}")]
    ApplyFailed(String),

    #[error("backup file missing for {0}")]
    BackupMissing(PathBuf),
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task '{0}' not found")]
    NotFound(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

pub type Result<T> = std::result::Result<T, AgentCoreError>;
