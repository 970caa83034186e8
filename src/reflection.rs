//! Reflection Log (C2)
//!
//! Append-only record of goal executions with unique entry ids. Writes are
//! atomic; analysis is pure and never mutates prior entries (§4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReflectionStatus {
    Success,
    Failure,
    PartialSuccess,
}

/// One step of a plan, as recorded for replay and diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStepRecord {
    pub tool_name: String,
    pub args: Value,
}

/// The outcome of executing one plan step: either the tool's return value
/// or an error representation (§3, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepResult {
    Value(Value),
    Error { error: String },
}

impl StepResult {
    pub fn is_error(&self) -> bool {
        matches!(self, StepResult::Error { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionLogEntry {
    pub entry_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub goal_description: String,
    pub plan: Vec<PlanStepRecord>,
    pub execution_results: Vec<StepResult>,
    pub status: ReflectionStatus,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub notes: Option<String>,
    pub is_self_modification_attempt: bool,
    pub source_suggestion_id: Option<Uuid>,
    pub modification_type: Option<String>,
    pub modification_details: Option<Value>,
    pub post_modification_test_passed: Option<bool>,
}

/// Parameters for [`ReflectionLog::log_execution`], grouped because the
/// distilled interface takes many optional self-modification fields.
#[derive(Debug, Clone, Default)]
pub struct LogExecutionParams {
    pub notes: Option<String>,
    pub is_self_modification_attempt: bool,
    pub source_suggestion_id: Option<Uuid>,
    pub modification_type: Option<String>,
    pub modification_details: Option<Value>,
    pub post_modification_test_passed: Option<bool>,
    pub status_override: Option<ReflectionStatus>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

pub struct ReflectionLog {
    path: Option<PathBuf>,
    entries: parking_lot::RwLock<Vec<ReflectionLogEntry>>,
}

impl ReflectionLog {
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        let entries: Vec<ReflectionLogEntry> =
            crate::persistence::read_json_opt(&path)?.unwrap_or_default();
        Ok(Self {
            path: Some(path),
            entries: parking_lot::RwLock::new(entries),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: parking_lot::RwLock::new(Vec::new()),
        }
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.path {
            crate::persistence::write_json_atomic(path, &*self.entries.read())?;
        }
        Ok(())
    }

    /// Append a new entry, minting a fresh `entry_id`, and persist
    /// atomically. `overall_success` determines the default status; it is
    /// overridden by `params.status_override` when present (used to record
    /// `PARTIAL_SUCCESS`).
    pub fn log_execution(
        &self,
        goal: &str,
        plan: Vec<PlanStepRecord>,
        results: Vec<StepResult>,
        overall_success: bool,
        params: LogExecutionParams,
    ) -> anyhow::Result<ReflectionLogEntry> {
        let status = params.status_override.unwrap_or(if overall_success {
            ReflectionStatus::Success
        } else {
            ReflectionStatus::Failure
        });

        let entry = ReflectionLogEntry {
            entry_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            goal_description: goal.to_string(),
            plan,
            execution_results: results,
            status,
            error_type: params.error_type,
            error_message: params.error_message,
            notes: params.notes,
            is_self_modification_attempt: params.is_self_modification_attempt,
            source_suggestion_id: params.source_suggestion_id,
            modification_type: params.modification_type,
            modification_details: params.modification_details,
            post_modification_test_passed: params.post_modification_test_passed,
        };

        self.entries.write().push(entry.clone());
        self.persist()?;
        Ok(entry)
    }

    pub fn find_by_entry_id(&self, entry_id: Uuid) -> Option<ReflectionLogEntry> {
        self.entries
            .read()
            .iter()
            .find(|e| e.entry_id == entry_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<ReflectionLogEntry> {
        self.entries.read().clone()
    }

    /// Returns the most recent entry whose status is not `SUCCESS`, if any.
    /// Pure: never mutates prior entries.
    pub fn analyze_last_failure(&self) -> Option<ReflectionLogEntry> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|e| e.status != ReflectionStatus::Success)
            .cloned()
    }

    /// Returns up to `limit` most recent entries, newest first, as raw
    /// material for the Learning Agent (C12).
    pub fn get_learnings_from_reflections(&self, limit: usize) -> Vec<ReflectionLogEntry> {
        let entries = self.entries.read();
        entries.iter().rev().take(limit).cloned().collect()
    }
}
