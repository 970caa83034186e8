//! Task Manager (C3)
//!
//! Lifecycle state machine for every asynchronous unit of work, with
//! crash-safe persistence. Every mutation is followed by a full
//! serialization of the active set; terminal transitions archive the task,
//! emit a typed notification, and save (§4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

use crate::notifications::{EventType, NotificationBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    AgentToolCreation,
    AgentToolModification,
    UserProjectGeneric,
    LearningNewFact,
    ProcessingReflection,
    SuggestionProcessing,
    MiscCodeGeneration,
    PlanningCodeStructure,
}

/// The state machine of §4.3, reproduced as a flat enum. `is_terminal`
/// encodes which states are terminal (success or failure) and therefore
/// trigger archival + notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Initializing,
    Planning,
    GeneratingCode,
    AwaitingCriticReview,
    CriticReviewApproved,
    ApplyingChanges,
    PostModTesting,
    PostModTestPassed,
    CompletedSuccessfully,

    FailedPreReview,
    CriticReviewRejected,
    FailedDuringApply,
    PostModTestFailed,
    FailedCodeGeneration,
    FailedUnknown,
    UserCancelled,
    FailedInterrupted,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::CompletedSuccessfully
                | TaskStatus::FailedPreReview
                | TaskStatus::CriticReviewRejected
                | TaskStatus::FailedDuringApply
                | TaskStatus::PostModTestFailed
                | TaskStatus::FailedCodeGeneration
                | TaskStatus::FailedUnknown
                | TaskStatus::UserCancelled
                | TaskStatus::FailedInterrupted
        )
    }

    /// Fixed status -> event mapping (§4.3 transition (b)).
    pub fn terminal_event(self) -> Option<EventType> {
        match self {
            TaskStatus::CompletedSuccessfully => Some(EventType::TaskCompletedSuccessfully),
            TaskStatus::FailedPreReview => Some(EventType::TaskFailedPreReview),
            TaskStatus::CriticReviewRejected => Some(EventType::TaskCriticReviewRejected),
            TaskStatus::FailedDuringApply => Some(EventType::TaskFailedDuringApply),
            TaskStatus::PostModTestFailed => Some(EventType::TaskPostModTestFailed),
            TaskStatus::FailedCodeGeneration => Some(EventType::TaskFailedCodeGeneration),
            TaskStatus::FailedUnknown => Some(EventType::TaskFailedUnknown),
            TaskStatus::UserCancelled => Some(EventType::TaskUserCancelled),
            TaskStatus::FailedInterrupted => Some(EventType::TaskFailedInterrupted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub description: String,
    pub related_item_id: Option<String>,
    pub status: TaskStatus,
    pub status_reason: Option<String>,
    pub current_step_description: Option<String>,
    pub current_sub_step_name: Option<String>,
    pub progress_percentage: Option<u8>,
    pub error_count: u32,
    pub output_preview: Option<String>,
    pub data_for_resume: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub details: Value,
}

const OUTPUT_PREVIEW_LIMIT: usize = 250;

fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= OUTPUT_PREVIEW_LIMIT {
        text.to_string()
    } else {
        text.chars().take(OUTPUT_PREVIEW_LIMIT).collect()
    }
}

/// Parameters for [`TaskManager::update_task_status`]; grouped for the same
/// reason as `LogExecutionParams` -- the distilled interface has many
/// independently-optional fields.
#[derive(Debug, Clone, Default)]
pub struct UpdateTaskParams {
    pub reason: Option<String>,
    pub step_description: Option<String>,
    pub sub_step_name: Option<String>,
    pub progress_percentage: Option<u8>,
    pub is_error_increment: bool,
    pub output_preview: Option<String>,
    pub resume_data: Option<Value>,
}

struct Inner {
    active: Vec<ActiveTask>,
    archived: std::collections::VecDeque<ActiveTask>,
    pending_interrupted_notifications: Vec<ActiveTask>,
}

pub struct TaskManager {
    path: Option<PathBuf>,
    archive_cap: usize,
    inner: parking_lot::RwLock<Inner>,
}

impl TaskManager {
    pub fn new(path: PathBuf, archive_cap: usize) -> anyhow::Result<Self> {
        let loaded: Vec<ActiveTask> = crate::persistence::read_json_opt(&path)?.unwrap_or_default();
        let manager = Self {
            path: Some(path),
            archive_cap,
            inner: parking_lot::RwLock::new(Inner {
                active: Vec::new(),
                archived: std::collections::VecDeque::new(),
                pending_interrupted_notifications: Vec::new(),
            }),
        };
        manager.reclassify_on_startup(loaded);
        Ok(manager)
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            archive_cap: 100,
            inner: parking_lot::RwLock::new(Inner {
                active: Vec::new(),
                archived: std::collections::VecDeque::new(),
                pending_interrupted_notifications: Vec::new(),
            }),
        }
    }

    /// §8 invariant 3: any loaded task whose status is non-terminal becomes
    /// `FAILED_INTERRUPTED` with no other mutation, and is archived like any
    /// other terminal transition. There is no bus yet at construction time,
    /// so the reclassified tasks are queued and callers must call
    /// `reconcile_interrupted_with_bus` afterwards to emit the notifications.
    fn reclassify_on_startup(&self, loaded: Vec<ActiveTask>) {
        let mut inner = self.inner.write();
        for mut task in loaded {
            if !task.status.is_terminal() {
                task.status = TaskStatus::FailedInterrupted;
                task.status_reason = Some("reclassified on process restart".to_string());
                task.last_updated_at = Utc::now();
            }
            if task.status.is_terminal() {
                if task.status == TaskStatus::FailedInterrupted {
                    inner.pending_interrupted_notifications.push(task.clone());
                }
                Self::archive_into(&mut inner.archived, task, self.archive_cap);
            } else {
                inner.active.push(task);
            }
        }
    }

    /// Drains the tasks reclassified to `FAILED_INTERRUPTED` during
    /// construction and emits the one notification each is still owed
    /// (§8 invariant 2). Idempotent: once drained, a task is not
    /// renotified by a later call.
    pub fn reconcile_interrupted_with_bus(&self, notifications: &NotificationBus) -> anyhow::Result<()> {
        let pending = std::mem::take(&mut self.inner.write().pending_interrupted_notifications);
        for task in pending {
            notifications.add_notification(
                EventType::TaskFailedInterrupted,
                &format!(
                    "Task '{}' reached terminal status {:?}",
                    task.description, task.status
                ),
                Some(task.task_id.to_string()),
                Some("task".to_string()),
                task.status_reason.clone().map(Value::String),
            )?;
        }
        Ok(())
    }

    fn archive_into(
        archived: &mut std::collections::VecDeque<ActiveTask>,
        task: ActiveTask,
        cap: usize,
    ) {
        archived.push_front(task);
        while archived.len() > cap {
            // LRU by last_updated_at: evict the oldest tail entry.
            archived.pop_back();
        }
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.path {
            let active = self.inner.read().active.clone();
            crate::persistence::write_json_atomic(path, &active)?;
        }
        Ok(())
    }

    pub fn add_task(
        &self,
        description: &str,
        task_type: TaskType,
        related_item_id: Option<String>,
        details: Option<Value>,
    ) -> anyhow::Result<ActiveTask> {
        let now = Utc::now();
        let task = ActiveTask {
            task_id: Uuid::new_v4(),
            task_type,
            description: description.to_string(),
            related_item_id,
            status: TaskStatus::Initializing,
            status_reason: None,
            current_step_description: None,
            current_sub_step_name: None,
            progress_percentage: None,
            error_count: 0,
            output_preview: None,
            data_for_resume: None,
            created_at: now,
            last_updated_at: now,
            details: details.unwrap_or(Value::Null),
        };
        self.inner.write().active.push(task.clone());
        self.persist()?;
        Ok(task)
    }

    /// Update a task's status, applying the terminal-transition side
    /// effects of §4.3 when the new status is terminal: archive, notify,
    /// and persist.
    pub fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        params: UpdateTaskParams,
        notifications: &NotificationBus,
    ) -> anyhow::Result<Option<ActiveTask>> {
        let mut terminal_task: Option<ActiveTask> = None;
        let updated = {
            let mut inner = self.inner.write();
            let Some(pos) = inner.active.iter().position(|t| t.task_id == task_id) else {
                return Ok(None);
            };

            {
                let task = &mut inner.active[pos];
                task.status = status;
                task.last_updated_at = Utc::now();
                if let Some(reason) = params.reason {
                    task.status_reason = Some(reason);
                }
                if let Some(step) = params.step_description {
                    task.current_step_description = Some(step);
                }
                if let Some(sub_step) = params.sub_step_name {
                    task.current_sub_step_name = Some(sub_step);
                }
                if let Some(progress) = params.progress_percentage {
                    task.progress_percentage = Some(progress);
                }
                if params.is_error_increment {
                    task.error_count += 1;
                }
                if let Some(preview) = params.output_preview {
                    task.output_preview = Some(truncate_preview(&preview));
                }
                if let Some(resume) = params.resume_data {
                    task.data_for_resume = Some(resume);
                }
            }

            if status.is_terminal() {
                let task = inner.active.remove(pos);
                terminal_task = Some(task.clone());
                Self::archive_into(&mut inner.archived, task.clone(), self.archive_cap);
                Some(task)
            } else {
                Some(inner.active[pos].clone())
            }
        };

        if let Some(task) = &terminal_task {
            if let Some(event) = task.status.terminal_event() {
                notifications.add_notification(
                    event,
                    &format!(
                        "Task '{}' reached terminal status {:?}",
                        task.description, task.status
                    ),
                    Some(task.task_id.to_string()),
                    Some("task".to_string()),
                    task.status_reason.clone().map(Value::String),
                )?;
            }
        }

        self.persist()?;
        Ok(updated)
    }

    pub fn get_task(&self, task_id: Uuid) -> Option<ActiveTask> {
        let inner = self.inner.read();
        inner
            .active
            .iter()
            .find(|t| t.task_id == task_id)
            .cloned()
            .or_else(|| inner.archived.iter().find(|t| t.task_id == task_id).cloned())
    }

    pub fn list_active_tasks(
        &self,
        task_type: Option<TaskType>,
        status: Option<TaskStatus>,
    ) -> Vec<ActiveTask> {
        self.inner
            .read()
            .active
            .iter()
            .filter(|t| task_type.is_none_or(|ty| t.task_type == ty))
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect()
    }

    pub fn list_archived_tasks(&self, limit: usize) -> Vec<ActiveTask> {
        self.inner
            .read()
            .archived
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn clear_all_tasks(&self, clear_archive: bool) -> anyhow::Result<()> {
        {
            let mut inner = self.inner.write();
            inner.active.clear();
            if clear_archive {
                inner.archived.clear();
            }
        }
        self.persist()
    }
}
