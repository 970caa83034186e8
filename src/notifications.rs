//! Notification Bus (C4)
//!
//! A synchronous, in-memory sink for typed events, with capped history and
//! atomic persistence. Front-ends subscribe by periodically listing
//! notifications or by direct injection of the manager (§6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

/// Event taxonomy (§4.4), at minimum covering task terminal outcomes,
/// suggestion lifecycle, self-modification outcomes, and general events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TaskCompletedSuccessfully,
    TaskFailedPreReview,
    TaskCriticReviewRejected,
    TaskFailedDuringApply,
    TaskPostModTestFailed,
    TaskFailedCodeGeneration,
    TaskFailedUnknown,
    TaskUserCancelled,
    TaskFailedInterrupted,

    NewSuggestionToolBug,
    NewSuggestionEnhancement,
    NewSuggestionNewTool,
    NewSuggestionKnowledgeGap,
    SuggestionApprovedUser,
    SuggestionDeniedUser,
    SuggestionImplemented,

    SelfModificationApplied,
    SelfModificationRejectedCritics,
    SelfModificationFailedTests,

    FactLearned,
    GeneralInfo,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Unread,
    Read,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub event_type: EventType,
    pub summary_message: String,
    pub timestamp: DateTime<Utc>,
    pub status: NotificationStatus,
    pub related_item_id: Option<String>,
    pub related_item_type: Option<String>,
    pub details_payload: Option<Value>,
}

const MAX_SUMMARY_LEN: usize = 500;

fn truncate_summary(message: &str) -> String {
    if message.chars().count() <= MAX_SUMMARY_LEN {
        return message.to_string();
    }
    let truncated: String = message.chars().take(MAX_SUMMARY_LEN.saturating_sub(1)).collect();
    format!("{}\u{2026}", truncated)
}

pub struct NotificationBus {
    path: Option<PathBuf>,
    notifications: parking_lot::RwLock<Vec<Notification>>,
}

impl NotificationBus {
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        let notifications: Vec<Notification> =
            crate::persistence::read_json_opt(&path)?.unwrap_or_default();
        Ok(Self {
            path: Some(path),
            notifications: parking_lot::RwLock::new(notifications),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            notifications: parking_lot::RwLock::new(Vec::new()),
        }
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.path {
            crate::persistence::write_json_atomic(path, &*self.notifications.read())?;
        }
        Ok(())
    }

    pub fn add_notification(
        &self,
        event_type: EventType,
        summary: &str,
        related_item_id: Option<String>,
        related_item_type: Option<String>,
        details_payload: Option<Value>,
    ) -> anyhow::Result<Notification> {
        let notification = Notification {
            notification_id: Uuid::new_v4(),
            event_type,
            summary_message: truncate_summary(summary),
            timestamp: Utc::now(),
            status: NotificationStatus::Unread,
            related_item_id,
            related_item_type,
            details_payload,
        };

        let mut notifications = self.notifications.write();
        notifications.insert(0, notification.clone()); // newest-first on write
        drop(notifications);
        self.persist()?;
        Ok(notification)
    }

    pub fn get_notifications(
        &self,
        status_filter: Option<NotificationStatus>,
        type_filter: Option<EventType>,
        limit: usize,
    ) -> Vec<Notification> {
        self.notifications
            .read()
            .iter()
            .filter(|n| status_filter.is_none_or(|s| n.status == s))
            .filter(|n| type_filter.is_none_or(|t| n.event_type == t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn mark_as_read(&self, ids: &[Uuid]) -> anyhow::Result<()> {
        self.set_status(ids, NotificationStatus::Read)
    }

    pub fn mark_as_archived(&self, ids: &[Uuid]) -> anyhow::Result<()> {
        self.set_status(ids, NotificationStatus::Archived)
    }

    fn set_status(&self, ids: &[Uuid], status: NotificationStatus) -> anyhow::Result<()> {
        {
            let mut notifications = self.notifications.write();
            for n in notifications.iter_mut() {
                if ids.contains(&n.notification_id) {
                    n.status = status;
                }
            }
        }
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.notifications.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
