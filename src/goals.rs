//! Goal store (§3, ADDED).
//!
//! The top-level objective a single Orchestrator pipeline run is working
//! towards, tracked across replans. One goal per handled user prompt; the
//! store is a flat map keyed by `goal_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    Open,
    InProgress,
    Achieved,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub status: GoalStatus,
    pub related_task_ids: Vec<Uuid>,
    pub related_reflection_entry_ids: Vec<Uuid>,
}

pub struct GoalStore {
    path: Option<PathBuf>,
    goals: parking_lot::RwLock<HashMap<Uuid, Goal>>,
}

impl GoalStore {
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        let goals: HashMap<Uuid, Goal> = crate::persistence::read_json_opt(&path)?.unwrap_or_default();
        Ok(Self {
            path: Some(path),
            goals: parking_lot::RwLock::new(goals),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            goals: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.path {
            crate::persistence::write_json_atomic(path, &*self.goals.read())?;
        }
        Ok(())
    }

    pub fn open_goal(&self, description: &str) -> anyhow::Result<Goal> {
        let goal = Goal {
            goal_id: Uuid::new_v4(),
            description: description.to_string(),
            created_at: Utc::now(),
            status: GoalStatus::Open,
            related_task_ids: Vec::new(),
            related_reflection_entry_ids: Vec::new(),
        };
        self.goals.write().insert(goal.goal_id, goal.clone());
        self.persist()?;
        Ok(goal)
    }

    pub fn set_status(&self, goal_id: Uuid, status: GoalStatus) -> anyhow::Result<()> {
        if let Some(goal) = self.goals.write().get_mut(&goal_id) {
            goal.status = status;
        }
        self.persist()
    }

    pub fn link_task(&self, goal_id: Uuid, task_id: Uuid) -> anyhow::Result<()> {
        if let Some(goal) = self.goals.write().get_mut(&goal_id) {
            goal.related_task_ids.push(task_id);
        }
        self.persist()
    }

    pub fn link_reflection_entry(&self, goal_id: Uuid, entry_id: Uuid) -> anyhow::Result<()> {
        if let Some(goal) = self.goals.write().get_mut(&goal_id) {
            goal.related_reflection_entry_ids.push(entry_id);
        }
        self.persist()
    }

    pub fn get(&self, goal_id: Uuid) -> Option<Goal> {
        self.goals.read().get(&goal_id).cloned()
    }

    pub fn all(&self) -> Vec<Goal> {
        self.goals.read().values().cloned().collect()
    }
}
