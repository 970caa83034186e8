//! Learning Agent (C12)
//!
//! Consumes Reflection Log entries and files at most one ActionableInsight
//! per entry; separately selects the next insight to act on and dispatches
//! it through the Action Executor (§4.12).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::action_executor::ActionExecutor;
use crate::reflection::{ReflectionLogEntry, ReflectionStatus, StepResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightType {
    ToolBugSuspected,
    ToolUsageError,
    ToolEnhancementSuggested,
    NewToolSuggested,
    KnowledgeGapIdentified,
    GeneralFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightStatus {
    New,
    ActionAttempted,
    ActionSuccessful,
    ActionFailed,
    PendingManualReview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightMetadata {
    pub module_path: Option<String>,
    pub function_name: Option<String>,
    pub original_reflection_entry_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionableInsight {
    pub insight_id: Uuid,
    pub insight_type: InsightType,
    pub description: String,
    pub source_reflection_entry_ids: Vec<Uuid>,
    pub related_tool_name: Option<String>,
    pub suggested_code_change: Option<String>,
    pub knowledge_to_learn: Option<String>,
    pub priority: u8,
    pub status: InsightStatus,
    pub metadata: InsightMetadata,
    pub created_at: DateTime<Utc>,
}

/// Known builtin tools' backing module, for when a failed plan step's own
/// details don't carry `module_path`/`function_name` (§4.12).
fn builtin_tool_location(tool_name: &str) -> Option<(&'static str, &'static str)> {
    match tool_name {
        "subtract_numbers" => Some(("tools.builtin", "subtract_numbers")),
        "calculator" => Some(("tools.builtin", "calculator")),
        "echo" => Some(("tools.builtin", "echo")),
        "file_read" => Some(("tools.builtin", "file_read")),
        "request_user_clarification" => Some(("tools.builtin", "request_user_clarification")),
        _ => None,
    }
}

pub struct InsightStore {
    path: Option<PathBuf>,
    insights: parking_lot::RwLock<Vec<ActionableInsight>>,
}

impl InsightStore {
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        let insights: Vec<ActionableInsight> =
            crate::persistence::read_json_opt(&path)?.unwrap_or_default();
        Ok(Self { path: Some(path), insights: parking_lot::RwLock::new(insights) })
    }

    pub fn in_memory() -> Self {
        Self { path: None, insights: parking_lot::RwLock::new(Vec::new()) }
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.path {
            crate::persistence::write_json_atomic(path, &*self.insights.read())?;
        }
        Ok(())
    }

    pub fn add(&self, insight: ActionableInsight) -> anyhow::Result<()> {
        self.insights.write().push(insight);
        self.persist()
    }

    pub fn all(&self) -> Vec<ActionableInsight> {
        self.insights.read().clone()
    }

    pub fn set_status(&self, insight_id: Uuid, status: InsightStatus) -> anyhow::Result<()> {
        if let Some(insight) = self.insights.write().iter_mut().find(|i| i.insight_id == insight_id) {
            insight.status = status;
        }
        self.persist()
    }

    /// Lowest `(priority, created_at)` among insights still `NEW`.
    pub fn next_new(&self) -> Option<ActionableInsight> {
        self.insights
            .read()
            .iter()
            .filter(|i| i.status == InsightStatus::New)
            .min_by(|a, b| (a.priority, a.created_at).cmp(&(b.priority, b.created_at)))
            .cloned()
    }
}

pub struct LearningAgent {
    insights: Arc<InsightStore>,
    executor: Arc<ActionExecutor>,
}

impl LearningAgent {
    pub fn new(insights: Arc<InsightStore>, executor: Arc<ActionExecutor>) -> Self {
        Self { insights, executor }
    }

    pub fn insights(&self) -> &Arc<InsightStore> {
        &self.insights
    }

    /// §4.12: at most one insight per reflection entry.
    pub fn process_reflection_entry(&self, entry: &ReflectionLogEntry) -> anyhow::Result<Option<ActionableInsight>> {
        let insight = match entry.status {
            ReflectionStatus::Failure | ReflectionStatus::PartialSuccess => self.blame_failed_step(entry),
            ReflectionStatus::Success => self.check_retry_note(entry),
        };

        if let Some(insight) = &insight {
            self.insights.add(insight.clone())?;
        }
        Ok(insight)
    }

    fn blame_failed_step(&self, entry: &ReflectionLogEntry) -> Option<ActionableInsight> {
        let blamed = entry
            .plan
            .iter()
            .enumerate()
            .zip(entry.execution_results.iter())
            .find(|((_, _), result)| result.is_error())
            .map(|((idx, step), _)| (idx, step));

        let Some((step_index, step)) = blamed else {
            // No individual step result is an error, yet the entry as a
            // whole is FAILURE/PARTIAL_SUCCESS -- no tool to blame, so file
            // a lower-priority general failure insight instead of nothing.
            return Some(ActionableInsight {
                insight_id: Uuid::new_v4(),
                insight_type: InsightType::GeneralFailure,
                description: format!(
                    "goal '{}' did not fully succeed but no individual step could be blamed",
                    entry.goal_description
                ),
                source_reflection_entry_ids: vec![entry.entry_id],
                related_tool_name: None,
                suggested_code_change: None,
                knowledge_to_learn: None,
                priority: 9,
                status: InsightStatus::New,
                metadata: InsightMetadata {
                    module_path: None,
                    function_name: None,
                    original_reflection_entry_id: Some(entry.entry_id),
                },
                created_at: Utc::now(),
            });
        };

        let insight_type = if step.args.is_null() || step.args == Value::Object(Default::default()) {
            InsightType::ToolUsageError
        } else {
            InsightType::ToolBugSuspected
        };

        let (module_path, function_name) = builtin_tool_location(&step.tool_name)
            .map(|(m, f)| (Some(m.to_string()), Some(f.to_string())))
            .unwrap_or((None, None));

        Some(ActionableInsight {
            insight_id: Uuid::new_v4(),
            insight_type,
            description: format!(
                "step {} ('{}') failed during goal '{}'",
                step_index + 1,
                step.tool_name,
                entry.goal_description
            ),
            source_reflection_entry_ids: vec![entry.entry_id],
            related_tool_name: Some(step.tool_name.clone()),
            suggested_code_change: None,
            knowledge_to_learn: None,
            priority: 5,
            status: InsightStatus::New,
            metadata: InsightMetadata {
                module_path,
                function_name,
                original_reflection_entry_id: Some(entry.entry_id),
            },
            created_at: Utc::now(),
        })
    }

    fn check_retry_note(&self, entry: &ReflectionLogEntry) -> Option<ActionableInsight> {
        let notes = entry.notes.as_deref()?;
        if !notes.to_lowercase().contains("retry") {
            return None;
        }
        Some(ActionableInsight {
            insight_id: Uuid::new_v4(),
            insight_type: InsightType::ToolEnhancementSuggested,
            description: format!("goal '{}' succeeded only after a retry", entry.goal_description),
            source_reflection_entry_ids: vec![entry.entry_id],
            related_tool_name: None,
            suggested_code_change: None,
            knowledge_to_learn: None,
            priority: 7,
            status: InsightStatus::New,
            metadata: InsightMetadata {
                module_path: None,
                function_name: None,
                original_reflection_entry_id: None,
            },
            created_at: Utc::now(),
        })
    }

    /// Selects the next `NEW` insight, dispatches it through the Action
    /// Executor, and records the outcome.
    pub async fn review_and_propose_next_action(&self) -> anyhow::Result<Option<bool>> {
        let Some(insight) = self.insights.next_new() else {
            return Ok(None);
        };

        self.insights.set_status(insight.insight_id, InsightStatus::ActionAttempted)?;

        let action_type = match insight.insight_type {
            InsightType::ToolBugSuspected | InsightType::ToolUsageError => "PROPOSE_TOOL_MODIFICATION",
            InsightType::KnowledgeGapIdentified => "ADD_LEARNED_FACT",
            _ => {
                self.insights.set_status(insight.insight_id, InsightStatus::PendingManualReview)?;
                return Ok(Some(false));
            }
        };

        let details = serde_json::json!({
            "module_path": insight.metadata.module_path,
            "function_name": insight.metadata.function_name,
            "suggested_code_change": insight.suggested_code_change,
            "original_reflection_entry_id": insight.metadata.original_reflection_entry_id,
            "text": insight.knowledge_to_learn,
        });

        let outcome = self.executor.execute(action_type, details, Some(insight.insight_id)).await?;
        let final_status = if outcome.success { InsightStatus::ActionSuccessful } else { InsightStatus::ActionFailed };
        self.insights.set_status(insight.insight_id, final_status)?;
        Ok(Some(outcome.success))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critics::{Critic, ReviewRequest, ReviewStatus, ReviewVerdict};
    use crate::critics::CriticCoordinator;
    use crate::code_service::CodeService;
    use crate::facts::FactStore;
    use crate::llm::LlmClient;
    use crate::notifications::NotificationBus;
    use crate::reflection::{LogExecutionParams, PlanStepRecord, ReflectionLog};
    use crate::tasks::TaskManager;
    use async_trait::async_trait;

    struct ApprovingCritic;
    #[async_trait]
    impl Critic for ApprovingCritic {
        async fn review(&self, _r: &ReviewRequest) -> ReviewVerdict {
            ReviewVerdict { status: ReviewStatus::Approved, comments: String::new(), suggestions: Vec::new() }
        }
    }

    struct NoopLlm;
    #[async_trait]
    impl LlmClient for NoopLlm {
        async fn invoke(&self, _p: &str, _m: &str, _t: f32, _mt: usize) -> anyhow::Result<String> {
            Ok(crate::code_service::NO_CODE_SUGGESTION_POSSIBLE.to_string())
        }
    }

    fn step(tool: &str, args: Value) -> PlanStepRecord {
        PlanStepRecord { tool_name: tool.to_string(), args }
    }

    #[test]
    fn blames_the_first_failing_step_with_no_args_as_usage_error() {
        let log = ReflectionLog::in_memory();
        let entry = log
            .log_execution(
                "run subtract_numbers",
                vec![step("subtract_numbers", Value::Null)],
                vec![StepResult::Error { error: "TypeError".into() }],
                false,
                LogExecutionParams::default(),
            )
            .unwrap();

        let executor = Arc::new(ActionExecutor::new(
            Arc::new(TaskManager::in_memory()),
            Arc::new(NotificationBus::in_memory()),
            Arc::new(ReflectionLog::in_memory()),
            Arc::new(FactStore::in_memory()),
            Arc::new(CodeService::new(Arc::new(NoopLlm), "test".into(), 0.0, 10)),
            CriticCoordinator::new(vec![Arc::new(ApprovingCritic)]),
            None,
            Arc::new(NoopLlm),
            "test".into(),
            std::env::temp_dir(),
        ));
        let agent = LearningAgent::new(Arc::new(InsightStore::in_memory()), executor);

        let insight = agent.process_reflection_entry(&entry).unwrap().unwrap();
        assert_eq!(insight.insight_type, InsightType::ToolUsageError);
        assert_eq!(insight.metadata.original_reflection_entry_id, Some(entry.entry_id));
        assert_eq!(insight.metadata.module_path.as_deref(), Some("tools.builtin"));
    }

    #[test]
    fn blames_a_step_with_args_as_tool_bug() {
        let log = ReflectionLog::in_memory();
        let entry = log
            .log_execution(
                "run subtract_numbers",
                vec![step("subtract_numbers", serde_json::json!({"a": 1, "b": 2}))],
                vec![StepResult::Error { error: "boom".into() }],
                false,
                LogExecutionParams::default(),
            )
            .unwrap();

        let executor = Arc::new(ActionExecutor::new(
            Arc::new(TaskManager::in_memory()),
            Arc::new(NotificationBus::in_memory()),
            Arc::new(ReflectionLog::in_memory()),
            Arc::new(FactStore::in_memory()),
            Arc::new(CodeService::new(Arc::new(NoopLlm), "test".into(), 0.0, 10)),
            CriticCoordinator::new(vec![Arc::new(ApprovingCritic)]),
            None,
            Arc::new(NoopLlm),
            "test".into(),
            std::env::temp_dir(),
        ));
        let agent = LearningAgent::new(Arc::new(InsightStore::in_memory()), executor);

        let insight = agent.process_reflection_entry(&entry).unwrap().unwrap();
        assert_eq!(insight.insight_type, InsightType::ToolBugSuspected);
    }

    #[test]
    fn blame_falls_back_to_general_failure_when_no_step_can_be_blamed() {
        let log = ReflectionLog::in_memory();
        let entry = log
            .log_execution(
                "run subtract_numbers",
                vec![step("subtract_numbers", serde_json::json!({"a": 1, "b": 2}))],
                vec![StepResult::Value(serde_json::json!(-1.0))],
                false,
                LogExecutionParams { status_override: Some(ReflectionStatus::PartialSuccess), ..Default::default() },
            )
            .unwrap();

        let executor = Arc::new(ActionExecutor::new(
            Arc::new(TaskManager::in_memory()),
            Arc::new(NotificationBus::in_memory()),
            Arc::new(ReflectionLog::in_memory()),
            Arc::new(FactStore::in_memory()),
            Arc::new(CodeService::new(Arc::new(NoopLlm), "test".into(), 0.0, 10)),
            CriticCoordinator::new(vec![Arc::new(ApprovingCritic)]),
            None,
            Arc::new(NoopLlm),
            "test".into(),
            std::env::temp_dir(),
        ));
        let agent = LearningAgent::new(Arc::new(InsightStore::in_memory()), executor);

        let insight = agent.process_reflection_entry(&entry).unwrap().unwrap();
        assert_eq!(insight.insight_type, InsightType::GeneralFailure);
        assert_eq!(insight.related_tool_name, None);
    }

    #[test]
    fn success_with_retry_note_emits_enhancement_insight() {
        let log = ReflectionLog::in_memory();
        let entry = log
            .log_execution(
                "eventually worked",
                vec![],
                vec![],
                true,
                LogExecutionParams { notes: Some("needed a retry to succeed".into()), ..Default::default() },
            )
            .unwrap();

        let executor = Arc::new(ActionExecutor::new(
            Arc::new(TaskManager::in_memory()),
            Arc::new(NotificationBus::in_memory()),
            Arc::new(ReflectionLog::in_memory()),
            Arc::new(FactStore::in_memory()),
            Arc::new(CodeService::new(Arc::new(NoopLlm), "test".into(), 0.0, 10)),
            CriticCoordinator::new(vec![Arc::new(ApprovingCritic)]),
            None,
            Arc::new(NoopLlm),
            "test".into(),
            std::env::temp_dir(),
        ));
        let agent = LearningAgent::new(Arc::new(InsightStore::in_memory()), executor);

        let insight = agent.process_reflection_entry(&entry).unwrap().unwrap();
        assert_eq!(insight.insight_type, InsightType::ToolEnhancementSuggested);
        assert_eq!(insight.priority, 7);
    }

    #[test]
    fn plain_success_emits_nothing() {
        let log = ReflectionLog::in_memory();
        let entry = log
            .log_execution("fine", vec![], vec![], true, LogExecutionParams::default())
            .unwrap();

        let executor = Arc::new(ActionExecutor::new(
            Arc::new(TaskManager::in_memory()),
            Arc::new(NotificationBus::in_memory()),
            Arc::new(ReflectionLog::in_memory()),
            Arc::new(FactStore::in_memory()),
            Arc::new(CodeService::new(Arc::new(NoopLlm), "test".into(), 0.0, 10)),
            CriticCoordinator::new(vec![Arc::new(ApprovingCritic)]),
            None,
            Arc::new(NoopLlm),
            "test".into(),
            std::env::temp_dir(),
        ));
        let agent = LearningAgent::new(Arc::new(InsightStore::in_memory()), executor);

        assert!(agent.process_reflection_entry(&entry).unwrap().is_none());
    }

    #[test]
    fn next_new_picks_lowest_priority() {
        let store = InsightStore::in_memory();
        let low_priority = ActionableInsight {
            insight_id: Uuid::new_v4(),
            insight_type: InsightType::GeneralFailure,
            description: "low".into(),
            source_reflection_entry_ids: vec![],
            related_tool_name: None,
            suggested_code_change: None,
            knowledge_to_learn: None,
            priority: 9,
            status: InsightStatus::New,
            metadata: InsightMetadata { module_path: None, function_name: None, original_reflection_entry_id: None },
            created_at: Utc::now(),
        };
        let mut high_priority = low_priority.clone();
        high_priority.insight_id = Uuid::new_v4();
        high_priority.priority = 1;

        store.add(low_priority).unwrap();
        store.add(high_priority.clone()).unwrap();

        let next = store.next_new().unwrap();
        assert_eq!(next.insight_id, high_priority.insight_id);
    }
}
