//! Action Executor (C8)
//!
//! Maps typed actions produced by the Learning Agent (or inline by the
//! Orchestrator) onto concrete operations over the Critic Coordinator,
//! Code Service, and Self-Modification Engine. Every branch creates and
//! updates a Task in the Task Manager (§4.8).

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::code_service::CodeService;
use crate::critics::CriticCoordinator;
use crate::facts::FactStore;
use crate::llm::{strip_code_fences, LlmClient};
use crate::notifications::{EventType, NotificationBus};
use crate::reflection::{PlanStepRecord, ReflectionLog};
use crate::self_modification::{EditOutcome, SelfModificationEngine};
use crate::tasks::{TaskManager, TaskStatus, TaskType, UpdateTaskParams};

const CATEGORY_VOCAB: &[&str] = &["user_preference", "project_context", "general_knowledge", "tool_behavior"];
const FALLBACK_CATEGORY: &str = "general";

/// Re-executes a previously-recorded plan for post-modification testing.
/// Implemented by the Execution Agent (C10); kept as a trait here so this
/// module does not depend on the execution layer directly.
#[async_trait]
pub trait PlanReplayer: Send + Sync {
    async fn replay_succeeds(&self, plan: &[PlanStepRecord]) -> bool;
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposeToolModificationDetails {
    pub module_path: String,
    pub function_name: String,
    pub suggested_code_change: Option<String>,
    pub original_reflection_entry_id: Option<Uuid>,
    #[serde(default = "default_change_description")]
    pub change_description: String,
}

fn default_change_description() -> String {
    "automatically proposed fix".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddLearnedFactDetails {
    pub text: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub task_id: Uuid,
    pub reason: String,
}

pub struct ActionExecutor {
    task_manager: Arc<TaskManager>,
    notifications: Arc<NotificationBus>,
    reflection_log: Arc<ReflectionLog>,
    facts: Arc<FactStore>,
    code_service: Arc<CodeService>,
    critics: CriticCoordinator,
    replayer: Option<Arc<dyn PlanReplayer>>,
    assessor: Arc<dyn LlmClient>,
    assessor_model: String,
    project_root: PathBuf,
}

#[allow(clippy::too_many_arguments)]
impl ActionExecutor {
    pub fn new(
        task_manager: Arc<TaskManager>,
        notifications: Arc<NotificationBus>,
        reflection_log: Arc<ReflectionLog>,
        facts: Arc<FactStore>,
        code_service: Arc<CodeService>,
        critics: CriticCoordinator,
        replayer: Option<Arc<dyn PlanReplayer>>,
        assessor: Arc<dyn LlmClient>,
        assessor_model: String,
        project_root: PathBuf,
    ) -> Self {
        Self {
            task_manager,
            notifications,
            reflection_log,
            facts,
            code_service,
            critics,
            replayer,
            assessor,
            assessor_model,
            project_root,
        }
    }

    pub async fn execute(
        &self,
        action_type: &str,
        details: Value,
        originating_suggestion_id: Option<Uuid>,
    ) -> Result<ActionOutcome> {
        match action_type {
            "PROPOSE_TOOL_MODIFICATION" => self.propose_tool_modification(details).await,
            "ADD_LEARNED_FACT" => self.add_learned_fact(details).await,
            other => {
                let task = self.task_manager.add_task(
                    &format!("unsupported action '{}'", other),
                    TaskType::SuggestionProcessing,
                    originating_suggestion_id.map(|id| id.to_string()),
                    Some(details),
                )?;
                self.task_manager.update_task_status(
                    task.task_id,
                    TaskStatus::FailedPreReview,
                    UpdateTaskParams {
                        reason: Some("unsupported".to_string()),
                        ..Default::default()
                    },
                    &self.notifications,
                )?;
                Ok(ActionOutcome {
                    success: false,
                    task_id: task.task_id,
                    reason: "unsupported".to_string(),
                })
            }
        }
    }

    async fn propose_tool_modification(&self, details: Value) -> Result<ActionOutcome> {
        let parsed: ProposeToolModificationDetails = serde_json::from_value(details.clone())?;

        let task = self.task_manager.add_task(
            &format!(
                "modify {}::{}",
                parsed.module_path, parsed.function_name
            ),
            TaskType::AgentToolModification,
            Some(format!("{}::{}", parsed.module_path, parsed.function_name)),
            Some(details),
        )?;

        let code_change = match &parsed.suggested_code_change {
            Some(code) => code.clone(),
            None => {
                let original = SelfModificationEngine::get_backup_function_source_code(
                    &parsed.module_path,
                    &parsed.function_name,
                    &self.project_root,
                )?
                .unwrap_or_default();
                self.code_service
                    .fix_tool(&original, &parsed.change_description)
                    .await?
            }
        };

        if code_change.trim() == crate::code_service::NO_CODE_SUGGESTION_POSSIBLE {
            self.task_manager.update_task_status(
                task.task_id,
                TaskStatus::FailedCodeGeneration,
                UpdateTaskParams {
                    reason: Some("code service produced no suggestion".to_string()),
                    ..Default::default()
                },
                &self.notifications,
            )?;
            return Ok(ActionOutcome {
                success: false,
                task_id: task.task_id,
                reason: "no code suggestion possible".to_string(),
            });
        }

        self.apply_test_and_revert(task.task_id, &parsed, &code_change).await
    }

    /// §4.8 `_apply_test_and_revert_code`: edit, optionally post-mod test,
    /// revert on test failure, notify.
    async fn apply_test_and_revert(
        &self,
        task_id: Uuid,
        parsed: &ProposeToolModificationDetails,
        code_change: &str,
    ) -> Result<ActionOutcome> {
        let engine = SelfModificationEngine::new(&self.critics);
        let outcome = engine
            .edit_function_source_code(
                &parsed.module_path,
                &parsed.function_name,
                code_change,
                &self.project_root,
                &parsed.change_description,
            )
            .await?;

        match outcome {
            EditOutcome::NoOp => {
                self.task_manager.update_task_status(
                    task_id,
                    TaskStatus::CompletedSuccessfully,
                    UpdateTaskParams {
                        reason: Some("no change needed".to_string()),
                        ..Default::default()
                    },
                    &self.notifications,
                )?;
                Ok(ActionOutcome { success: true, task_id, reason: "no-op".to_string() })
            }
            EditOutcome::CriticRejected => {
                self.task_manager.update_task_status(
                    task_id,
                    TaskStatus::CriticReviewRejected,
                    UpdateTaskParams::default(),
                    &self.notifications,
                )?;
                self.notifications.add_notification(
                    EventType::SelfModificationRejectedCritics,
                    &format!("critics rejected change to {}::{}", parsed.module_path, parsed.function_name),
                    Some(parsed.function_name.clone()),
                    Some("tool".to_string()),
                    None,
                )?;
                Ok(ActionOutcome { success: false, task_id, reason: "critic_rejected".to_string() })
            }
            EditOutcome::FailedPreReview(reason) => {
                self.task_manager.update_task_status(
                    task_id,
                    TaskStatus::FailedPreReview,
                    UpdateTaskParams { reason: Some(reason.clone()), ..Default::default() },
                    &self.notifications,
                )?;
                Ok(ActionOutcome { success: false, task_id, reason })
            }
            EditOutcome::FailedDuringApply(reason) => {
                self.task_manager.update_task_status(
                    task_id,
                    TaskStatus::FailedDuringApply,
                    UpdateTaskParams { reason: Some(reason.clone()), ..Default::default() },
                    &self.notifications,
                )?;
                Ok(ActionOutcome { success: false, task_id, reason })
            }
            EditOutcome::Applied { .. } => {
                let test_passed = match parsed.original_reflection_entry_id {
                    None => {
                        // (c) no originating entry id: post-mod test step is
                        // bypassed and the action is judged on edit/critic
                        // outcome alone.
                        true
                    }
                    Some(entry_id) => {
                        let entry = self.reflection_log.find_by_entry_id(entry_id);
                        match (&entry, &self.replayer) {
                            (Some(entry), Some(replayer)) => {
                                replayer.replay_succeeds(&entry.plan).await
                            }
                            _ => true,
                        }
                    }
                };

                if test_passed {
                    self.task_manager.update_task_status(
                        task_id,
                        TaskStatus::CompletedSuccessfully,
                        UpdateTaskParams::default(),
                        &self.notifications,
                    )?;
                    self.notifications.add_notification(
                        EventType::SelfModificationApplied,
                        &format!("applied change to {}::{}", parsed.module_path, parsed.function_name),
                        Some(parsed.function_name.clone()),
                        Some("tool".to_string()),
                        None,
                    )?;
                    Ok(ActionOutcome { success: true, task_id, reason: "applied".to_string() })
                } else {
                    let resolved_path = SelfModificationEngine::resolve_module_path(
                        &self.project_root,
                        &parsed.module_path,
                    );
                    let revert_result = SelfModificationEngine::revert_from_backup(&resolved_path);
                    let revert_note = match &revert_result {
                        Ok(()) => "reverted to pre-edit backup".to_string(),
                        Err(e) => format!("revert failed: {}", e),
                    };

                    self.task_manager.update_task_status(
                        task_id,
                        TaskStatus::PostModTestFailed,
                        UpdateTaskParams { reason: Some(revert_note.clone()), ..Default::default() },
                        &self.notifications,
                    )?;
                    self.notifications.add_notification(
                        EventType::SelfModificationFailedTests,
                        &format!(
                            "post-modification test failed for {}::{} ({})",
                            parsed.module_path, parsed.function_name, revert_note
                        ),
                        Some(parsed.function_name.clone()),
                        Some("tool".to_string()),
                        None,
                    )?;
                    Ok(ActionOutcome { success: false, task_id, reason: "post_mod_test_failed".to_string() })
                }
            }
        }
    }

    async fn add_learned_fact(&self, details: Value) -> Result<ActionOutcome> {
        let parsed: AddLearnedFactDetails = serde_json::from_value(details.clone())?;
        let normalized = parsed.text.trim();

        let task = self.task_manager.add_task(
            &format!("learn fact: {}", normalized),
            TaskType::LearningNewFact,
            None,
            Some(details),
        )?;

        if self.facts.contains_text(normalized) {
            self.task_manager.update_task_status(
                task.task_id,
                TaskStatus::CompletedSuccessfully,
                UpdateTaskParams { reason: Some("duplicate fact".to_string()), ..Default::default() },
                &self.notifications,
            )?;
            self.notifications.add_notification(
                EventType::GeneralInfo,
                &format!("fact already known, skipped: {}", normalized),
                None,
                Some("fact".to_string()),
                None,
            )?;
            return Ok(ActionOutcome { success: true, task_id: task.task_id, reason: "duplicate".to_string() });
        }

        let value = self.assess_value(normalized).await?;
        if !value.is_valuable {
            self.task_manager.update_task_status(
                task.task_id,
                TaskStatus::FailedPreReview,
                UpdateTaskParams { reason: Some(value.reason.clone()), ..Default::default() },
                &self.notifications,
            )?;
            return Ok(ActionOutcome { success: false, task_id: task.task_id, reason: value.reason });
        }

        let category = self.assess_category(normalized).await.unwrap_or_else(|_| FALLBACK_CATEGORY.to_string());
        self.facts.add_fact(normalized, &category, "learning_agent", parsed.user_id)?;
        self.task_manager.update_task_status(
            task.task_id,
            TaskStatus::CompletedSuccessfully,
            UpdateTaskParams::default(),
            &self.notifications,
        )?;
        self.notifications.add_notification(
            EventType::FactLearned,
            normalized,
            None,
            Some("fact".to_string()),
            None,
        )?;
        Ok(ActionOutcome { success: true, task_id: task.task_id, reason: "learned".to_string() })
    }

    async fn assess_value(&self, text: &str) -> Result<FactValueAssessment> {
        let prompt = format!(
            "Is the following fact worth remembering long-term for an assistant? Respond with \
             a JSON object {{\"is_valuable\": boolean, \"reason\": string}} only.\n\nFact: {}",
            text
        );
        let raw = self
            .assessor
            .invoke(&prompt, &self.assessor_model, 0.0, 200)
            .await?;
        let cleaned = strip_code_fences(&raw);
        Ok(serde_json::from_str(&cleaned)?)
    }

    async fn assess_category(&self, text: &str) -> Result<String> {
        let prompt = format!(
            "Classify this fact into exactly one of {:?}. Respond with only the category word, \
             no punctuation.\n\nFact: {}",
            CATEGORY_VOCAB, text
        );
        let raw = self
            .assessor
            .invoke(&prompt, &self.assessor_model, 0.0, 50)
            .await?;
        let candidate = raw.trim().to_lowercase();
        if CATEGORY_VOCAB.contains(&candidate.as_str()) {
            Ok(candidate)
        } else {
            Ok(FALLBACK_CATEGORY.to_string())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FactValueAssessment {
    is_valuable: bool,
    reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critics::{Critic, ReviewRequest, ReviewStatus, ReviewVerdict};

    struct FixedCritic(ReviewStatus);

    #[async_trait]
    impl Critic for FixedCritic {
        async fn review(&self, _request: &ReviewRequest) -> ReviewVerdict {
            ReviewVerdict { status: self.0, comments: "fixed".into(), suggestions: Vec::new() }
        }
    }

    struct ScriptedAssessor(Vec<String>, parking_lot::Mutex<usize>);

    #[async_trait]
    impl LlmClient for ScriptedAssessor {
        async fn invoke(&self, _p: &str, _m: &str, _t: f32, _mt: usize) -> anyhow::Result<String> {
            let mut idx = self.1.lock();
            let r = self.0[*idx].clone();
            *idx += 1;
            Ok(r)
        }
    }

    struct AlwaysPassReplayer;

    #[async_trait]
    impl PlanReplayer for AlwaysPassReplayer {
        async fn replay_succeeds(&self, _plan: &[PlanStepRecord]) -> bool {
            true
        }
    }

    struct AlwaysFailReplayer;

    #[async_trait]
    impl PlanReplayer for AlwaysFailReplayer {
        async fn replay_succeeds(&self, _plan: &[PlanStepRecord]) -> bool {
            false
        }
    }

    fn executor(
        dir: &std::path::Path,
        approve: bool,
        assessor_responses: Vec<&str>,
        replayer: Option<Arc<dyn PlanReplayer>>,
    ) -> ActionExecutor {
        let critics = CriticCoordinator::new(vec![
            Arc::new(FixedCritic(if approve { ReviewStatus::Approved } else { ReviewStatus::Rejected })),
            Arc::new(FixedCritic(ReviewStatus::Approved)),
        ]);
        let assessor = Arc::new(ScriptedAssessor(
            assessor_responses.into_iter().map(String::from).collect(),
            parking_lot::Mutex::new(0),
        ));
        ActionExecutor::new(
            Arc::new(TaskManager::in_memory()),
            Arc::new(NotificationBus::in_memory()),
            Arc::new(ReflectionLog::in_memory()),
            Arc::new(FactStore::in_memory()),
            Arc::new(CodeService::new(assessor.clone(), "test".into(), 0.0, 100)),
            critics,
            replayer,
            assessor,
            "test".into(),
            dir.to_path_buf(),
        )
    }

    fn write_module(root: &std::path::Path, module_path: &str, content: &str) {
        let path = SelfModificationEngine::resolve_module_path(root, module_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn propose_tool_modification_applies_and_skips_test_when_no_entry_id() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "tools.math", "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a + b\n}\n");
        let exec = executor(dir.path(), true, vec![], None);

        let details = serde_json::json!({
            "module_path": "tools.math",
            "function_name": "subtract_numbers",
            "suggested_code_change": "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a - b\n}\n",
        });
        let outcome = exec.execute("PROPOSE_TOOL_MODIFICATION", details, None).await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn propose_tool_modification_reverts_on_failed_post_mod_test() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "tools.math", "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a + b\n}\n");
        let exec = executor(dir.path(), true, vec![], Some(Arc::new(AlwaysFailReplayer)));

        let entry = exec.reflection_log.log_execution(
            "fix subtraction",
            vec![PlanStepRecord { tool_name: "subtract_numbers".into(), args: Value::Null }],
            vec![],
            false,
            Default::default(),
        ).unwrap();

        let details = serde_json::json!({
            "module_path": "tools.math",
            "function_name": "subtract_numbers",
            "suggested_code_change": "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a - b\n}\n",
            "original_reflection_entry_id": entry.entry_id,
        });
        let outcome = exec.execute("PROPOSE_TOOL_MODIFICATION", details, None).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.reason, "post_mod_test_failed");

        let path = SelfModificationEngine::resolve_module_path(dir.path(), "tools.math");
        let restored = std::fs::read_to_string(path).unwrap();
        assert!(restored.contains("a + b"));
    }

    #[tokio::test]
    async fn propose_tool_modification_respects_critic_rejection() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "tools.math", "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a + b\n}\n");
        let exec = executor(dir.path(), false, vec![], None);

        let details = serde_json::json!({
            "module_path": "tools.math",
            "function_name": "subtract_numbers",
            "suggested_code_change": "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a - b\n}\n",
        });
        let outcome = exec.execute("PROPOSE_TOOL_MODIFICATION", details, None).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.reason, "critic_rejected");
    }

    #[tokio::test]
    async fn add_learned_fact_dedups_on_second_add() {
        let dir = tempfile::tempdir().unwrap();
        let responses = vec![
            r#"{"is_valuable": true, "reason": "useful"}"#,
            "general_knowledge",
        ];
        let exec = executor(dir.path(), true, responses, None);

        let details = serde_json::json!({"text": "The sky is blue"});
        let first = exec.execute("ADD_LEARNED_FACT", details.clone(), None).await.unwrap();
        assert!(first.success);
        assert_eq!(exec.facts.len(), 1);

        let second = exec.execute("ADD_LEARNED_FACT", details, None).await.unwrap();
        assert!(second.success);
        assert_eq!(second.reason, "duplicate");
        assert_eq!(exec.facts.len(), 1);
    }

    #[tokio::test]
    async fn unsupported_action_fails_pre_review() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), true, vec![], None);
        let outcome = exec.execute("NOT_A_REAL_ACTION", Value::Null, None).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.reason, "unsupported");
    }
}
