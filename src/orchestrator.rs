//! Orchestrator (C11)
//!
//! Top-level entry point: receives a user prompt, gathers facts and
//! project context, drives the Planner/Execution Agent pair, post-processes
//! structural directives into Action Executor dispatches, and renders a
//! colored summary (§4.11).

use colored::Colorize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::action_executor::ActionExecutor;
use crate::facts::{FactStore, LearnedFact};
use crate::goals::{GoalStatus, GoalStore};
use crate::notifications::{EventType, NotificationBus};
use crate::planner::{PlanStep, Planner};
use crate::execution_agent::ExecutionAgent;
use crate::reflection::StepResult;
use crate::tools::ToolRegistry;

const PREFERRED_FACT_CATEGORIES: &[&str] = &["user_preference", "project_context", "general_knowledge"];
const KEYWORD_FACT_CAP: usize = 5;
const PREFERRED_CATEGORY_CAP: usize = 2;
const ARG_PREVIEW_LEN: usize = 60;

pub struct Orchestrator {
    tools: Arc<ToolRegistry>,
    planner: Arc<dyn Planner>,
    execution_agent: Arc<ExecutionAgent>,
    action_executor: Arc<ActionExecutor>,
    notifications: Arc<NotificationBus>,
    facts: Arc<FactStore>,
    goals: Arc<GoalStore>,
    max_relevant_facts: usize,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tools: Arc<ToolRegistry>,
        planner: Arc<dyn Planner>,
        execution_agent: Arc<ExecutionAgent>,
        action_executor: Arc<ActionExecutor>,
        notifications: Arc<NotificationBus>,
        facts: Arc<FactStore>,
        goals: Arc<GoalStore>,
        max_relevant_facts: usize,
    ) -> Self {
        Self {
            tools,
            planner,
            execution_agent,
            action_executor,
            notifications,
            facts,
            goals,
            max_relevant_facts,
        }
    }

    /// §4.11 step 2: keyword overlap capped at 5, plus up to 2 more from
    /// preferred categories (most recent first), overall cap 7.
    fn relevant_facts(&self, prompt: &str) -> Vec<LearnedFact> {
        let tokens: HashSet<String> = prompt
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        let mut all_facts = self.facts.all();
        all_facts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut selected: Vec<LearnedFact> = Vec::new();
        let mut selected_ids = HashSet::new();

        for fact in &all_facts {
            if selected.len() >= KEYWORD_FACT_CAP {
                break;
            }
            let fact_tokens: HashSet<String> = fact
                .text
                .split_whitespace()
                .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
                .collect();
            if !tokens.is_disjoint(&fact_tokens) {
                selected.push(fact.clone());
                selected_ids.insert(fact.fact_id);
            }
        }

        let mut added_from_categories = 0;
        for fact in &all_facts {
            if added_from_categories >= PREFERRED_CATEGORY_CAP || selected.len() >= self.max_relevant_facts {
                break;
            }
            if selected_ids.contains(&fact.fact_id) {
                continue;
            }
            if PREFERRED_FACT_CATEGORIES.contains(&fact.category.as_str()) {
                selected.push(fact.clone());
                selected_ids.insert(fact.fact_id);
                added_from_categories += 1;
            }
        }

        selected.truncate(self.max_relevant_facts);
        selected
    }

    /// §4.11 step 3: a `<file>.rs` mention plus an action/entity keyword
    /// (the managed codebase here is the agent's own Rust source, so the
    /// file extension this looks for is `.rs` rather than `.py`).
    fn detect_project_context(&self, prompt: &str, project_root: &std::path::Path) -> Option<String> {
        const ACTION_KEYWORDS: &[&str] = &["fix", "modify", "refactor", "update", "edit", "change"];
        let lower = prompt.to_lowercase();
        if !ACTION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return None;
        }
        let rs_file = prompt.split_whitespace().find(|w| w.ends_with(".rs"))?;
        let candidate = project_root.join(rs_file.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '/'));
        std::fs::read_to_string(candidate).ok()
    }

    fn truncate_for_summary(value: &Value) -> String {
        let rendered = value.to_string();
        if rendered.chars().count() <= ARG_PREVIEW_LEN {
            rendered
        } else {
            let truncated: String = rendered.chars().take(ARG_PREVIEW_LEN.saturating_sub(1)).collect();
            format!("{}\u{2026}", truncated)
        }
    }

    /// §4.11 step 7: colored step-by-step summary.
    fn render_summary(plan: &[PlanStep], results: &[StepResult]) -> String {
        let mut lines = Vec::new();
        for (step, result) in plan.iter().zip(results.iter()) {
            let args_preview = Self::truncate_for_summary(&step.args);
            let line = match result {
                StepResult::Value(v) => format!(
                    "  {} {}({}) -> {}",
                    "\u{2713}".green(),
                    step.tool_name.bold(),
                    args_preview,
                    Self::truncate_for_summary(v)
                ),
                StepResult::Error { error } => format!(
                    "  {} {}({}) -> {}",
                    "\u{2717}".red(),
                    step.tool_name.bold(),
                    args_preview,
                    error.red()
                ),
            };
            lines.push(line);
        }
        lines.join("\n")
    }

    /// Runs one user prompt through the full pipeline, returning
    /// `(overall_success, response_text)` (§4.11).
    pub async fn handle_prompt(&self, prompt: &str, project_root: &std::path::Path) -> anyhow::Result<(bool, String)> {
        self.notifications.add_notification(
            EventType::GeneralInfo,
            &format!("starting goal: {}", prompt),
            None,
            Some("goal".to_string()),
            None,
        )?;
        let goal = self.goals.open_goal(prompt)?;

        let relevant_facts = self.relevant_facts(prompt);
        let project_context = self.detect_project_context(prompt, project_root);
        let tool_list = self.tools.list();
        let tool_metadata: Vec<crate::tools::ToolMetadata> = tool_list.into_iter().cloned().collect();

        let plan = self
            .planner
            .generate_plan(prompt, &tool_metadata, &relevant_facts, project_context.as_deref())
            .await;

        let plan = match plan {
            Ok(steps) if !steps.is_empty() => steps,
            _ => {
                self.goals.set_status(goal.goal_id, GoalStatus::Abandoned)?;
                return Ok((false, "planner produced no usable plan".to_string()));
            }
        };

        let (attempted_plan, mut results) = self.execution_agent.run_plan(prompt, plan).await;

        let mut overall_success = true;
        for result in results.iter_mut() {
            let directive = if let StepResult::Value(value) = &*result {
                value
                    .get("action_type_for_executor")
                    .and_then(Value::as_str)
                    .map(|action_type| {
                        let details = value.get("action_details_for_executor").cloned().unwrap_or(Value::Null);
                        (action_type.to_string(), details)
                    })
            } else {
                None
            };

            if let Some((action_type, details)) = directive {
                let outcome = self.action_executor.execute(&action_type, details, None).await?;
                *result = if outcome.success {
                    StepResult::Value(serde_json::json!({"dispatched": action_type, "succeeded": true}))
                } else {
                    overall_success = false;
                    StepResult::Error { error: format!("{} failed: {}", action_type, outcome.reason) }
                };
                continue;
            }

            if result.is_error() {
                overall_success = false;
            }
        }

        self.goals.set_status(
            goal.goal_id,
            if overall_success { GoalStatus::Achieved } else { GoalStatus::Abandoned },
        )?;

        let summary = Self::render_summary(&attempted_plan, &results);
        let header = if overall_success {
            "Goal completed successfully:".green().bold().to_string()
        } else {
            "Goal did not complete successfully:".red().bold().to_string()
        };
        Ok((overall_success, format!("{}\n{}", header, summary)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critics::{Critic, CriticCoordinator, ReviewRequest, ReviewStatus, ReviewVerdict};
    use crate::code_service::CodeService;
    use crate::llm::LlmClient;
    use crate::reflection::ReflectionLog;
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
            Ok("[]".to_string())
        }
    }

    struct FixedPlanner(Vec<PlanStep>);
    #[async_trait]
    impl Planner for FixedPlanner {
        async fn generate_plan(
            &self,
            _goal: &str,
            _tools: &[crate::tools::ToolMetadata],
            _facts: &[LearnedFact],
            _project_context: Option<&str>,
        ) -> anyhow::Result<Vec<PlanStep>> {
            Ok(self.0.clone())
        }
        async fn replan_after_failure(
            &self,
            _goal: &str,
            _failure_analysis: &str,
            _remaining_steps: &[PlanStep],
        ) -> anyhow::Result<Vec<PlanStep>> {
            Ok(vec![])
        }
    }

    fn orchestrator(plan: Vec<PlanStep>, root: &std::path::Path) -> Orchestrator {
        let tools = Arc::new(ToolRegistry::new());
        let task_manager = Arc::new(TaskManager::in_memory());
        let notifications = Arc::new(NotificationBus::in_memory());
        let reflection_log = Arc::new(ReflectionLog::in_memory());
        let facts = Arc::new(FactStore::in_memory());
        let goals = Arc::new(GoalStore::in_memory());
        let planner: Arc<dyn Planner> = Arc::new(FixedPlanner(plan));

        let execution_agent = Arc::new(ExecutionAgent::new(
            tools.clone(),
            task_manager.clone(),
            notifications.clone(),
            reflection_log.clone(),
            planner.clone(),
            3,
        ));

        let critics = CriticCoordinator::new(vec![Arc::new(ApprovingCritic)]);
        let action_executor = Arc::new(ActionExecutor::new(
            task_manager,
            notifications.clone(),
            reflection_log,
            facts.clone(),
            Arc::new(CodeService::new(Arc::new(NoopLlm), "test".into(), 0.0, 10)),
            critics,
            None,
            Arc::new(NoopLlm),
            "test".into(),
            root.to_path_buf(),
        ));

        Orchestrator::new(tools, planner, execution_agent, action_executor, notifications, facts, goals, 7)
    }

    #[tokio::test]
    async fn happy_path_prompt_achieves_goal() {
        let dir = tempfile::tempdir().unwrap();
        let plan = vec![PlanStep { tool_name: "echo".into(), args: serde_json::json!({"value": "hi"}) }];
        let orch = orchestrator(plan, dir.path());

        let (success, summary) = orch.handle_prompt("say hi", dir.path()).await.unwrap();
        assert!(success);
        assert!(summary.contains("echo"));
        assert_eq!(orch.goals.all()[0].status, GoalStatus::Achieved);
    }

    #[tokio::test]
    async fn empty_plan_abandons_goal() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(vec![], dir.path());
        let (success, _) = orch.handle_prompt("do nothing in particular", dir.path()).await.unwrap();
        assert!(!success);
        assert_eq!(orch.goals.all()[0].status, GoalStatus::Abandoned);
    }

    #[test]
    fn relevant_facts_prioritizes_keyword_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(vec![], dir.path());
        orch.facts.add_fact("the user prefers dark mode", "user_preference", "test", None).unwrap();
        orch.facts.add_fact("completely unrelated trivia", "general_knowledge", "test", None).unwrap();

        let relevant = orch.relevant_facts("please switch to dark mode");
        assert!(relevant.iter().any(|f| f.text.contains("dark mode")));
    }

    #[test]
    fn project_context_loads_matching_rs_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn marker() {}").unwrap();
        let orch = orchestrator(vec![], dir.path());

        let context = orch.detect_project_context("please fix lib.rs", dir.path());
        assert!(context.unwrap().contains("marker"));
    }

    #[test]
    fn project_context_is_none_without_action_keyword() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn marker() {}").unwrap();
        let orch = orchestrator(vec![], dir.path());

        assert!(orch.detect_project_context("tell me about lib.rs", dir.path()).is_none());
    }
}
