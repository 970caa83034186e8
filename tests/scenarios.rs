//! End-to-end scenarios exercising the orchestrator/planner/executor loop
//! and the self-modification engine together, through the public crate API
//! rather than any single module's internals.

use std::path::Path;
use std::sync::Arc;

use agentcore::action_executor::{ActionExecutor, PlanReplayer};
use agentcore::code_service::CodeService;
use agentcore::critics::{Critic, CriticCoordinator, ReviewRequest, ReviewStatus, ReviewVerdict};
use agentcore::execution_agent::ExecutionAgent;
use agentcore::facts::FactStore;
use agentcore::goals::GoalStore;
use agentcore::llm::LlmClient;
use agentcore::notifications::NotificationBus;
use agentcore::orchestrator::Orchestrator;
use agentcore::planner::{PlanStep, Planner};
use agentcore::reflection::{LogExecutionParams, PlanStepRecord, ReflectionLog};
use agentcore::self_modification::SelfModificationEngine;
use agentcore::tasks::TaskManager;
use agentcore::tools::ToolRegistry;
use async_trait::async_trait;

struct FixedCritic(ReviewStatus);

#[async_trait]
impl Critic for FixedCritic {
    async fn review(&self, _request: &ReviewRequest) -> ReviewVerdict {
        ReviewVerdict {
            status: self.0,
            comments: "fixed".to_string(),
            suggestions: Vec::new(),
        }
    }
}

struct NoopLlm;

#[async_trait]
impl LlmClient for NoopLlm {
    async fn invoke(&self, _prompt: &str, _model: &str, _temperature: f32, _max_tokens: usize) -> anyhow::Result<String> {
        Ok("[]".to_string())
    }
}

struct FixedPlanner(Vec<PlanStep>);

#[async_trait]
impl Planner for FixedPlanner {
    async fn generate_plan(
        &self,
        _goal: &str,
        _tools: &[agentcore::tools::ToolMetadata],
        _facts: &[agentcore::facts::LearnedFact],
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

fn write_module(root: &Path, module_path: &str, content: &str) {
    let path = SelfModificationEngine::resolve_module_path(root, module_path);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// Assembles the same collaborators `AgentCore::new` wires up, but with a
/// planner driven entirely by the test instead of an HTTP LLM client.
fn harness(plan: Vec<PlanStep>, critics: CriticCoordinator, project_root: &Path) -> Orchestrator {
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
        project_root.to_path_buf(),
    ));

    Orchestrator::new(
        tools,
        planner,
        execution_agent,
        action_executor,
        notifications,
        facts,
        goals,
        7,
    )
}

/// A directive step: the `echo` tool returns its `value` argument unchanged,
/// so handing it a directive object is a way to reach the Action Executor
/// from a planned step without a dedicated test-only tool.
fn directive_step(action_type: &str, details: serde_json::Value) -> PlanStep {
    PlanStep {
        tool_name: "echo".to_string(),
        args: serde_json::json!({
            "value": {
                "action_type_for_executor": action_type,
                "action_details_for_executor": details,
            }
        }),
    }
}

// E1: happy-path tool modification reaches the Self-Modification Engine and
// is applied, with no post-modification test to bypass.
#[tokio::test]
async fn e1_happy_path_tool_modification_is_applied_through_the_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "tools.math",
        "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a + b\n}\n",
    );

    let critics = CriticCoordinator::new(vec![
        Arc::new(FixedCritic(ReviewStatus::Approved)),
        Arc::new(FixedCritic(ReviewStatus::Approved)),
    ]);
    let plan = vec![directive_step(
        "PROPOSE_TOOL_MODIFICATION",
        serde_json::json!({
            "module_path": "tools.math",
            "function_name": "subtract_numbers",
            "suggested_code_change": "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a - b\n}\n",
            "change_description": "fix the sign error",
        }),
    )];
    let orchestrator = harness(plan, critics, dir.path());

    let (success, summary) = orchestrator.handle_prompt("fix subtraction", dir.path()).await.unwrap();
    assert!(success, "summary was: {}", summary);

    let resolved = SelfModificationEngine::resolve_module_path(dir.path(), "tools.math");
    let written = std::fs::read_to_string(resolved).unwrap();
    assert!(written.contains("a - b"));
}

// E2: a single dissenting critic blocks the modification end to end and
// leaves the source file untouched.
#[tokio::test]
async fn e2_critic_rejection_blocks_the_modification_and_leaves_source_untouched() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "tools.math",
        "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a + b\n}\n",
    );

    let critics = CriticCoordinator::new(vec![
        Arc::new(FixedCritic(ReviewStatus::Approved)),
        Arc::new(FixedCritic(ReviewStatus::Rejected)),
    ]);
    let plan = vec![directive_step(
        "PROPOSE_TOOL_MODIFICATION",
        serde_json::json!({
            "module_path": "tools.math",
            "function_name": "subtract_numbers",
            "suggested_code_change": "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a - b\n}\n",
            "change_description": "fix the sign error",
        }),
    )];
    let orchestrator = harness(plan, critics, dir.path());

    let (success, _) = orchestrator.handle_prompt("fix subtraction", dir.path()).await.unwrap();
    assert!(!success);

    let resolved = SelfModificationEngine::resolve_module_path(dir.path(), "tools.math");
    let unchanged = std::fs::read_to_string(resolved).unwrap();
    assert!(unchanged.contains("a + b"));
}

// E3: a post-modification test failure reverts the file from its backup,
// driven by a `PlanReplayer` that always fails.
struct AlwaysFailReplayer;

#[async_trait]
impl PlanReplayer for AlwaysFailReplayer {
    async fn replay_succeeds(&self, _plan: &[PlanStepRecord]) -> bool {
        false
    }
}

#[tokio::test]
async fn e3_post_mod_test_failure_reverts_the_edit() {
    let dir = tempfile::tempdir().unwrap();
    write_module(
        dir.path(),
        "tools.math",
        "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a + b\n}\n",
    );

    let task_manager = Arc::new(TaskManager::in_memory());
    let notifications = Arc::new(NotificationBus::in_memory());
    let reflection_log = Arc::new(ReflectionLog::in_memory());
    let facts = Arc::new(FactStore::in_memory());

    let entry = reflection_log
        .log_execution(
            "fix subtraction",
            vec![PlanStepRecord { tool_name: "subtract_numbers".into(), args: serde_json::Value::Null }],
            vec![],
            false,
            LogExecutionParams::default(),
        )
        .unwrap();

    let critics = CriticCoordinator::new(vec![
        Arc::new(FixedCritic(ReviewStatus::Approved)),
        Arc::new(FixedCritic(ReviewStatus::Approved)),
    ]);
    let executor = ActionExecutor::new(
        task_manager,
        notifications,
        reflection_log,
        facts,
        Arc::new(CodeService::new(Arc::new(NoopLlm), "test".into(), 0.0, 10)),
        critics,
        Some(Arc::new(AlwaysFailReplayer) as Arc<dyn PlanReplayer>),
        Arc::new(NoopLlm),
        "test".into(),
        dir.path().to_path_buf(),
    );

    let details = serde_json::json!({
        "module_path": "tools.math",
        "function_name": "subtract_numbers",
        "suggested_code_change": "pub fn subtract_numbers(a: f64, b: f64) -> f64 {\n    a - b\n}\n",
        "original_reflection_entry_id": entry.entry_id,
    });
    let outcome = executor.execute("PROPOSE_TOOL_MODIFICATION", details, None).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.reason, "post_mod_test_failed");

    let resolved = SelfModificationEngine::resolve_module_path(dir.path(), "tools.math");
    let reverted = std::fs::read_to_string(resolved).unwrap();
    assert!(reverted.contains("a + b"));
}

// E4: hierarchical complete tool assembly produces a single importable,
// lint-clean module with every declared import and body inlined.
#[tokio::test]
async fn e4_hierarchical_complete_tool_assembles_a_full_module() {
    struct ScriptedLlm(Vec<String>, parking_lot::Mutex<usize>);

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn invoke(&self, _prompt: &str, _model: &str, _temperature: f32, _max_tokens: usize) -> anyhow::Result<String> {
            let mut idx = self.1.lock();
            let response = self.0[*idx].clone();
            *idx += 1;
            Ok(response)
        }
    }

    let outline = r#"{
        "module_name": "todo_cli",
        "description": "a to-do CLI",
        "imports": ["std::collections::VecDeque"],
        "components": [
            {"type": "function", "name": "add_item", "description": "adds an item", "signature": "pub fn add_item(list: &mut VecDeque<String>, item: String)"},
            {"type": "class", "name": "TodoList", "description": "owns the items", "attributes": ["items: VecDeque<String>"], "methods": [
                {"type": "method", "name": "new", "description": "constructs an empty list", "signature": "pub fn new() -> Self"}
            ]}
        ]
    }"#;
    let add_item_body = "pub fn add_item(list: &mut VecDeque<String>, item: String) {\n    list.push_back(item);\n}\n";
    let new_method_body = "pub fn new() -> Self {\n    Self { items: VecDeque::new() }\n}\n";

    let client = Arc::new(ScriptedLlm(
        vec![outline.to_string(), add_item_body.to_string(), new_method_body.to_string()],
        parking_lot::Mutex::new(0),
    ));
    let service = CodeService::new(client, "test".into(), 0.0, 100);

    let outcome = service
        .generate_hierarchical_complete_tool("a to-do CLI", None)
        .await
        .unwrap();

    assert_eq!(outcome.status, "SUCCESS_HIERARCHICAL_ASSEMBLED");
    let code = outcome.code.unwrap();
    assert!(code.contains("use std::collections::VecDeque;"));
    assert!(code.contains("list.push_back(item)"));
    assert!(code.contains("pub struct TodoList"));
    assert!(code.contains("Self { items: VecDeque::new() }"));
    assert!(!code.contains("\n\n\n"));
    assert!(outcome.lint_issues.is_empty());
    assert!(outcome.saved_to.is_none());
}

// E5: learned-fact dedup and assessment, including the value/category
// assessment calls the Action Executor makes on every new fact.
#[tokio::test]
async fn e5_learned_fact_dedup_is_skipped_on_second_add() {
    struct AssessorLlm(Vec<String>, parking_lot::Mutex<usize>);

    #[async_trait]
    impl LlmClient for AssessorLlm {
        async fn invoke(&self, _prompt: &str, _model: &str, _temperature: f32, _max_tokens: usize) -> anyhow::Result<String> {
            let mut idx = self.1.lock();
            let response = self.0[*idx % self.0.len()].clone();
            *idx += 1;
            Ok(response)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let task_manager = Arc::new(TaskManager::in_memory());
    let notifications = Arc::new(NotificationBus::in_memory());
    let reflection_log = Arc::new(ReflectionLog::in_memory());
    let facts = Arc::new(FactStore::in_memory());
    let assessor = Arc::new(AssessorLlm(
        vec![r#"{"is_valuable": true, "reason": "useful"}"#.to_string(), "general_knowledge".to_string()],
        parking_lot::Mutex::new(0),
    ));
    let critics = CriticCoordinator::new(vec![Arc::new(FixedCritic(ReviewStatus::Approved))]);
    let executor = ActionExecutor::new(
        task_manager,
        notifications,
        reflection_log,
        facts.clone(),
        Arc::new(CodeService::new(assessor.clone(), "test".into(), 0.0, 10)),
        critics,
        None,
        assessor,
        "test".into(),
        dir.path().to_path_buf(),
    );

    let details = serde_json::json!({"text": "The sky is blue"});
    let first = executor.execute("ADD_LEARNED_FACT", details.clone(), None).await.unwrap();
    assert!(first.success);
    assert_eq!(facts.len(), 1);

    let second = executor.execute("ADD_LEARNED_FACT", details, None).await.unwrap();
    assert!(second.success);
    assert_eq!(second.reason, "duplicate");
    assert_eq!(facts.len(), 1);
}

// E6: the execution agent substitutes a prior tool's literal output into a
// later step's arguments.
#[tokio::test]
async fn e6_executor_substitutes_prior_step_output() {
    let tools = Arc::new(ToolRegistry::new());
    let task_manager = Arc::new(TaskManager::in_memory());
    let notifications = Arc::new(NotificationBus::in_memory());
    let reflection_log = Arc::new(ReflectionLog::in_memory());
    let planner: Arc<dyn Planner> = Arc::new(FixedPlanner(vec![]));
    let agent = ExecutionAgent::new(tools, task_manager, notifications, reflection_log, planner, 3);

    let plan = vec![
        PlanStep {
            tool_name: "request_user_clarification".into(),
            args: serde_json::json!({"question": "Name?", "canned_answer": "Alex"}),
        },
        PlanStep {
            tool_name: "echo".into(),
            args: serde_json::json!({"value": "[[step_1_output]]"}),
        },
    ];

    let (_attempted, results) = agent.run_plan("ask then echo the name", plan).await;
    assert_eq!(results.len(), 2);
    match &results[1] {
        agentcore::reflection::StepResult::Value(v) => assert_eq!(v, "Alex"),
        agentcore::reflection::StepResult::Error { error } => panic!("expected a value, got error: {}", error),
    }
}
