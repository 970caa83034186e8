//! Self-evolving agent core: a plan/execute loop with critic-gated
//! self-modification, layered over seven atomically-persisted JSON stores.

pub mod action_executor;
pub mod cli;
pub mod code_service;
pub mod config;
pub mod critics;
pub mod errors;
pub mod execution_agent;
pub mod facts;
pub mod goals;
pub mod learning;
pub mod llm;
pub mod notifications;
pub mod orchestrator;
pub mod persistence;
pub mod planner;
pub mod reflection;
pub mod self_modification;
pub mod tasks;
pub mod telemetry;
pub mod tools;

use std::sync::Arc;

use crate::action_executor::ActionExecutor;
use crate::code_service::CodeService;
use crate::config::Config;
use crate::critics::{CriticCoordinator, LlmCritic};
use crate::execution_agent::ExecutionAgent;
use crate::facts::FactStore;
use crate::goals::GoalStore;
use crate::learning::LearningAgent;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::notifications::NotificationBus;
use crate::orchestrator::Orchestrator;
use crate::persistence::DataPaths;
use crate::planner::{LlmPlanner, Planner};
use crate::reflection::ReflectionLog;
use crate::tasks::TaskManager;
use crate::tools::ToolRegistry;

/// Every collaborator wired up and ready to drive the Orchestrator or the
/// Learning Agent's background review loop. Constructing this is the one
/// place that knows how the whole system is assembled; everything else only
/// depends on the traits and structs it is handed.
pub struct AgentCore {
    pub orchestrator: Orchestrator,
    pub learning_agent: LearningAgent,
    pub tools: Arc<ToolRegistry>,
    pub task_manager: Arc<TaskManager>,
    pub notifications: Arc<NotificationBus>,
    pub reflection_log: Arc<ReflectionLog>,
    pub facts: Arc<FactStore>,
    pub goals: Arc<GoalStore>,
}

impl AgentCore {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let paths = DataPaths::new(config.data_dir.clone());

        let tools = Arc::new(ToolRegistry::new());
        let task_manager = Arc::new(TaskManager::new(paths.active_tasks(), config.agent.archived_task_cap)?);
        let notifications = Arc::new(NotificationBus::new(paths.notifications())?);
        task_manager.reconcile_interrupted_with_bus(&notifications)?;
        let reflection_log = Arc::new(ReflectionLog::new(paths.reflection_log())?);
        let facts = Arc::new(FactStore::new(paths.learned_facts())?);
        let goals = Arc::new(GoalStore::new(paths.goals())?);
        let insights = Arc::new(learning::InsightStore::new(paths.actionable_insights())?);

        let client: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(config.endpoint.clone(), config.api_key.clone()));

        let planner: Arc<dyn Planner> = Arc::new(LlmPlanner::new(
            client.clone(),
            config.model.clone(),
            config.temperature,
            config.max_tokens,
        ));

        let execution_agent = Arc::new(ExecutionAgent::new(
            tools.clone(),
            task_manager.clone(),
            notifications.clone(),
            reflection_log.clone(),
            planner.clone(),
            config.agent.max_replans_per_goal,
        ));

        let critics = CriticCoordinator::new(
            (0..config.critics.count)
                .map(|_| {
                    Arc::new(LlmCritic {
                        client: client.clone(),
                        model: config.model.clone(),
                        temperature: config.temperature,
                        max_tokens: config.max_tokens,
                    }) as Arc<dyn critics::Critic>
                })
                .collect(),
        );

        let code_service = Arc::new(CodeService::new(
            client.clone(),
            config.model.clone(),
            config.temperature,
            config.max_tokens,
        ));

        let action_executor = Arc::new(ActionExecutor::new(
            task_manager.clone(),
            notifications.clone(),
            reflection_log.clone(),
            facts.clone(),
            code_service,
            critics,
            Some(execution_agent.clone() as Arc<dyn action_executor::PlanReplayer>),
            client,
            config.model.clone(),
            config.project_root.clone(),
        ));

        let learning_agent = LearningAgent::new(insights, action_executor.clone());

        let orchestrator = Orchestrator::new(
            tools.clone(),
            planner,
            execution_agent,
            action_executor,
            notifications.clone(),
            facts.clone(),
            goals.clone(),
            config.agent.max_relevant_facts,
        );

        Ok(Self {
            orchestrator,
            learning_agent,
            tools,
            task_manager,
            notifications,
            reflection_log,
            facts,
            goals,
        })
    }
}
