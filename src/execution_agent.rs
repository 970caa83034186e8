//! Execution Agent (C10)
//!
//! Iterates over a plan's steps through the Tool Registry, substituting
//! `[[step_<i>_output]]` tokens, replanning on failure up to a configured
//! bound, and logging the full attempt to the Reflection Log (§4.9, §4.10).

use serde_json::Value;
use std::sync::Arc;

use crate::action_executor::PlanReplayer;
use crate::notifications::NotificationBus;
use crate::planner::{substitute_step_outputs, PlanStep, Planner};
use crate::reflection::{LogExecutionParams, PlanStepRecord, ReflectionLog, StepResult};
use crate::tasks::TaskManager;
use crate::tools::ToolRegistry;

/// §4.10: a result is an error if it is an `Err`, or a JSON object carrying
/// `error`, `ran_successfully: false`, or `_is_error_representation_: true`.
fn is_error_value(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key("error")
                || matches!(map.get("ran_successfully"), Some(Value::Bool(false)))
                || matches!(map.get("_is_error_representation_"), Some(Value::Bool(true)))
        }
        _ => false,
    }
}

pub struct ExecutionAgent {
    tools: Arc<ToolRegistry>,
    task_manager: Arc<TaskManager>,
    notifications: Arc<NotificationBus>,
    reflection_log: Arc<ReflectionLog>,
    planner: Arc<dyn Planner>,
    max_replans_per_goal: usize,
}

impl ExecutionAgent {
    pub fn new(
        tools: Arc<ToolRegistry>,
        task_manager: Arc<TaskManager>,
        notifications: Arc<NotificationBus>,
        reflection_log: Arc<ReflectionLog>,
        planner: Arc<dyn Planner>,
        max_replans_per_goal: usize,
    ) -> Self {
        Self {
            tools,
            task_manager,
            notifications,
            reflection_log,
            planner,
            max_replans_per_goal,
        }
    }

    /// Runs `plan` to completion or exhaustion of the replan bound,
    /// returning the plan as actually attempted (post-substitution, with
    /// any replanned tail) and one result per attempted step. Logs a single
    /// Reflection Log entry for the whole attempt.
    pub async fn run_plan(&self, goal: &str, mut plan: Vec<PlanStep>) -> (Vec<PlanStep>, Vec<StepResult>) {
        let mut attempted_plan = Vec::new();
        let mut prior_outputs: Vec<Value> = Vec::new();
        let mut step_results: Vec<StepResult> = Vec::new();
        let mut replans = 0usize;
        let mut overall_ok = true;
        let mut idx = 0;

        while idx < plan.len() {
            let step = plan[idx].clone();
            let substituted_args = substitute_step_outputs(&step.args, &prior_outputs);
            attempted_plan.push(PlanStep {
                tool_name: step.tool_name.clone(),
                args: substituted_args.clone(),
            });

            let exec_result = self
                .tools
                .execute(&step.tool_name, substituted_args, &self.task_manager, &self.notifications)
                .await;

            let failure_description = match exec_result {
                Ok(value) if !is_error_value(&value) => {
                    prior_outputs.push(value.clone());
                    step_results.push(StepResult::Value(value));
                    None
                }
                Ok(value) => {
                    let description = format!("step {} ({}) returned an error result: {}", idx + 1, step.tool_name, value);
                    prior_outputs.push(value.clone());
                    step_results.push(StepResult::Error { error: value.to_string() });
                    Some(description)
                }
                Err(e) => {
                    let description = format!("step {} ({}) failed: {}", idx + 1, step.tool_name, e);
                    prior_outputs.push(Value::String(e.to_string()));
                    step_results.push(StepResult::Error { error: e.to_string() });
                    Some(description)
                }
            };

            if let Some(failure_description) = failure_description {
                overall_ok = false;
                if replans >= self.max_replans_per_goal {
                    break;
                }
                let remaining: Vec<PlanStep> = plan[idx + 1..].to_vec();
                match self.planner.replan_after_failure(goal, &failure_description, &remaining).await {
                    Ok(new_tail) => {
                        replans += 1;
                        plan.truncate(idx + 1);
                        plan.extend(new_tail);
                    }
                    Err(_) => break,
                }
            }

            idx += 1;
        }

        let plan_records: Vec<PlanStepRecord> = attempted_plan
            .iter()
            .map(|s| PlanStepRecord { tool_name: s.tool_name.clone(), args: s.args.clone() })
            .collect();
        let _ = self.reflection_log.log_execution(
            goal,
            plan_records,
            step_results.clone(),
            overall_ok,
            LogExecutionParams::default(),
        );

        (attempted_plan, step_results)
    }
}

/// Post-modification test replay (§4.8): runs a previously-recorded plan
/// through the live tool registry with no replanning, judging success by
/// the same error-detection rule as a normal run.
#[async_trait::async_trait]
impl PlanReplayer for ExecutionAgent {
    async fn replay_succeeds(&self, plan: &[PlanStepRecord]) -> bool {
        for step in plan {
            let result = self
                .tools
                .execute(&step.tool_name, step.args.clone(), &self.task_manager, &self.notifications)
                .await;
            match result {
                Ok(value) if !is_error_value(&value) => continue,
                _ => return false,
            }
        }
        true
    }
}
