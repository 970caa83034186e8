//! Planner (C9)
//!
//! Turns a goal plus the available tool list, relevant facts, and optional
//! project context into an ordered plan. Replanning asks the same LLM for a
//! continuation given a failure analysis (§4.9).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::facts::LearnedFact;
use crate::llm::{strip_code_fences, LlmClient};
use crate::tools::ToolMetadata;

/// One step of a plan. The distilled interface models `args`/`kwargs`
/// separately; the Rust realization merges them into one `args` object
/// before dispatch, since every `Tool::execute` here takes a single
/// `serde_json::Value` (see `tools::Tool`, and DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn generate_plan(
        &self,
        goal: &str,
        tools: &[ToolMetadata],
        facts: &[LearnedFact],
        project_context: Option<&str>,
    ) -> anyhow::Result<Vec<PlanStep>>;

    async fn replan_after_failure(
        &self,
        goal: &str,
        failure_analysis: &str,
        remaining_steps: &[PlanStep],
    ) -> anyhow::Result<Vec<PlanStep>>;
}

pub struct LlmPlanner {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmPlanner {
    pub fn new(client: Arc<dyn LlmClient>, model: String, temperature: f32, max_tokens: usize) -> Self {
        Self { client, model, temperature, max_tokens }
    }

    fn tool_list_section(tools: &[ToolMetadata]) -> String {
        tools
            .iter()
            .map(|t| format!("- {}: {}", t.tool_name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn facts_section(facts: &[LearnedFact]) -> String {
        if facts.is_empty() {
            return "(none)".to_string();
        }
        facts.iter().map(|f| format!("- {}", f.text)).collect::<Vec<_>>().join("\n")
    }

    async fn invoke(&self, prompt: &str) -> anyhow::Result<Vec<PlanStep>> {
        let raw = self.client.invoke(prompt, &self.model, self.temperature, self.max_tokens).await?;
        let cleaned = strip_code_fences(&raw);
        Ok(serde_json::from_str(&cleaned)?)
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn generate_plan(
        &self,
        goal: &str,
        tools: &[ToolMetadata],
        facts: &[LearnedFact],
        project_context: Option<&str>,
    ) -> anyhow::Result<Vec<PlanStep>> {
        let prompt = format!(
            "Goal: {}\n\nAvailable tools:\n{}\n\nRelevant facts:\n{}\n\nProject context:\n{}\n\n\
             Respond with a JSON array of steps, each `{{\"tool_name\": string, \"args\": object}}`. \
             Use `[[step_<i>_output]]` (1-indexed) anywhere you need the literal output of an \
             earlier step substituted in. Respond with only the JSON array.",
            goal,
            Self::tool_list_section(tools),
            Self::facts_section(facts),
            project_context.unwrap_or("(none)"),
        );
        self.invoke(&prompt).await
    }

    async fn replan_after_failure(
        &self,
        goal: &str,
        failure_analysis: &str,
        remaining_steps: &[PlanStep],
    ) -> anyhow::Result<Vec<PlanStep>> {
        let prompt = format!(
            "Goal: {}\n\nA plan step failed. Failure analysis:\n{}\n\n\
             Remaining steps that were planned but not yet executed:\n{}\n\n\
             Respond with a JSON array of replacement steps for the rest of the plan, same \
             shape as before. Respond with only the JSON array.",
            goal,
            failure_analysis,
            serde_json::to_string_pretty(remaining_steps).unwrap_or_default(),
        );
        self.invoke(&prompt).await
    }
}

/// Replace every `[[step_<i>_output]]` token found in string leaves of
/// `args` with the literal rendering of `previous_results[i - 1]` (§4.9).
pub fn substitute_step_outputs(args: &Value, previous_results: &[Value]) -> Value {
    match args {
        Value::String(s) => {
            if let Some(index) = parse_step_output_token(s) {
                if let Some(result) = previous_results.get(index - 1) {
                    return render_as_arg(result);
                }
            }
            Value::String(s.clone())
        }
        Value::Array(items) => Value::Array(
            items.iter().map(|v| substitute_step_outputs(v, previous_results)).collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_step_outputs(v, previous_results)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn parse_step_output_token(s: &str) -> Option<usize> {
    let inner = s.strip_prefix("[[step_")?.strip_suffix("_output]]")?;
    inner.parse::<usize>().ok()
}

fn render_as_arg(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_literal_prior_output() {
        let previous = vec![Value::String("42".to_string())];
        let args = serde_json::json!({"value": "[[step_1_output]]"});
        let substituted = substitute_step_outputs(&args, &previous);
        assert_eq!(substituted["value"], "42");
    }

    #[test]
    fn substitutes_inside_nested_arrays() {
        let previous = vec![Value::String("a".to_string()), Value::String("b".to_string())];
        let args = serde_json::json!({"items": ["[[step_1_output]]", "[[step_2_output]]", "literal"]});
        let substituted = substitute_step_outputs(&args, &previous);
        assert_eq!(substituted["items"][0], "a");
        assert_eq!(substituted["items"][1], "b");
        assert_eq!(substituted["items"][2], "literal");
    }

    #[test]
    fn non_matching_strings_pass_through() {
        let args = serde_json::json!({"value": "not a token"});
        let substituted = substitute_step_outputs(&args, &[]);
        assert_eq!(substituted["value"], "not a token");
    }

    #[test]
    fn out_of_range_token_is_left_untouched() {
        let args = serde_json::json!("[[step_5_output]]");
        let substituted = substitute_step_outputs(&args, &[Value::String("only one".into())]);
        assert_eq!(substituted, Value::String("[[step_5_output]]".to_string()));
    }
}
