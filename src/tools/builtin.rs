//! A small illustrative set of leaf tools.
//!
//! §1 scopes "domain-specific leaf tools (calculators, file readers, etc.)"
//! out as external collaborators named only by the interfaces the core
//! consumes. These exist to exercise the orchestrator/executor loop and the
//! self-modification scenarios of §8 (E1, E6) end to end; a real deployment
//! would discover many more through the custom-tool module mechanism.

use super::{Tool, ToolKind, ToolRegistry};
use crate::notifications::NotificationBus;
use crate::tasks::TaskManager;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

pub fn register_all(registry: &mut ToolRegistry) {
    registry.register("tools.builtin", "echo", ToolKind::Builtin, Echo);
    registry.register(
        "tools.builtin",
        "subtract_numbers",
        ToolKind::Builtin,
        SubtractNumbers,
    );
    registry.register(
        "tools.builtin",
        "request_user_clarification",
        ToolKind::Builtin,
        RequestUserClarification,
    );
    registry.register("tools.builtin", "calculator", ToolKind::Builtin, Calculator);
    registry.register("tools.builtin", "file_read", ToolKind::Builtin, FileRead);
}

/// Returns its `value` argument unchanged. Used throughout the test suite
/// to exercise step-output substitution (§4.9, E6).
pub struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Return the given value unchanged."
    }
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"value": {}},
            "required": ["value"],
        })
    }
    async fn execute(
        &self,
        args: Value,
        _task_manager: &TaskManager,
        _notifications: &NotificationBus,
    ) -> Result<Value> {
        args.get("value")
            .cloned()
            .ok_or_else(|| anyhow!("missing 'value' argument"))
    }
}

/// `subtract_numbers(a, b) -> a - b`. Deliberately the tool targeted by the
/// self-modification scenarios in §8 E1-E3.
pub struct SubtractNumbers;

#[async_trait]
impl Tool for SubtractNumbers {
    fn name(&self) -> &str {
        "subtract_numbers"
    }
    fn description(&self) -> &str {
        "Subtract b from a and return the difference."
    }
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "a": {"type": "number"},
                "b": {"type": "number"},
            },
            "required": ["a", "b"],
        })
    }
    async fn execute(
        &self,
        args: Value,
        _task_manager: &TaskManager,
        _notifications: &NotificationBus,
    ) -> Result<Value> {
        let a = args
            .get("a")
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow!("'a' must be a number"))?;
        let b = args
            .get("b")
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow!("'b' must be a number"))?;
        Ok(serde_json::json!(a - b))
    }
}

/// Simulates asking the user a question and reading their answer. In a real
/// front-end this would suspend on stdin; here it returns a canned value so
/// execution-agent substitution (§4.9, E6) can be exercised deterministically
/// in tests, with an override available for scripted scenarios.
pub struct RequestUserClarification;

#[async_trait]
impl Tool for RequestUserClarification {
    fn name(&self) -> &str {
        "request_user_clarification"
    }
    fn description(&self) -> &str {
        "Ask the user a clarifying question and return their answer."
    }
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"question": {"type": "string"}},
            "required": ["question"],
        })
    }
    async fn execute(
        &self,
        args: Value,
        _task_manager: &TaskManager,
        _notifications: &NotificationBus,
    ) -> Result<Value> {
        if let Some(answer) = args.get("canned_answer").and_then(Value::as_str) {
            return Ok(serde_json::json!(answer));
        }
        let question = args
            .get("question")
            .and_then(Value::as_str)
            .unwrap_or("(no question)");
        print!("{} ", question);
        use std::io::Write;
        std::io::stdout().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok();
        Ok(serde_json::json!(line.trim().to_string()))
    }
}

/// Evaluates a small arithmetic expression of the form `"<a> <op> <b>"`.
pub struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }
    fn description(&self) -> &str {
        "Evaluate a simple binary arithmetic expression, e.g. '2 + 2'."
    }
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"expression": {"type": "string"}},
            "required": ["expression"],
        })
    }
    async fn execute(
        &self,
        args: Value,
        _task_manager: &TaskManager,
        _notifications: &NotificationBus,
    ) -> Result<Value> {
        let expr = args
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing 'expression' argument"))?;
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(anyhow!("expected '<a> <op> <b>', got '{}'", expr));
        }
        let a: f64 = parts[0].parse().context("parsing left operand")?;
        let b: f64 = parts[2].parse().context("parsing right operand")?;
        let result = match parts[1] {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" => a / b,
            other => return Err(anyhow!("unsupported operator '{}'", other)),
        };
        Ok(serde_json::json!(result))
    }
}

/// Reads a UTF-8 text file relative to the current working directory.
pub struct FileRead;

#[async_trait]
impl Tool for FileRead {
    fn name(&self) -> &str {
        "file_read"
    }
    fn description(&self) -> &str {
        "Read the contents of a UTF-8 text file."
    }
    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        })
    }
    async fn execute(
        &self,
        args: Value,
        _task_manager: &TaskManager,
        _notifications: &NotificationBus,
    ) -> Result<Value> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing 'path' argument"))?;
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path))?;
        Ok(serde_json::json!(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> (TaskManager, NotificationBus) {
        (TaskManager::in_memory(), NotificationBus::in_memory())
    }

    #[tokio::test]
    async fn subtract_numbers_computes_difference() {
        let (tm, nb) = harness();
        let result = SubtractNumbers
            .execute(serde_json::json!({"a": 10, "b": 5}), &tm, &nb)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!(5.0));
    }

    #[tokio::test]
    async fn subtract_numbers_rejects_non_numeric_args() {
        let (tm, nb) = harness();
        let result = SubtractNumbers
            .execute(serde_json::json!({"a": "ten", "b": 5}), &tm, &nb)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn clarification_returns_canned_answer_when_provided() {
        let (tm, nb) = harness();
        let result = RequestUserClarification
            .execute(
                serde_json::json!({"question": "Name?", "canned_answer": "Alex"}),
                &tm,
                &nb,
            )
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("Alex"));
    }

    #[tokio::test]
    async fn calculator_evaluates_expression() {
        let (tm, nb) = harness();
        let result = Calculator
            .execute(serde_json::json!({"expression": "2 + 2"}), &tm, &nb)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!(4.0));
    }

    #[tokio::test]
    async fn file_read_reports_missing_file() {
        let (tm, nb) = harness();
        let result = FileRead
            .execute(serde_json::json!({"path": "/nonexistent/file.txt"}), &tm, &nb)
            .await;
        assert!(result.is_err());
    }
}
