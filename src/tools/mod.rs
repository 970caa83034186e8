//! Tool Registry (C1)
//!
//! Name-keyed registry of available tools. Each tool is a schema-described
//! async callable, the same `Tool` trait + `ToolRegistry` shape the teacher
//! crate uses, generalized with persisted metadata (provenance, module
//! path, function name) so the self-modification engine (C7) can locate a
//! tool's backing source and the registry can survive a restart.

pub mod builtin;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::notifications::NotificationBus;
use crate::tasks::TaskManager;

/// A tool that can be executed by the agent. Each tool has a name,
/// description, JSON schema for its arguments, and an async `execute`
/// method. Tools are registered in a [`ToolRegistry`] and invoked by name
/// during plan execution.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;

    /// Invoked with the step's marshalled arguments and, when the tool
    /// needs them, handles to the task manager / notification bus (the
    /// Rust realization of "inspect the target's parameter list" dependency
    /// injection in §4.1 -- every `Tool` receives both handles and is free
    /// to ignore them).
    async fn execute(
        &self,
        args: Value,
        task_manager: &TaskManager,
        notifications: &NotificationBus,
    ) -> Result<Value>;
}

/// Provenance of a registered tool (§3 `Tool.type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Builtin,
    CustomDiscovered,
    /// Bound to the live registry instance; never persisted (§4.1).
    SystemInternal,
    /// A tool discovered on disk and not yet wired to a live callable,
    /// matching the Rust realization
    /// note in SPEC_FULL.md §4.1.
    Dynamic,
}

/// Persisted metadata for a tool (`tool_registry.json`, §6). Does not and
/// cannot carry the live callable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    pub description: String,
    pub module_path: String,
    pub function_name: String,
    pub kind: ToolKind,
    pub schema_details: Option<Value>,
}

struct RegisteredTool {
    metadata: ToolMetadata,
    callable: Box<dyn Tool>,
}

/// Registry created with all built-in tools pre-registered; additional
/// tools can be registered at runtime (custom-discovered or dynamic).
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create a registry populated with the illustrative built-in tool set
    /// (§1: "domain-specific leaf tools" are out of scope beyond a small
    /// set named only by the interfaces the core consumes).
    pub fn new() -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };
        builtin::register_all(&mut registry);
        registry
    }

    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Idempotent on name: re-registering with a different
    /// `module_path`/`function_name` is permitted and logged (§4.1).
    pub fn register(
        &mut self,
        module_path: impl Into<String>,
        function_name: impl Into<String>,
        kind: ToolKind,
        tool: impl Tool + 'static,
    ) {
        let name = tool.name().to_string();
        let module_path = module_path.into();
        let function_name = function_name.into();

        if let Some(existing) = self.tools.get(&name) {
            if existing.metadata.module_path != module_path
                || existing.metadata.function_name != function_name
            {
                warn!(
                    tool = %name,
                    old_module = %existing.metadata.module_path,
                    new_module = %module_path,
                    "re-registering tool with a different module/function path"
                );
            }
        }

        let metadata = ToolMetadata {
            tool_name: name.clone(),
            description: tool.description().to_string(),
            module_path,
            function_name,
            kind,
            schema_details: Some(tool.schema()),
        };

        self.tools.insert(
            name,
            RegisteredTool {
                metadata,
                callable: Box::new(tool),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.callable.as_ref())
    }

    pub fn metadata(&self, name: &str) -> Option<&ToolMetadata> {
        self.tools.get(name).map(|t| &t.metadata)
    }

    pub fn list(&self) -> Vec<&ToolMetadata> {
        self.tools.values().map(|t| &t.metadata).collect()
    }

    /// `list_with_sources()`: same as `list()` but the name makes explicit
    /// that provenance (`kind`, `module_path`) is included.
    pub fn list_with_sources(&self) -> Vec<&ToolMetadata> {
        self.list()
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        task_manager: &TaskManager,
        notifications: &NotificationBus,
    ) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| anyhow!(crate::errors::ToolError::NotFound {
                name: name.to_string()
            }))?;
        tool.execute(args, task_manager, notifications)
            .await
            .map_err(|e| {
                anyhow!(crate::errors::ToolError::Execution {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            })
    }

    /// Persist tool metadata only (`system_internal` tools are skipped, per
    /// §4.1's invariant that they are bound to the live instance).
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let persisted: Vec<&ToolMetadata> = self
            .tools
            .values()
            .map(|t| &t.metadata)
            .filter(|m| m.kind != ToolKind::SystemInternal)
            .collect();
        crate::persistence::write_json_atomic(path, &persisted)?;
        Ok(())
    }

    /// Load persisted metadata and report which entries could not be
    /// re-resolved to a live callable (they are skipped with a warning,
    /// per §4.1). Only builtin tools can be re-resolved in this binary
    /// realization; custom/dynamic entries are re-attached by the caller
    /// after successful dynamic-library resolution.
    pub fn load_known(&mut self, path: &std::path::Path) -> Result<Vec<String>> {
        let entries: Vec<ToolMetadata> =
            crate::persistence::read_json_opt(path)?.unwrap_or_default();
        let mut skipped = Vec::new();
        for entry in entries {
            if self.tools.contains_key(&entry.tool_name) {
                continue; // already registered as a builtin with a live callable
            }
            warn!(tool = %entry.tool_name, "skipping persisted tool with no resolvable callable");
            skipped.push(entry.tool_name);
        }
        Ok(skipped)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
