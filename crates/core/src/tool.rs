//! Tool trait and the dispatch registry.
//!
//! Tools are what let the model act on the project: read and edit files,
//! search, run commands, inspect git. The model asks for them by writing
//! `{"tool": "<name>", "params": {...}}` into its reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::ToolError;

/// Loosely typed tool parameters. Numbers always arrive as JSON numbers;
/// each tool validates and coerces its own keys.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A tool invocation parsed out of model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub tool: String,

    /// Parameters, empty when the model omitted them
    #[serde(default)]
    pub params: Params,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, params: Params) -> Self {
        Self { tool: tool.into(), params }
    }
}

/// The core Tool trait.
///
/// Each tool (read_file, edit_file, git_status, ...) implements this trait and
/// is registered in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name the model uses to call this tool.
    fn name(&self) -> &str;

    /// One-line description of what this tool does.
    fn description(&self) -> &str;

    /// Execute the tool. Relative paths resolve against `working_dir`.
    async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError>;
}

/// Name to executor lookup, in registration order.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a tool by name.
    ///
    /// An unknown name is reported as [`ToolError::NotFound`], never a panic.
    pub async fn execute(
        &self,
        name: &str,
        params: &Params,
        working_dir: &Path,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params, working_dir).await
    }

    /// List all registered tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// `(name, description)` pairs in registration order.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| (t.name(), t.description()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        async fn execute(&self, params: &Params, working_dir: &Path) -> Result<String, ToolError> {
            let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("");
            Ok(format!("{text} in {}", working_dir.display()))
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "named"
        }
        async fn execute(&self, _params: &Params, _working_dir: &Path) -> Result<String, ToolError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(NamedTool("zeta")));
        registry.register(Box::new(NamedTool("alpha")));
        registry.register(Box::new(NamedTool("zeta")));
        assert_eq!(registry.names(), vec!["zeta", "alpha"]);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let params = serde_json::json!({"text": "hello"});
        let params = params.as_object().unwrap();
        let out = registry.execute("echo", params, Path::new("/tmp")).await.unwrap();
        assert_eq!(out, "hello in /tmp");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("frobnicate", &Params::new(), Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
        assert_eq!(err.to_string(), "unknown tool: frobnicate");
    }

    #[test]
    fn tool_call_params_default_to_empty() {
        let call: ToolCall = serde_json::from_str(r#"{"tool": "git_status"}"#).unwrap();
        assert_eq!(call.tool, "git_status");
        assert!(call.params.is_empty());
    }
}
