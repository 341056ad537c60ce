//! Tools module - agent capabilities
//!
//! Tools are the actions the model can request: reading and editing files,
//! running shell commands and searching the workspace. Expected failures
//! (missing file, bad regex, non-zero exit) come back as `Ok` strings that
//! start with `Error:` so the model can react to them.

mod registry;
mod filesystem;
mod edit;
mod shell;
mod search;

pub use registry::{ToolDefinition, ToolRegistry};
pub use filesystem::ReadTool;
pub use edit::EditTool;
pub use shell::BashTool;
pub use search::GrepTool;

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde_json::Value;
use crate::Result;
use crate::error::Error;

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value) -> Result<String>;

    /// Convert to tool definition for LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Required string parameter
pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Tool(format!("Missing '{}' parameter", key)))
}

/// Resolve a possibly relative path against the workspace
pub(crate) fn resolve_path(workspace: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Dummy tool for testing
#[cfg(test)]
pub struct DummyTool {
    pub name: String,
    pub result: String,
}

#[cfg(test)]
#[async_trait]
impl Tool for DummyTool {
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { "Dummy tool for testing" }
    fn parameters(&self) -> Value { serde_json::json!({"type": "object"}) }

    async fn execute(&self, _params: Value) -> Result<String> {
        Ok(self.result.clone())
    }
}

/// Tool whose executor always fails, or panics when asked to
#[cfg(test)]
pub struct FailingTool {
    pub name: String,
    pub panic: bool,
}

#[cfg(test)]
#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { "Always fails" }
    fn parameters(&self) -> Value { serde_json::json!({"type": "object"}) }

    async fn execute(&self, params: Value) -> Result<String> {
        let path = params.get("file_path").and_then(Value::as_str).unwrap_or("?");
        if self.panic {
            panic!("cannot open {}", path);
        }
        Err(Error::Tool(format!("No such file or directory: {}", path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let params = json!({"command": "ls", "n": 1});
        assert_eq!(required_str(&params, "command").unwrap(), "ls");
        assert_eq!(
            required_str(&params, "n").unwrap_err().to_string(),
            "Tool error: Missing 'n' parameter"
        );
    }

    #[test]
    fn test_resolve_path() {
        let ws = Path::new("/work");
        assert_eq!(resolve_path(ws, "src/a.rs"), PathBuf::from("/work/src/a.rs"));
        assert_eq!(resolve_path(ws, "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
