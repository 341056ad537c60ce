//! Tool registry - explicit name to capability table and dispatch

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use crate::error::Error;
use super::Tool;
use super::{BashTool, EditTool, GrepTool, ReadTool};

/// Tool definition for LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Registered tools, kept in registration order
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registry with the built-in coding tools
    pub fn with_defaults(workspace: &Path) -> Self {
        let mut registry = Self::new();
        registry.register(EditTool::new(workspace.to_path_buf()));
        registry.register(ReadTool::new(workspace.to_path_buf()));
        registry.register(BashTool::new(workspace.to_path_buf()));
        registry.register(GrepTool::new(workspace.to_path_buf()));
        registry
    }

    /// Register a tool. A tool with the same name replaces the earlier one in place.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = Box::new(tool),
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(Box::new(tool));
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&slot| self.tools[slot].as_ref())
    }

    /// Check if a tool exists
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// List registered tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Get tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Run a tool and turn every outcome into result text.
    ///
    /// Unknown names, executor errors and executor panics all become strings;
    /// nothing escapes to the caller.
    pub async fn dispatch(&self, name: &str, input: Value) -> String {
        let Some(tool) = self.find(name) else {
            warn!("Model requested unknown tool: {}", name);
            return format!("Unknown tool: {}", name);
        };

        debug!("Executing tool: {} with args: {}", name, input);

        match AssertUnwindSafe(tool.execute(input)).catch_unwind().await {
            Ok(Ok(result)) => {
                debug!("Tool {} succeeded: {} chars", name, result.len());
                result
            }
            Ok(Err(e)) => {
                let message = match e {
                    Error::Tool(message) => message,
                    other => other.to_string(),
                };
                debug!("Tool {} failed: {}", name, message);
                format!("Error executing tool: {}", message)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("Tool {} panicked: {}", name, message);
                format!("Error executing tool: {}", message)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
