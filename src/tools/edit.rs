//! Edit tool - replace content in files

use std::path::PathBuf;
use async_trait::async_trait;
use serde_json::{json, Value};
use crate::Result;
use super::{required_str, resolve_path, Tool};

/// Edit file content (exact string replacement)
pub struct EditTool {
    workspace: PathBuf,
}

impl EditTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str { "Edit" }
    fn description(&self) -> &str { "Modify existing files by replacing specific text strings" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to file to modify"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let file_path = required_str(&params, "file_path")?;
        let old_string = required_str(&params, "old_string")?;
        let new_string = required_str(&params, "new_string")?;
        let replace_all = params
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let path = resolve_path(&self.workspace, file_path);
        if !path.exists() {
            return Ok(format!("Error: File not found at {}", file_path));
        }
        if old_string.is_empty() {
            return Ok("Error: old_string must not be empty".to_string());
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => return Ok(format!("Error reading file: {}", e)),
        };

        if !content.contains(old_string) {
            return Ok(format!("Error: Text '{}' not found in file", old_string));
        }

        let (updated, occurrences) = if replace_all {
            (
                content.replace(old_string, new_string),
                content.matches(old_string).count(),
            )
        } else {
            (content.replacen(old_string, new_string, 1), 1)
        };

        if updated == content {
            return Ok("Error: old_string and new_string are identical, no changes made".to_string());
        }

        match std::fs::write(&path, &updated) {
            Ok(()) => Ok(format!(
                "Successfully replaced {} occurrence(s) in {}",
                occurrences, file_path
            )),
            Err(e) => Ok(format!("Error writing file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(content: &str) -> (TempDir, EditTool, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lib.rs");
        std::fs::write(&path, content).unwrap();
        let tool = EditTool::new(tmp.path().to_path_buf());
        (tmp, tool, path)
    }

    #[tokio::test]
    async fn test_replaces_first_occurrence() {
        let (_tmp, tool, path) = fixture("let a = 1;\nlet a = 1;\n");
        let result = tool
            .execute(json!({"file_path": "lib.rs", "old_string": "a = 1", "new_string": "b = 2"}))
            .await
            .unwrap();
        assert_eq!(result, "Successfully replaced 1 occurrence(s) in lib.rs");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "let b = 2;\nlet a = 1;\n");
    }

    #[tokio::test]
    async fn test_replace_all_counts_occurrences() {
        let (_tmp, tool, path) = fixture("x x x");
        let result = tool
            .execute(json!({
                "file_path": path.to_str().unwrap(),
                "old_string": "x",
                "new_string": "y",
                "replace_all": true
            }))
            .await
            .unwrap();
        assert!(result.starts_with("Successfully replaced 3 occurrence(s)"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "y y y");
    }

    #[tokio::test]
    async fn test_missing_text_and_file() {
        let (_tmp, tool, _path) = fixture("hello");
        let result = tool
            .execute(json!({"file_path": "lib.rs", "old_string": "bye", "new_string": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, "Error: Text 'bye' not found in file");

        let result = tool
            .execute(json!({"file_path": "/missing.rs", "old_string": "a", "new_string": "b"}))
            .await
            .unwrap();
        assert_eq!(result, "Error: File not found at /missing.rs");
    }

    #[tokio::test]
    async fn test_identical_strings_make_no_change() {
        let (_tmp, tool, _path) = fixture("same");
        let result = tool
            .execute(json!({"file_path": "lib.rs", "old_string": "same", "new_string": "same"}))
            .await
            .unwrap();
        assert_eq!(result, "Error: old_string and new_string are identical, no changes made");
    }

    #[tokio::test]
    async fn test_missing_parameter_is_an_error() {
        let (_tmp, tool, _path) = fixture("");
        let err = tool.execute(json!({"file_path": "lib.rs"})).await.unwrap_err();
        assert!(err.to_string().contains("old_string"));
    }
}
