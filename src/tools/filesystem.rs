//! Filesystem tools - read files with line numbers

use std::path::PathBuf;
use async_trait::async_trait;
use serde_json::{json, Value};
use crate::Result;
use super::{required_str, resolve_path, Tool};

/// Read file contents, numbered like `cat -n`
pub struct ReadTool {
    workspace: PathBuf,
}

impl ReadTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str { "Read" }
    fn description(&self) -> &str { "Read file contents with optional pagination" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to file"
                },
                "limit": {
                    "type": "integer",
                    "description": "Number of lines to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Starting line number"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let file_path = required_str(&params, "file_path")?;
        let offset = params.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(0) as usize;

        let path = resolve_path(&self.workspace, file_path);
        if !path.exists() {
            return Ok(format!("Error: File not found at {}", file_path));
        }
        if path.is_dir() {
            return Ok(format!("Error: {} is a directory, not a file", file_path));
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => return Ok(format!("Error reading file: {}", e)),
        };

        let lines: Vec<&str> = content.lines().collect();
        if offset > 0 && offset >= lines.len() {
            return Ok(format!(
                "Error: Offset {} exceeds file length ({} lines)",
                offset,
                lines.len()
            ));
        }

        let take = if limit > 0 { limit } else { usize::MAX };
        let output: Vec<String> = lines
            .iter()
            .enumerate()
            .skip(offset)
            .take(take)
            .map(|(index, line)| format!("{:>6}→{}", index + 1, line))
            .collect();

        if output.is_empty() {
            Ok("File is empty or no lines in specified range".to_string())
        } else {
            Ok(output.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, ReadTool) {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "alpha\nbeta\r\ngamma\ndelta\n").unwrap();
        let tool = ReadTool::new(tmp.path().to_path_buf());
        (tmp, tool)
    }

    #[tokio::test]
    async fn test_read_numbers_lines() {
        let (_tmp, tool) = fixture();
        let result = tool.execute(json!({"file_path": "notes.txt"})).await.unwrap();
        assert_eq!(
            result,
            "     1→alpha\n     2→beta\n     3→gamma\n     4→delta"
        );
    }

    #[tokio::test]
    async fn test_read_offset_and_limit() {
        let (tmp, tool) = fixture();
        let path = tmp.path().join("notes.txt");
        let result = tool
            .execute(json!({"file_path": path.to_str().unwrap(), "offset": 1, "limit": 2}))
            .await
            .unwrap();
        assert_eq!(result, "     2→beta\n     3→gamma");
    }

    #[tokio::test]
    async fn test_read_offset_past_end() {
        let (_tmp, tool) = fixture();
        let result = tool
            .execute(json!({"file_path": "notes.txt", "offset": 4}))
            .await
            .unwrap();
        assert_eq!(result, "Error: Offset 4 exceeds file length (4 lines)");
    }

    #[tokio::test]
    async fn test_read_missing_and_directory() {
        let (tmp, tool) = fixture();
        let missing = tool.execute(json!({"file_path": "/missing/file"})).await.unwrap();
        assert_eq!(missing, "Error: File not found at /missing/file");

        let dir = tmp.path().to_str().unwrap().to_string();
        let result = tool.execute(json!({"file_path": dir.clone()})).await.unwrap();
        assert_eq!(result, format!("Error: {} is a directory, not a file", dir));
    }

    #[tokio::test]
    async fn test_read_empty_file() {
        let (tmp, tool) = fixture();
        std::fs::write(tmp.path().join("empty.txt"), "").unwrap();
        let result = tool.execute(json!({"file_path": "empty.txt"})).await.unwrap();
        assert_eq!(result, "File is empty or no lines in specified range");
    }

    #[tokio::test]
    async fn test_read_requires_file_path() {
        let (_tmp, tool) = fixture();
        assert!(tool.execute(json!({})).await.is_err());
    }
}
