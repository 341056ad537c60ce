//! Shell tool - execute commands

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;
use crate::Result;
use super::{required_str, Tool};

const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Execute shell commands in the workspace
pub struct BashTool {
    workspace: PathBuf,
}

impl BashTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str { "Bash" }
    fn description(&self) -> &str { "Execute shell commands" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "description": {
                    "type": "string",
                    "description": "Human-readable description"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let command = required_str(&params, "command")?;
        let timeout_ms = params
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        if let Some(description) = params.get("description").and_then(Value::as_str) {
            debug!("Bash: {}", description);
        }

        // stderr is folded into stdout so the two stay interleaved
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("exec 2>&1\n{}", command))
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout reaches background jobs too
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return Ok(format!("Error executing command: {}", e)),
        };
        let pid = child.id();

        let waited =
            tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output()).await;

        let output = match waited {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Ok(format!("Error executing command: {}", e)),
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return Ok(format!(
                    "Command timed out after {} seconds",
                    timeout_ms as f64 / 1000.0
                ))
            }
        };

        let text = String::from_utf8_lossy(&output.stdout);
        if output.status.success() {
            if text.is_empty() {
                Ok("Command completed successfully (no output)".to_string())
            } else {
                Ok(text.into_owned())
            }
        } else {
            Ok(format!(
                "Command failed with exit code {}:\n{}",
                output.status.code().unwrap_or(-1),
                text
            ))
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    debug!("Killing process group {}", pgid);
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
