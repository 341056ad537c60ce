//! Search tool - regex search in files

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use walkdir::WalkDir;
use crate::Result;
use super::{required_str, resolve_path, Tool};

/// Cap on emitted lines to avoid blowing up context
const MAX_OUTPUT_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Content,
    FilesWithMatches,
    Count,
}

impl OutputMode {
    fn parse(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("files_with_matches") => Some(Self::FilesWithMatches),
            Some("content") => Some(Self::Content),
            Some("count") => Some(Self::Count),
            Some(_) => None,
        }
    }
}

struct SearchOptions {
    mode: OutputMode,
    line_numbers: bool,
    context: usize,
    /// Prefix lines with the file they came from
    show_path: bool,
}

/// Search for regex patterns in files
pub struct GrepTool {
    workspace: PathBuf,
}

impl GrepTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    /// Files under `root`, hidden directories skipped, sorted by name
    fn candidate_files(&self, root: &Path, glob: Option<&Regex>) -> Vec<PathBuf> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_name().to_string_lossy().starts_with('.')
            })
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| match glob {
                Some(glob) => {
                    let name = entry.file_name().to_string_lossy();
                    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                    glob.is_match(&name) || glob.is_match(&relative.to_string_lossy())
                }
                None => true,
            })
            .map(|entry| entry.into_path())
            .collect()
    }

    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.workspace)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str { "Grep" }
    fn description(&self) -> &str { "Search for patterns in files using regex" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory path"
                },
                "output_mode": {
                    "type": "string",
                    "enum": ["content", "files_with_matches", "count"],
                    "description": "Output mode: content, files_with_matches, or count"
                },
                "glob": {
                    "type": "string",
                    "description": "File pattern filter (e.g., \"*.rs\")"
                },
                "-n": {
                    "type": "boolean",
                    "description": "Show line numbers"
                },
                "-i": {
                    "type": "boolean",
                    "description": "Case insensitive search"
                },
                "-C": {
                    "type": "integer",
                    "description": "Context lines around matches"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let pattern = required_str(&params, "pattern")?;
        let raw_path = params.get("path").and_then(Value::as_str).unwrap_or(".");
        let glob = params.get("glob").and_then(Value::as_str);
        let case_insensitive = params.get("-i").and_then(Value::as_bool).unwrap_or(false);

        let Some(mode) = OutputMode::parse(params.get("output_mode").and_then(Value::as_str))
        else {
            return Ok("Error: output_mode must be one of content, files_with_matches, count"
                .to_string());
        };

        let regex = match RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(regex) => regex,
            Err(e) => return Ok(format!("Error: invalid regex: {}", e)),
        };

        let root = resolve_path(&self.workspace, raw_path);
        if !root.exists() {
            return Ok(format!("Error: {}: No such file or directory", raw_path));
        }

        let files = if root.is_file() {
            vec![root.clone()]
        } else {
            let glob_regex = match glob.map(glob_to_regex).transpose() {
                Ok(glob_regex) => glob_regex,
                Err(e) => return Ok(format!("Error: invalid glob: {}", e)),
            };
            let files = self.candidate_files(&root, glob_regex.as_ref());
            if files.is_empty() {
                if let Some(glob) = glob {
                    return Ok(format!(
                        "No files found matching pattern '{}' in {}",
                        glob, raw_path
                    ));
                }
            }
            files
        };

        let options = SearchOptions {
            mode,
            line_numbers: params.get("-n").and_then(Value::as_bool).unwrap_or(false),
            context: params
                .get("-C")
                .and_then(Value::as_u64)
                .map_or(0, |c| usize::try_from(c).unwrap_or(usize::MAX)),
            show_path: !root.is_file(),
        };

        let mut output: Vec<String> = Vec::new();
        for file in &files {
            // Binary and non-UTF-8 files are skipped
            let Ok(content) = std::fs::read_to_string(file) else {
                continue;
            };
            search_file(&regex, &self.display_path(file), &content, &options, &mut output);
        }

        if output.is_empty() {
            return Ok("No matches found".to_string());
        }

        if output.len() > MAX_OUTPUT_LINES {
            let total = output.len();
            output.truncate(MAX_OUTPUT_LINES);
            output.push(format!("... ({} more lines truncated)", total - MAX_OUTPUT_LINES));
        }
        Ok(output.join("\n"))
    }
}

fn search_file(
    regex: &Regex,
    display: &str,
    content: &str,
    options: &SearchOptions,
    output: &mut Vec<String>,
) {
    let lines: Vec<&str> = content.lines().collect();
    let matches: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| regex.is_match(line))
        .map(|(index, _)| index)
        .collect();

    if matches.is_empty() {
        return;
    }

    match options.mode {
        OutputMode::FilesWithMatches => output.push(display.to_string()),
        OutputMode::Count => {
            if options.show_path {
                output.push(format!("{}:{}", display, matches.len()));
            } else {
                output.push(matches.len().to_string());
            }
        }
        OutputMode::Content => {
            let context = options.context.min(lines.len());
            let mut last_emitted: Option<usize> = None;

            for &hit in &matches {
                let start = hit.saturating_sub(context);
                let end = hit.saturating_add(context).min(lines.len() - 1);
                let start = match last_emitted {
                    Some(last) if last + 1 >= start => start.max(last + 1),
                    Some(_) if context > 0 => {
                        output.push("--".to_string());
                        start
                    }
                    None if context > 0 && !output.is_empty() => {
                        output.push("--".to_string());
                        start
                    }
                    _ => start,
                };

                for index in start..=end {
                    let separator = if regex.is_match(lines[index]) { ':' } else { '-' };
                    output.push(format_line(display, index, lines[index], separator, options));
                }
                last_emitted = Some(end.max(last_emitted.unwrap_or(0)));
            }
        }
    }
}

fn format_line(
    display: &str,
    index: usize,
    line: &str,
    separator: char,
    options: &SearchOptions,
) -> String {
    let mut out = String::new();
    if options.show_path {
        out.push_str(display);
        out.push(separator);
    }
    if options.line_numbers {
        out.push_str(&(index + 1).to_string());
        out.push(separator);
    }
    out.push_str(line);
    out
}

/// Translate a shell glob (`*`, `**`, `?`, `[..]`, `{a,b}`) into an anchored regex.
fn glob_to_regex(glob: &str) -> std::result::Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    let mut in_braces = false;

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    pattern.push_str("(?:.*/)?");
                } else {
                    pattern.push_str(".*");
                }
            }
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            '[' => {
                pattern.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    pattern.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    if inner == '\\' || inner == '[' {
                        pattern.push('\\');
                    }
                    pattern.push(inner);
                }
                pattern.push(']');
            }
            '{' => {
                in_braces = true;
                pattern.push_str("(?:");
            }
            '}' if in_braces => {
                in_braces = false;
                pattern.push(')');
            }
            ',' if in_braces => pattern.push('|'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }

    pattern.push('$');
    Regex::new(&pattern)
}
