//! Terminal rendering for status lines and agent events

use std::io::{self, Write};
use colored::*;
use crate::agent::AgentEvent;

/// Lines of a tool result shown before collapsing the rest
const RESULT_PREVIEW_LINES: usize = 4;

pub fn print_header(model: &str, provider: &str) {
    let line = "─".repeat(60);
    println!("{}", line.black().bold());

    let name = "Quill".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}", name, version);

    let info = format!("  {}  •  {}", model, provider).cyan();
    println!("{}", info);

    if let Ok(path) = std::env::current_dir() {
        let path_str = path.to_string_lossy().black().bold();
        println!("  {}", path_str);
    }

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "!".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("  {} {}", "✗".red().bold(), msg.red());
}

/// Streams [`AgentEvent`]s to a terminal.
///
/// Deltas are printed inline as they arrive; anything else starts on a
/// fresh line.
pub struct EventPrinter<W: Write = io::Stdout> {
    out: W,
    in_delta: bool,
}

impl EventPrinter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> EventPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            in_delta: false,
        }
    }

    /// Render one event. Write errors are ignored; a closed terminal must not end the run.
    pub fn print(&mut self, event: &AgentEvent) {
        let _ = self.render(event);
        let _ = self.out.flush();
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, event: &AgentEvent) -> io::Result<()> {
        match event {
            AgentEvent::TextDelta { text } => {
                self.in_delta = true;
                write!(self.out, "{}", text)
            }
            AgentEvent::ThinkingDelta { text } => {
                self.in_delta = true;
                write!(self.out, "{}", text.dimmed())
            }
            AgentEvent::ToolUse { name, input, .. } => {
                self.break_line()?;
                writeln!(self.out)?;
                writeln!(
                    self.out,
                    "{} {}",
                    format!("[{}]", name).cyan().bold(),
                    input
                )
            }
            AgentEvent::ToolResult { content, .. } => {
                self.break_line()?;
                let lines: Vec<&str> = content.lines().collect();
                for line in lines.iter().take(RESULT_PREVIEW_LINES) {
                    writeln!(self.out, "  {}", line.dimmed())?;
                }
                if lines.len() > RESULT_PREVIEW_LINES {
                    let hidden = format!("  … ({} more lines)", lines.len() - RESULT_PREVIEW_LINES);
                    writeln!(self.out, "{}", hidden.dimmed())?;
                }
                Ok(())
            }
            AgentEvent::Done => {
                self.break_line()?;
                writeln!(self.out)
            }
            AgentEvent::Error { message } => {
                self.break_line()?;
                writeln!(self.out, "{}", format!("[error] {}", message).red())
            }
        }
    }

    fn break_line(&mut self) -> io::Result<()> {
        if self.in_delta {
            self.in_delta = false;
            writeln!(self.out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(events: &[AgentEvent]) -> String {
        let mut printer = EventPrinter::new(Vec::new());
        for event in events {
            printer.print(event);
        }
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn test_deltas_print_inline() {
        let out = render(&[
            AgentEvent::TextDelta { text: "Hel".into() },
            AgentEvent::TextDelta { text: "lo".into() },
            AgentEvent::Done,
        ]);
        assert_eq!(out, "Hello\n\n");
    }

    #[test]
    fn test_tool_use_starts_new_line() {
        let out = render(&[
            AgentEvent::TextDelta { text: "Looking".into() },
            AgentEvent::ToolUse {
                id: "c".into(),
                name: "Read".into(),
                input: json!({"file_path": "a.rs"}),
            },
        ]);
        assert!(out.starts_with("Looking\n\n"));
        assert!(out.contains("[Read]"));
        assert!(out.contains(r#"{"file_path":"a.rs"}"#));
    }

    #[test]
    fn test_long_tool_result_is_collapsed() {
        let content = (1..=10).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let out = render(&[AgentEvent::ToolResult { tool_use_id: "c".into(), content }]);
        assert!(out.contains("line 4"));
        assert!(!out.contains("line 5"));
        assert!(out.contains("6 more lines"));
    }

    #[test]
    fn test_error_is_rendered() {
        let out = render(&[AgentEvent::Error { message: "boom".into() }]);
        assert!(out.contains("[error] boom"));
    }
}
