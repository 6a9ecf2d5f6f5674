//! Formatting of bot replies for a line-oriented chat transport.

use async_trait::async_trait;

use shipyard_engine::BuildEvent;
use shipyard_engine::branch::BranchMatch;
use shipyard_engine::process::OutputStream;

/// Longest line handed to the transport.
pub const MAX_LINE_LEN: usize = 400;

/// Where the bot's replies go.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_line(&self, line: &str) -> anyhow::Result<()>;
}

/// Prints replies to stdout.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink;

#[async_trait]
impl ChatSink for ConsoleSink {
    async fn send_line(&self, line: &str) -> anyhow::Result<()> {
        println!("{line}");
        Ok(())
    }
}

/// Speaker shown in front of each reply.
#[derive(Debug, Clone)]
pub struct AgentId {
    pub role: String,
}

impl AgentId {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

/// Post a message with the agent prefix, split over as many lines as needed.
pub async fn say(sink: &dyn ChatSink, agent: &AgentId, text: &str) -> anyhow::Result<()> {
    for line in wrap_lines(text, MAX_LINE_LEN) {
        sink.send_line(&format!("[{}] {}", agent.role, line)).await?;
    }
    Ok(())
}

/// Post a one-line status update.
pub async fn status(
    sink: &dyn ChatSink,
    agent: &AgentId,
    emoji: &str,
    text: &str,
) -> anyhow::Result<()> {
    say(sink, agent, &format!("{emoji} {text}")).await
}

pub async fn error(sink: &dyn ChatSink, agent: &AgentId, text: &str) -> anyhow::Result<()> {
    status(sink, agent, "❌", text).await
}

/// Chat rendering of a progress event. Blank output lines are dropped.
pub fn event_line(event: &BuildEvent) -> Option<String> {
    match event {
        BuildEvent::VersionResolved { platform, version } => {
            Some(format!("🔢 Next {platform} version: {version}"))
        }
        BuildEvent::ScriptWritten { path } => Some(format!("📝 Wrote {}", path.display())),
        BuildEvent::BranchResolved { requested, matched } => match matched {
            BranchMatch::Exact(name) => Some(format!("🌿 Using branch {name}")),
            BranchMatch::Fuzzy(name) => Some(format!("🌿 '{requested}' → {name}")),
            BranchMatch::Ambiguous(_) | BranchMatch::NotFound => None,
        },
        BuildEvent::BranchSwitched { branch, message } => {
            if message.trim().is_empty() {
                Some(format!("🔀 Switched to {branch}"))
            } else {
                Some(format!("🔀 Switched to {branch}: {}", message.trim()))
            }
        }
        BuildEvent::Executing { command } => Some(format!("🔨 Running `{command}`")),
        BuildEvent::Output(output) => {
            if output.line.trim().is_empty() {
                return None;
            }
            Some(match output.stream {
                OutputStream::Stdout => format!("  {}", output.line),
                OutputStream::Stderr => format!("  ! {}", output.line),
            })
        }
    }
}

/// Wrap text into lines of at most `max_len` bytes, breaking on word boundaries.
/// A single word longer than `max_len` is kept whole.
pub fn wrap_lines(text: &str, max_len: usize) -> Vec<String> {
    let mut result = Vec::new();
    for line in text.lines() {
        if line.len() <= max_len {
            result.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            if !current.is_empty() && current.len() + word.len() + 1 > max_len {
                result.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            result.push(current);
        }
    }
    if result.is_empty() {
        result.push(String::new());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use recording::RecordingSink;
    use shipyard_engine::process::OutputLine;

    mod recording {
        use super::super::ChatSink;
        use async_trait::async_trait;
        use std::sync::Mutex;

        /// Collects every line sent to it.
        #[derive(Default)]
        pub struct RecordingSink {
            pub lines: Mutex<Vec<String>>,
        }

        impl RecordingSink {
            pub fn lines(&self) -> Vec<String> {
                self.lines.lock().unwrap().clone()
            }
        }

        #[async_trait]
        impl ChatSink for RecordingSink {
            async fn send_line(&self, line: &str) -> anyhow::Result<()> {
                self.lines.lock().unwrap().push(line.to_string());
                Ok(())
            }
        }
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap_lines("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
    }

    #[test]
    fn short_lines_untouched() {
        assert_eq!(wrap_lines("a\nb", 400), vec!["a", "b"]);
        assert_eq!(wrap_lines("", 400), vec![""]);
    }

    #[tokio::test]
    async fn say_prefixes_every_line() {
        let sink = RecordingSink::default();
        say(&sink, &AgentId::new("builder"), "first\nsecond").await.unwrap();
        assert_eq!(sink.lines(), vec!["[builder] first", "[builder] second"]);
    }

    #[tokio::test]
    async fn error_uses_cross() {
        let sink = RecordingSink::default();
        error(&sink, &AgentId::new("system"), "boom").await.unwrap();
        assert_eq!(sink.lines(), vec!["[system] ❌ boom"]);
    }

    #[test]
    fn renders_events() {
        let fuzzy = BuildEvent::BranchResolved {
            requested: "dark mode".into(),
            matched: BranchMatch::Fuzzy("feature/dark_mode".into()),
        };
        assert_eq!(event_line(&fuzzy).unwrap(), "🌿 'dark mode' → feature/dark_mode");

        let stderr = BuildEvent::Output(OutputLine {
            stream: OutputStream::Stderr,
            line: "warning: deprecated".into(),
        });
        assert_eq!(event_line(&stderr).unwrap(), "  ! warning: deprecated");

        let blank = BuildEvent::Output(OutputLine {
            stream: OutputStream::Stdout,
            line: "   ".into(),
        });
        assert!(event_line(&blank).is_none());
    }
}
