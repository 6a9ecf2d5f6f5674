//! External process and file primitives used by the orchestrator.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{EngineError, Result};

/// Lines of stderr kept for the failure report.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

/// Final state of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Last lines written to stderr.
    pub stderr_tail: String,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` in `working_dir`, sending each output line as it arrives.
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        output: mpsc::UnboundedSender<OutputLine>,
    ) -> Result<ProcessOutcome>;
}

/// Runs commands through `sh -c`.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        working_dir: &Path,
        output: mpsc::UnboundedSender<OutputLine>,
    ) -> Result<ProcessOutcome> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("stderr not captured")))?;

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let (out, err) = tokio::join!(
            forward_lines(stdout, OutputStream::Stdout, &output, |_| {}),
            forward_lines(stderr, OutputStream::Stderr, &output, |line| {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.to_string());
            }),
        );
        out?;
        err?;

        let status = child.wait().await?;
        Ok(ProcessOutcome {
            success: status.success(),
            exit_code: status.code(),
            stderr_tail: Vec::from(tail).join("\n"),
        })
    }
}

/// Send every line of `reader` until EOF. Bytes that are not UTF-8 are
/// replaced, never treated as a read failure.
async fn forward_lines<R: AsyncRead + Unpin>(
    reader: R,
    stream: OutputStream,
    output: &mpsc::UnboundedSender<OutputLine>,
    mut on_line: impl FnMut(&str),
) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = decode_line(&buf);
        on_line(&line);
        let _ = output.send(OutputLine { stream, line });
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Replace the file's contents, creating parent directories as needed.
pub async fn overwrite_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(command: &str) -> (ProcessOutcome, Vec<OutputLine>) {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = ShellRunner.run(command, dir.path(), tx).await.unwrap();
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        (outcome, lines)
    }

    #[tokio::test]
    async fn streams_stdout_and_stderr_lines() {
        let (outcome, lines) = run("echo one; echo two >&2; echo three").await;
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));

        let stdout: Vec<&str> = lines
            .iter()
            .filter(|l| l.stream == OutputStream::Stdout)
            .map(|l| l.line.as_str())
            .collect();
        assert_eq!(stdout, vec!["one", "three"]);
        assert!(lines.contains(&OutputLine {
            stream: OutputStream::Stderr,
            line: "two".into()
        }));
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_stderr_tail() {
        let (outcome, _) = run("echo boom >&2; exit 3").await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr_tail, "boom");
    }

    #[tokio::test]
    async fn invalid_utf8_output_is_decoded_lossily() {
        let (outcome, lines) =
            run("printf 'caf\\351\\n'; printf 'bad \\377\\n' >&2; echo done; exit 0").await;
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(lines.contains(&OutputLine {
            stream: OutputStream::Stdout,
            line: "caf\u{FFFD}".into()
        }));
        assert!(lines.contains(&OutputLine {
            stream: OutputStream::Stdout,
            line: "done".into()
        }));
        assert_eq!(outcome.stderr_tail, "bad \u{FFFD}");
    }

    #[tokio::test]
    async fn stderr_tail_keeps_only_the_last_lines() {
        let (outcome, lines) =
            run("i=1; while [ $i -le 50 ]; do echo \"line $i\" >&2; i=$((i+1)); done").await;
        assert!(outcome.success);
        assert_eq!(lines.len(), 50);
        let tail: Vec<&str> = outcome.stderr_tail.lines().collect();
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.first(), Some(&"line 31"));
        assert_eq!(tail.last(), Some(&"line 50"));
    }

    #[test]
    fn decode_line_strips_crlf() {
        assert_eq!(decode_line(b"gradle ok\r\n"), "gradle ok");
        assert_eq!(decode_line(b"no newline"), "no newline");
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        ShellRunner.run("cat marker.txt", dir.path(), tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().line, "here");
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripts/build.sh");
        overwrite_file(&path, "first").await.unwrap();
        overwrite_file(&path, "second").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }
}
