//! Backend commands run as child processes under a deadline.
//!
//! A [`ScopedChild`] is killed and reaped on every way out of a call:
//! natural end of output, deadline, early match, or the future being
//! dropped (`kill_on_drop`).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Split};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::{timeout_at, Instant};

pub struct ScopedChild {
    child: Child,
    label: String,
}

impl ScopedChild {
    /// Spawn `program` with stdout piped, returning the child and a line
    /// reader over its output.
    pub fn spawn(program: &Path, args: &[&str]) -> std::io::Result<(Self, Split<BufReader<ChildStdout>>)> {
        let label = format!("{} {}", program.display(), args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "child stdout was not captured")
        })?;
        tracing::debug!("Spawned {}", label);

        Ok((Self { child, label }, BufReader::new(stdout).split(b'\n')))
    }

    /// Kill the child if it is still running and wait for it to exit.
    pub async fn terminate(mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!("{} exited with {}", self.label, status);
                return;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to poll {}: {}", self.label, e),
        }

        if let Err(e) = self.child.start_kill() {
            tracing::warn!("Failed to kill {}: {}", self.label, e);
        }
        if let Err(e) = self.child.wait().await {
            tracing::warn!("Failed to reap {}: {}", self.label, e);
        }
    }
}

enum Step {
    Line(String),
    Done,
}

async fn next_line(lines: &mut Split<BufReader<ChildStdout>>, deadline: Instant, label: &str) -> Step {
    match timeout_at(deadline, lines.next_segment()).await {
        Ok(Ok(Some(bytes))) => {
            let line = String::from_utf8_lossy(&bytes);
            Step::Line(line.trim_end_matches('\r').to_string())
        }
        Ok(Ok(None)) => Step::Done,
        Ok(Err(e)) => {
            tracing::warn!("Failed to read output of {}: {}", label, e);
            Step::Done
        }
        Err(_) => {
            tracing::debug!("Deadline reached for {}", label);
            Step::Done
        }
    }
}

/// Collect every output line until the process ends or `timeout` elapses.
/// Reaching the deadline is normal; whatever was read is returned.
pub async fn collect_lines(program: &Path, args: &[&str], timeout: Duration) -> Vec<String> {
    let deadline = Instant::now() + timeout;
    let (child, mut lines) = match ScopedChild::spawn(program, args) {
        Ok(spawned) => spawned,
        Err(e) => {
            tracing::error!("Failed to run {}: {}", program.display(), e);
            return Vec::new();
        }
    };

    let mut output = Vec::new();
    while let Step::Line(line) = next_line(&mut lines, deadline, &child.label).await {
        output.push(line);
    }

    child.terminate().await;
    tracing::debug!("Collected {} lines from {}", output.len(), program.display());
    output
}

/// Return the first output line containing `needle`, stopping the process
/// as soon as it is seen.
pub async fn first_line_containing(
    program: &Path,
    args: &[&str],
    needle: &str,
    timeout: Duration,
) -> Option<String> {
    let deadline = Instant::now() + timeout;
    let (child, mut lines) = match ScopedChild::spawn(program, args) {
        Ok(spawned) => spawned,
        Err(e) => {
            tracing::error!("Failed to run {}: {}", program.display(), e);
            return None;
        }
    };

    let mut found = None;
    while let Step::Line(line) = next_line(&mut lines, deadline, &child.label).await {
        if line.contains(needle) {
            found = Some(line);
            break;
        }
    }

    child.terminate().await;
    found
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    #[tokio::test]
    async fn test_collects_until_exit() {
        let lines = collect_lines(&sh(), &["-c", "printf 'one\\ntwo\\r\\nthree'"], Duration::from_secs(5)).await;
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_deadline_returns_partial_output() {
        let started = std::time::Instant::now();
        let lines = collect_lines(&sh(), &["-c", "echo first; sleep 10; echo never"], Duration::from_millis(300)).await;

        assert_eq!(lines, vec!["first"]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_first_match_exits_early() {
        let started = std::time::Instant::now();
        let line = first_line_containing(
            &sh(),
            &["-c", "echo header; echo 'host.local. 10.0.0.2'; sleep 10"],
            "host.local",
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(line.as_deref(), Some("host.local. 10.0.0.2"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_no_match_before_deadline() {
        let line = first_line_containing(&sh(), &["-c", "echo other; sleep 10"], "host.local", Duration::from_millis(200)).await;
        assert!(line.is_none());
    }

    #[tokio::test]
    async fn test_missing_program_is_empty() {
        let missing = PathBuf::from("/nonexistent/zeroconf-backend");
        assert!(collect_lines(&missing, &[], Duration::from_secs(1)).await.is_empty());
        assert!(first_line_containing(&missing, &[], "x", Duration::from_secs(1)).await.is_none());
    }
}
