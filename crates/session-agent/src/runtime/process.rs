use std::{process::Stdio, time::Duration};

use contracts::session_agent::{ReplRequest, ReplResponse, Runtime};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin},
    sync::Mutex,
};
use tracing::warn;

use super::repl::{NODE_REPL_SCRIPT, PYTHON_REPL_SCRIPT};

/// How long a step waits for the interpreter to write its response line
/// before the session is declared unhealthy.
const STEP_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn interpreter: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("interpreter stdin/stdout unavailable")]
    MissingPipes,
    #[error("write to interpreter failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("interpreter closed its output without a response")]
    Closed,
    #[error("failed to read interpreter response: {0}")]
    Read(#[source] std::io::Error),
    #[error("interpreter response was not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("interpreter did not respond within {0:?}")]
    Timeout(Duration),
}

impl ProcessError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout(_))
    }
}

/// A single persistent interpreter child process, one per registered
/// session. All step execution against this process must go through
/// `run_step`, which holds `stdin`/`stdout` behind a mutex so steps are
/// strictly serialized.
pub struct SessionProcess {
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<tokio::process::ChildStdout>>,
}

impl SessionProcess {
    pub fn spawn(runtime: Runtime, workspace_dir: &str) -> Result<Self, ProcessError> {
        let mut command = match runtime {
            Runtime::Python => {
                let mut cmd = tokio::process::Command::new("python3");
                cmd.arg("-u").arg("-c").arg(PYTHON_REPL_SCRIPT);
                cmd
            }
            Runtime::Node => {
                let mut cmd = tokio::process::Command::new("node");
                cmd.arg("-e").arg(NODE_REPL_SCRIPT);
                cmd
            }
        };

        command
            .current_dir(workspace_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(ProcessError::Spawn)?;
        let stdin = child.stdin.take().ok_or(ProcessError::MissingPipes)?;
        let stdout = child.stdout.take().ok_or(ProcessError::MissingPipes)?;

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
        })
    }

    /// Write one request line and read exactly one response line. Guarded
    /// by both mutexes so two steps on the same session can never interleave
    /// their writes or reads.
    pub async fn run_step(&self, code: &str) -> Result<ReplResponse, ProcessError> {
        let mut stdin = self.stdin.lock().await;
        let mut stdout = self.stdout.lock().await;

        let request = ReplRequest {
            code: code.to_string(),
        };
        let mut line = serde_json::to_string(&request).map_err(ProcessError::Decode)?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(ProcessError::Write)?;
        stdin.flush().await.map_err(ProcessError::Write)?;

        let mut response_line = String::new();
        let bytes_read = tokio::time::timeout(STEP_READ_TIMEOUT, stdout.read_line(&mut response_line))
            .await
            .map_err(|_| ProcessError::Timeout(STEP_READ_TIMEOUT))?
            .map_err(ProcessError::Read)?;
        if bytes_read == 0 {
            return Err(ProcessError::Closed);
        }

        serde_json::from_str(response_line.trim_end()).map_err(ProcessError::Decode)
    }

    pub async fn close(&self) {
        {
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        let mut child = self.child.lock().await;
        if let Err(err) = child.kill().await {
            warn!(error = %err, "failed to kill interpreter process during close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn python_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let process = SessionProcess::spawn(Runtime::Python, dir.path().to_str().unwrap())
            .expect("spawn python");
        let resp = process.run_step("print('hi')").await.expect("run step");
        assert_eq!(resp.stdout, "hi\n");
        assert!(resp.error.is_empty());
        process.close().await;
    }

    #[tokio::test]
    async fn python_state_persists_across_steps() {
        let dir = tempfile::tempdir().unwrap();
        let process = SessionProcess::spawn(Runtime::Python, dir.path().to_str().unwrap())
            .expect("spawn python");
        process.run_step("x = 41").await.expect("run step");
        let resp = process
            .run_step("print(x + 1)")
            .await
            .expect("run step");
        assert_eq!(resp.stdout.trim(), "42");
        process.close().await;
    }
}
