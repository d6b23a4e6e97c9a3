//! `process.spawn`: run the configured CLI with a hard wall-clock timeout.
//!
//! Output lines are streamed as `log` frames while the process runs. The
//! last [`TAIL_LINES`] lines of each stream are kept for the job result.
//! A prompt sent with a `session_id` is prefixed with the session's history.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use jobsync_core::config::ProcessConfig;
use jobsync_core::error::AppError;
use jobsync_core::types::SessionId;
use jobsync_entity::job::{EventLevel, JobKind};

use crate::context::JobContext;
use crate::executor::{JobExecutionError, JobHandler};
use crate::session::{SessionMessage, SessionRole, SessionStore, format_prompt};

/// Lines of each stream kept in the result.
pub const TAIL_LINES: usize = 50;

/// Shortest timeout a job may request.
const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long output readers may keep draining after the process is gone.
///
/// A grandchild that inherited the pipes keeps them open past the parent's
/// exit; the readers are aborted once this elapses.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

type Tail = Arc<Mutex<VecDeque<String>>>;

#[derive(Debug, Default, Deserialize)]
struct ProcessPayload {
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    stdin: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    session_id: Option<SessionId>,
}

impl ProcessPayload {
    /// Explicit args win; otherwise a prompt becomes `--print <prompt>`,
    /// rendered as a transcript when session history is given.
    fn resolve_args(&self, history: Option<&[SessionMessage]>) -> Vec<String> {
        match (&self.args, &self.prompt) {
            (Some(args), _) if !args.is_empty() => args.clone(),
            (_, Some(prompt)) if !prompt.trim().is_empty() => {
                let prompt = match history {
                    Some(history) => format_prompt(history, prompt),
                    None => prompt.clone(),
                };
                vec!["--print".to_string(), prompt]
            }
            _ => Vec::new(),
        }
    }

    /// The session to record this run in, when it has one and a prompt.
    fn session(&self) -> Option<(&SessionId, &str)> {
        match (&self.session_id, self.prompt.as_deref()) {
            (Some(id), Some(prompt)) if !prompt.trim().is_empty() => Some((id, prompt)),
            _ => None,
        }
    }
}

enum Exit {
    Finished(std::io::Result<ExitStatus>),
    TimedOut,
    Canceled,
}

/// Handler for `process.spawn` jobs.
#[derive(Debug, Clone)]
pub struct ProcessSpawnHandler {
    config: ProcessConfig,
    sessions: Arc<SessionStore>,
}

impl ProcessSpawnHandler {
    pub fn new(config: ProcessConfig, sessions: Arc<SessionStore>) -> Self {
        Self { config, sessions }
    }

    fn timeout_for(&self, requested_ms: Option<u64>) -> Duration {
        requested_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(self.config.default_timeout_seconds))
            .max(MIN_TIMEOUT)
    }
}

#[async_trait]
impl JobHandler for ProcessSpawnHandler {
    fn kind(&self) -> JobKind {
        JobKind::ProcessSpawn
    }

    async fn execute(&self, ctx: &JobContext) -> Result<Value, JobExecutionError> {
        let payload: ProcessPayload = ctx.payload_as()?;
        let session = payload.session();
        let history = session.map(|(id, _)| self.sessions.history(id));
        let args = payload.resolve_args(history.as_deref());
        if args.is_empty() {
            return Err(JobExecutionError::Permanent(
                "no args provided for process".into(),
            ));
        }

        let program = self.config.program.as_str();
        let timeout = self.timeout_for(payload.timeout_ms);
        let started = Instant::now();

        let mut child = Command::new(program)
            .args(&args)
            .stdin(if payload.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    JobExecutionError::Permanent(format!("{program} not found"))
                }
                _ => JobExecutionError::Internal(AppError::from(e)),
            })?;

        ctx.progress(0.05, Some("spawning")).await?;
        ctx.event(
            EventLevel::Info,
            "process started",
            Some(json!({ "program": program, "timeout_ms": timeout.as_millis() as u64 })),
        )
        .await?;

        if let (Some(input), Some(mut pipe)) = (payload.stdin.as_deref(), child.stdin.take()) {
            // A child that exits without reading stdin is not an error here.
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                tracing::debug!(job_id = %ctx.job.id, error = %e, "Failed to write process stdin");
            }
            drop(pipe);
        }

        let prefix = format!("{program}: ");
        let forward = self.config.output_lines;
        let stdout =
            OutputReader::spawn(child.stdout.take(), ctx, EventLevel::Info, &prefix, forward);
        let stderr =
            OutputReader::spawn(child.stderr.take(), ctx, EventLevel::Error, &prefix, forward);

        let exit = tokio::select! {
            _ = ctx.cancel.cancelled() => Exit::Canceled,
            waited = tokio::time::timeout(timeout, child.wait()) => match waited {
                Ok(status) => Exit::Finished(status),
                Err(_) => Exit::TimedOut,
            },
        };

        if matches!(exit, Exit::TimedOut | Exit::Canceled) {
            if let Err(e) = child.kill().await {
                tracing::warn!(job_id = %ctx.job.id, error = %e, "Failed to kill process");
            }
        }

        let (stdout_tail, stderr_tail) = tokio::join!(stdout.finish(), stderr.finish());
        let duration_ms = started.elapsed().as_millis() as u64;

        let status = match exit {
            Exit::Canceled => {
                return Err(JobExecutionError::Interrupted("interrupted by shutdown".into()));
            }
            Exit::TimedOut => {
                return Err(JobExecutionError::Detailed {
                    kind: "permanent",
                    message: "process timed out".into(),
                    details: json!({
                        "timeout_ms": timeout.as_millis() as u64,
                        "stdout_tail": stdout_tail,
                        "stderr_tail": stderr_tail,
                    }),
                });
            }
            Exit::Finished(status) => status.map_err(AppError::from)?,
        };

        let exit_code = status.code().unwrap_or(-1);
        if !status.success() {
            return Err(JobExecutionError::Detailed {
                kind: "permanent",
                message: format!("process exited with code {exit_code}"),
                details: json!({
                    "exit_code": exit_code,
                    "stdout_tail": stdout_tail,
                    "stderr_tail": stderr_tail,
                }),
            });
        }

        if let Some((id, prompt)) = session {
            self.sessions.append(id, SessionRole::User, prompt);
            self.sessions
                .append(id, SessionRole::Assistant, stdout_tail.join("\n").trim());
        }

        ctx.event(EventLevel::Info, "process finished", None).await?;
        Ok(json!({
            "exit_code": exit_code,
            "duration_ms": duration_ms,
            "stdout_tail": stdout_tail,
            "stderr_tail": stderr_tail,
        }))
    }
}

/// Background reader for one output stream and the tail it has seen so far.
struct OutputReader {
    task: Option<JoinHandle<()>>,
    tail: Tail,
}

impl OutputReader {
    fn spawn<R>(
        stream: Option<R>,
        ctx: &JobContext,
        level: EventLevel,
        prefix: &str,
        forward: usize,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail: Tail = Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_LINES)));
        let task = stream.map(|stream| {
            tokio::spawn(collect_lines(
                stream,
                ctx.clone(),
                level,
                prefix.to_string(),
                forward,
                Arc::clone(&tail),
            ))
        });
        Self { task, tail }
    }

    /// Wait up to [`DRAIN_GRACE`] for end of stream, then return the tail.
    async fn finish(self) -> Vec<String> {
        if let Some(mut task) = self.task {
            if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
                tracing::debug!("Process output still open after exit; abandoning reader");
                task.abort();
            }
        }
        self.tail.lock().await.iter().cloned().collect()
    }
}

/// Read a stream line by line, forwarding up to `forward` lines as log
/// frames and keeping the last [`TAIL_LINES`] in `tail`.
async fn collect_lines<R>(
    stream: R,
    ctx: JobContext,
    level: EventLevel,
    prefix: String,
    forward: usize,
    tail: Tail,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut seen = 0usize;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end().to_string();
                if seen < forward {
                    ctx.log(level, &format!("{prefix}{line}"), None);
                }
                seen += 1;
                let mut tail = tail.lock().await;
                if tail.len() == TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(job_id = %ctx.job.id, error = %e, "Stopped reading process output");
                break;
            }
        }
    }
}
