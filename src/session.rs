//! The interactive retrieve → generate → remember loop.
//!
//! One [`Session`] owns the context manager, the generation backend and the
//! optional history log for the lifetime of a REPL. Turns run strictly one
//! after another:
//!
//! 1. read a line (blank lines re-prompt, `:q`/`:quit`/`:exit` or EOF end the session)
//! 2. retrieve similar past exchanges; failures degrade to no context
//! 3. build the prompt and run the backend; a backend that cannot run, or
//!    exits unsuccessfully with no output, ends the session with [`SessionOutcome::BackendFailed`]
//! 4. print the reply, then remember it and append it to the history log;
//!    failures here are logged and the loop goes on
//!
//! Ctrl-C at any await point (input, retrieval, generation, remembering)
//! ends the session normally. An interrupt while remembering leaves the
//! already shown exchange unstored and out of the history log.

use std::borrow::Cow;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::backend::{BackendOutput, GenerationBackend};
use crate::context::ContextManager;
use crate::error::{Error, Result};
use crate::history::HistoryLog;
use crate::memory::types::token_count;
use crate::prompt::build_prompt;

pub const QUIT_TOKENS: &[&str] = &[":q", ":quit", ":exit"];

const BANNER: &str = "Codex REPL with memory. Type :q to quit.";
const INPUT_PROMPT: &str = "You> ";

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Quit token, end of input or interrupt.
    Closed,
    /// The generation backend could not produce a reply.
    BackendFailed,
}

impl SessionOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            SessionOutcome::Closed => 0,
            SessionOutcome::BackendFailed => 2,
        }
    }
}

pub struct Session {
    context: ContextManager,
    backend: Arc<dyn GenerationBackend>,
    history: Option<Arc<HistoryLog>>,
    span: Span,
}

impl Session {
    pub fn new(
        context: ContextManager,
        backend: Arc<dyn GenerationBackend>,
        history: Option<HistoryLog>,
        span: Span,
    ) -> Self {
        Self {
            context,
            backend,
            history: history.map(Arc::new),
            span,
        }
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn history(&self) -> Option<&HistoryLog> {
        self.history.as_deref()
    }

    /// Run until the user quits, input ends, Ctrl-C, or the backend fails.
    ///
    /// Only terminal I/O errors are returned; everything else is folded into
    /// the outcome or logged.
    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> std::io::Result<SessionOutcome>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(input, output, interrupt).await
    }

    /// Like [`Session::run`] with a caller-supplied interrupt signal.
    pub async fn run_until<R, W, F>(
        &mut self,
        input: R,
        output: &mut W,
        interrupt: F,
    ) -> std::io::Result<SessionOutcome>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
        F: Future<Output = ()>,
    {
        let span = self.span.clone();
        self.event_loop(input, output, interrupt)
            .instrument(span)
            .await
    }

    async fn event_loop<R, W, F>(
        &mut self,
        mut input: R,
        output: &mut W,
        interrupt: F,
    ) -> std::io::Result<SessionOutcome>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        info!(backend = self.backend.name(), "session started");
        writeln!(output, "{BANNER}")?;

        let mut buf = Vec::new();
        let outcome = loop {
            write!(output, "{INPUT_PROMPT}")?;
            output.flush()?;

            buf.clear();
            let read = tokio::select! {
                read = input.read_until(b'\n', &mut buf) => read?,
                _ = interrupt.as_mut() => {
                    writeln!(output, "\nGoodbye!")?;
                    break SessionOutcome::Closed;
                }
            };
            if read == 0 {
                writeln!(output)?;
                break SessionOutcome::Closed;
            }

            let line = String::from_utf8_lossy(&buf);
            if let Cow::Owned(_) = line {
                warn!("input is not valid UTF-8, invalid bytes replaced");
            }
            let user_text = line.trim_end_matches(['\n', '\r']);
            if user_text.trim().is_empty() {
                continue;
            }
            if QUIT_TOKENS.contains(&user_text.trim()) {
                break SessionOutcome::Closed;
            }

            if let Some(outcome) = self.turn(user_text, output, interrupt.as_mut()).await? {
                break outcome;
            }
        };

        info!(outcome = ?outcome, "session ended");
        Ok(outcome)
    }

    /// One full turn. `Some` ends the session.
    async fn turn<W, F>(
        &self,
        user_text: &str,
        output: &mut W,
        mut interrupt: Pin<&mut F>,
    ) -> std::io::Result<Option<SessionOutcome>>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let retrieved = tokio::select! {
            retrieved = self.context.retrieve(user_text) => retrieved,
            _ = interrupt.as_mut() => {
                writeln!(output, "\nGoodbye!")?;
                return Ok(Some(SessionOutcome::Closed));
            }
        };
        let context = retrieved.unwrap_or_else(|e| {
            warn!(error = %e, "retrieval failed, continuing without context");
            Vec::new()
        });
        debug!(context = context.len(), "prompt assembled");
        let prompt = build_prompt(user_text, &context);

        let generated = tokio::select! {
            generated = self.backend.generate(&prompt) => generated,
            _ = interrupt.as_mut() => {
                writeln!(output, "\nGoodbye!")?;
                return Ok(Some(SessionOutcome::Closed));
            }
        };

        let reply = match generated {
            Ok(reply) if !reply.is_fatal() => reply,
            Ok(reply) => {
                error!(status = ?reply.status, stderr = %reply.stderr.trim(), "backend produced no reply");
                writeln!(output, "Codex CLI error: {}", describe_failure(&reply))?;
                return Ok(Some(SessionOutcome::BackendFailed));
            }
            Err(e) => {
                error!(error = %e, "backend unavailable");
                writeln!(output, "Codex CLI error: {e}")?;
                return Ok(Some(SessionOutcome::BackendFailed));
            }
        };

        if !reply.stderr.trim().is_empty() {
            warn!(stderr = %reply.stderr.trim(), "codex stderr");
        }
        if !reply.success() {
            warn!(status = ?reply.status, "backend exited unsuccessfully, using its output");
        }

        writeln!(output, "Assistant:\n{}\n", reply.stdout.trim())?;
        output.flush()?;

        let response = reply.stdout.as_str();
        let remembered = tokio::select! {
            remembered = self.context.remember(user_text, response, &[]) => remembered,
            _ = interrupt.as_mut() => {
                info!("interrupted while remembering, exchange not stored");
                writeln!(output, "\nGoodbye!")?;
                return Ok(Some(SessionOutcome::Closed));
            }
        };
        if let Err(e) = remembered {
            error!(error = %e, "failed to store memory");
        }

        if let Some(history) = &self.history {
            match append_history(Arc::clone(history), user_text, response).await {
                Ok(seq) => debug!(seq, "history appended"),
                Err(e) => error!(error = %e, "failed to append history"),
            }
        }

        Ok(None)
    }

    /// Close the history log and, if nothing else holds it, the memory store.
    pub fn close(self) -> Result<()> {
        let Session {
            context, history, ..
        } = self;

        let history_closed = match history.map(Arc::try_unwrap) {
            Some(Ok(log)) => log.close(),
            _ => Ok(()),
        };
        let store_closed = match Arc::try_unwrap(context.into_store()) {
            Ok(store) => store.close(),
            Err(_) => Ok(()),
        };
        history_closed.and(store_closed)
    }
}

/// Append one turn on the blocking pool.
async fn append_history(history: Arc<HistoryLog>, prompt: &str, response: &str) -> Result<i64> {
    let tokens = token_count(prompt, response);
    let (prompt, response) = (prompt.to_string(), response.to_string());
    tokio::task::spawn_blocking(move || history.append(&prompt, &response, &[], tokens))
        .await
        .map_err(|e| Error::History(format!("history task failed: {e}")))?
}

fn describe_failure(reply: &BackendOutput) -> String {
    let status = reply
        .status
        .map_or_else(|| "killed by signal".to_string(), |code| format!("exit status {code}"));
    match reply.stderr.trim() {
        "" => status,
        stderr => format!("{status}: {stderr}"),
    }
}
