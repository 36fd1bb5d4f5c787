//! Generation backends: anything that turns an assembled prompt into a reply.
//!
//! The REPL talks to [`GenerationBackend`]; [`CodexCli`] is the production
//! implementation and runs `codex exec` as a subprocess.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::config::CodexConfig;
use crate::error::{Error, Result};

pub const DEFAULT_BINARY: &str = "codex";

/// What a backend produced for one prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOutput {
    /// Exit status, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl BackendOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Non-success status and nothing usable on stdout.
    pub fn is_fatal(&self) -> bool {
        !self.success() && self.stdout.trim().is_empty()
    }
}

#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Generate a reply for `prompt`.
    ///
    /// `Err` means the backend could not be invoked at all. A backend that ran
    /// and failed reports it through [`BackendOutput::status`].
    async fn generate(&self, prompt: &str) -> Result<BackendOutput>;
}

/// Runs `<binary> exec <args...> <prompt>`.
#[derive(Debug, Clone)]
pub struct CodexCli {
    binary: String,
    args: Vec<String>,
}

impl CodexCli {
    pub fn new(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
        }
    }

    pub fn from_config(config: &CodexConfig) -> Self {
        Self::new(
            config
                .binary
                .clone()
                .unwrap_or_else(|| DEFAULT_BINARY.to_string()),
            config.args.clone(),
        )
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command_args<'a>(&'a self, prompt: &'a str) -> Vec<&'a str> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push("exec");
        argv.extend(self.args.iter().map(String::as_str));
        argv.push(prompt);
        argv
    }
}

#[async_trait::async_trait]
impl GenerationBackend for CodexCli {
    fn name(&self) -> &str {
        "codex"
    }

    async fn generate(&self, prompt: &str) -> Result<BackendOutput> {
        debug!(
            binary = %self.binary,
            args = ?self.args,
            prompt_chars = prompt.len(),
            "invoking codex"
        );

        let output = Command::new(&self.binary)
            .args(self.command_args(prompt))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::Backend(format!(
                    "`{}` not found on PATH; install it or set codex.binary / CODEX_MEMORY_CODEX_BIN",
                    self.binary
                )),
                _ => Error::Backend(format!("failed to run `{}`: {e}", self.binary)),
            })?;

        Ok(BackendOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
