use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use codex_memory::backend::CodexCli;
use codex_memory::config::Config;
use codex_memory::context::ContextManager;
use codex_memory::history::HistoryLog;
use codex_memory::session::Session;
use tokio::io::BufReader;

/// Run the interactive REPL on stdin/stdout and map its outcome to an exit code.
pub async fn repl(config: &Config) -> Result<ExitCode> {
    let context = ContextManager::from_config(config).context("failed to open memory")?;

    // history is best-effort: a broken log never blocks the REPL
    let history = if config.history.enable {
        let path = config.resolved_history_path();
        match HistoryLog::open(&path) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "history disabled");
                None
            }
        }
    } else {
        None
    };

    let backend = Arc::new(CodexCli::from_config(&config.codex));
    let span = tracing::info_span!("session", id = %uuid::Uuid::now_v7());
    let mut session = Session::new(context, backend, history, span);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let outcome = session.run(stdin, &mut stdout).await;

    if let Err(e) = session.close() {
        tracing::warn!(error = %e, "error while closing session");
    }

    let outcome = outcome.context("terminal I/O failed")?;
    Ok(ExitCode::from(outcome.exit_code()))
}
