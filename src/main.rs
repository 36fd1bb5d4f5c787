mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codex_memory::config::Config;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

#[derive(Parser)]
#[command(
    name = "codex-memory",
    version,
    about = "Codex REPL with retrieval-augmented memory of past exchanges"
)]
struct Cli {
    /// Config file (default: ~/.codex-memory/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the interactive REPL (default)
    Repl,
    /// Show the stored exchanges most similar to a query
    Search {
        query: String,
    },
    /// Print the most recent turns from the history log
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show collection and history statistics
    Stats,
    /// Manage the local embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the ONNX model and tokenizer into the cache directory
    Download,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Log to stderr so stdout stays clean for the REPL. The subscriber is up
    // before the config loads; the configured level is applied afterwards.
    let startup_level = std::env::var("CODEX_MEMORY_LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let (subscriber, log_filter) = subscriber(parse_filter(&startup_level), std::io::stderr);
    subscriber.init();

    let config = Config::load(cli.config.as_deref())?;
    log_filter
        .reload(parse_filter(&config.log_level))
        .context("failed to apply configured log level")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result = runtime.block_on(run(cli.command.unwrap_or(Command::Repl), &config));
    // a pending stdin read sits on a blocking thread and never finishes on its own
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

fn parse_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// fmt subscriber writing to `writer`, with a filter that can be swapped later.
fn subscriber<W>(
    filter: EnvFilter,
    writer: W,
) -> (impl Subscriber + Send + Sync, reload::Handle<EnvFilter, Registry>)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer));
    (subscriber, handle)
}

async fn run(command: Command, config: &Config) -> Result<ExitCode> {
    match command {
        Command::Repl => return cli::repl::repl(config).await,
        Command::Search { query } => cli::search::search(config, &query).await?,
        Command::History { limit } => cli::history::history(config, limit)?,
        Command::Stats => cli::stats::stats(config)?,
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embeddings).await?,
        },
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn config_load_is_logged_and_level_applies_after() {
        let dir = tempfile::tempdir().unwrap();
        let captured = Captured::default();
        let (subscriber, handle) = subscriber(parse_filter("info"), captured.clone());

        tracing::subscriber::with_default(subscriber, || {
            Config::load_from(dir.path().join("absent.toml")).unwrap();
            handle.reload(parse_filter("warn")).unwrap();
            tracing::info!("suppressed after reload");
        });

        let logged = captured.text();
        assert!(logged.contains("no config file at"), "{logged}");
        assert!(!logged.contains("suppressed after reload"), "{logged}");
    }
}
