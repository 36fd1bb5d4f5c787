use anyhow::{Context, Result};
use codex_memory::config::Config;
use codex_memory::history::HistoryLog;

/// Print the most recent `limit` turns, oldest of them first.
pub fn history(config: &Config, limit: usize) -> Result<()> {
    let path = config.resolved_history_path();
    if !path.exists() {
        println!("No history at {}.", path.display());
        return Ok(());
    }

    let log = HistoryLog::open(&path)
        .with_context(|| format!("failed to open history at {}", path.display()))?;
    let mut records = log.recent(limit)?;
    records.reverse();

    if records.is_empty() {
        println!("History is empty.");
        return Ok(());
    }

    for record in &records {
        println!(
            "#{} {} ({} tokens)",
            record.seq,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.token_count
        );
        println!("You> {}", record.prompt.trim());
        println!("Assistant:\n{}", record.response.trim());
        println!();
    }

    log.close()?;
    Ok(())
}
