use anyhow::Result;
use codex_memory::config::Config;
use codex_memory::history::HistoryLog;
use codex_memory::memory::store;

/// Display collection and history statistics in the terminal.
///
/// Opens the database directly, so it works before any embedding model is
/// available.
pub fn stats(config: &Config) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = codex_memory::db::open_database(&db_path)?;
    let health = codex_memory::db::check_database_health(&conn)?;
    let collections = store::list_collections(&conn)?;

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Database:            {}", db_path.display());
    println!("  Schema version:      {}", health.schema_version);
    println!("  sqlite-vec:          {}", health.sqlite_vec_version);
    if health.integrity_ok {
        println!("  Integrity:           ok");
    } else {
        println!("  Integrity:           FAILED ({})", health.integrity_details);
    }
    if let Ok(meta) = std::fs::metadata(&db_path) {
        println!("  Size:                {} bytes", meta.len());
    }
    println!();

    if collections.is_empty() {
        println!("No collections yet.");
    }
    for info in &collections {
        let marker = if info.name == config.table { " (active)" } else { "" };
        println!("Collection `{}`{marker}", info.name);
        println!("  Entries:             {}", info.entry_count);
        println!("  Dimension:           {}", info.dimension);
        println!("  Metric:              {}", info.metric);
        println!(
            "  Embedding model:     {}",
            info.embedding_model.as_deref().unwrap_or("unknown")
        );
        println!("  Created:             {}", info.created_at);
        println!();
    }

    let history_path = config.resolved_history_path();
    if !config.history.enable {
        println!("History:               disabled");
    } else if history_path.exists() {
        let log = HistoryLog::open(&history_path)?;
        println!("History turns:         {}", log.count()?);
        log.close()?;
    } else {
        println!("History:               none yet");
    }

    Ok(())
}
