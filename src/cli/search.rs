use anyhow::{Context, Result};
use codex_memory::config::Config;
use codex_memory::context::ContextManager;

const PREVIEW_CHARS: usize = 120;

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

/// Print the stored exchanges nearest to `query`, as the REPL would retrieve them.
pub async fn search(config: &Config, query: &str) -> Result<()> {
    let context = ContextManager::from_config(config).context("failed to open memory")?;
    let hits = context.retrieve_scored(query).await?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s) in `{}`\n", hits.len(), config.table);
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {}. {} (distance: {:.4}, {})",
            i + 1,
            hit.entry.id,
            hit.distance,
            hit.entry.timestamp.format("%Y-%m-%d %H:%M"),
        );
        println!("     User:      {}", preview(&hit.entry.prompt));
        println!("     Assistant: {}", preview(&hit.entry.response));
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_truncates_on_char_boundaries() {
        assert_eq!(preview("a\n\nb   c"), "a b c");
        let long = "é".repeat(200);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
    }
}
