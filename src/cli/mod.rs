pub mod history;
pub mod repl;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use codex_memory::config::EmbeddingConfig;
use codex_memory::embedding::local::{self, DEFAULT_MODEL};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

const HF_BASE: &str = "https://huggingface.co";

/// Hugging Face URL of `file` for `model`. Bare names resolve under `sentence-transformers/`.
fn model_file_url(model: &str, file: &str) -> String {
    let repo = if model.contains('/') {
        model.to_string()
    } else {
        format!("sentence-transformers/{model}")
    };
    format!("{HF_BASE}/{repo}/resolve/main/{file}")
}

/// Download the ONNX embedding model and tokenizer into the model directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    let dir = local::model_dir(config);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create model dir: {}", dir.display()))?;

    let files = [
        ("model.onnx", "onnx/model.onnx"),
        ("tokenizer.json", "tokenizer.json"),
    ];
    for (name, remote) in files {
        let dest = dir.join(name);
        if dest.exists() {
            println!("{name} already exists at {}", dest.display());
            continue;
        }
        println!("Downloading {name} for {model}...");
        download_file(&model_file_url(model, remote), &dest).await?;
        println!("Saved to {}", dest.display());
    }

    println!("Model download complete. Ready for use.");
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download of {url} failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
