//! `stance cache` commands - Inspect and clear cached analyses

use super::cache_at_default_path;
use anyhow::Result;

/// Show recently cached analyses
pub async fn list(last: u32) -> Result<()> {
    let cache = cache_at_default_path().await?;
    let entries = cache.recent(last).await?;

    if entries.is_empty() {
        println!("📭 No cached analyses yet.");
        return Ok(());
    }

    println!(
        "{:<12} {:<16} {:>7}  {:<18}  TITLE",
        "TID", "CACHED", "CHUNKS", "MODEL"
    );
    println!("{}", "─".repeat(80));

    for entry in &entries {
        let time = chrono::DateTime::parse_from_rfc3339(&entry.created_at)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| "???".to_string());
        let chunks = if entry.failed_chunks > 0 {
            format!("{}/{}", entry.chunk_count - entry.failed_chunks, entry.chunk_count)
        } else {
            entry.chunk_count.to_string()
        };

        println!(
            "{:<12} {:<16} {:>7}  {:<18}  {}",
            entry.thread_id,
            time,
            chunks,
            truncate(&entry.analyzer_model, 18),
            entry.title
        );
    }

    Ok(())
}

/// Remove one entry, or all of them
pub async fn clear(tid: Option<u64>) -> Result<()> {
    let cache = cache_at_default_path().await?;

    match tid {
        Some(tid) => {
            if cache.remove(tid).await? {
                println!("🗑️  Removed cached analysis of thread {}", tid);
            } else {
                println!("📭 Thread {} has no cached analysis", tid);
            }
        }
        None => {
            let removed = cache.clear().await?;
            println!("🗑️  Removed {} cached analyses", removed);
        }
    }

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars - 1).collect();
        format!("{}…", cut)
    }
}
