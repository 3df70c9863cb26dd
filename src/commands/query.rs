use anyhow::Result;
use std::path::Path;

use super::open_index;

pub async fn run(root: &Path, text: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let (config, index) = open_index(root).await?;
    let limit = limit.unwrap_or(config.retrieval.default_limit);

    let hits = index.query(text, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No confident match for: {}", text);
        println!("\nMake sure the codebase was analyzed with 'codequal analyze'");
        return Ok(());
    }

    println!(
        "Found {} results for: \"{}\" (backend: {})\n",
        hits.len(),
        text,
        index.backend_name()
    );

    for (i, hit) in hits.iter().enumerate() {
        let score_pct = (hit.score * 100.0).round() as i32;
        println!(
            "{}. {} [{}] fragment {} (score: {}%, issues in file: {})",
            i + 1,
            hit.entry.file_path,
            hit.entry.language,
            hit.entry.chunk_index,
            score_pct,
            hit.entry.issue_count
        );
        println!("{}", format_preview(&hit.entry.content, 5));
        println!();
    }

    Ok(())
}

/// First `max_lines` lines of `content`, indented
fn format_preview(content: &str, max_lines: usize) -> String {
    let mut lines: Vec<&str> = content.lines().take(max_lines).collect();
    if content.lines().count() > max_lines {
        lines.push("...");
    }
    lines
        .iter()
        .map(|line| format!("   {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
