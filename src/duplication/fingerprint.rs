use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::FingerprintConfig;

/// Content hash of one normalized sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hex SHA-256 of the normalized window text
    pub digest: String,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    /// Length of the normalized text in bytes
    pub size: usize,
}

/// Trim every line, drop blank ones, join with `\n`.
///
/// Deliberately language agnostic: comments are hashed like any other text.
pub fn normalize_window(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fingerprint every `window_lines`-line window of `content`, stepping one
/// line at a time. Windows whose normalized text is shorter than
/// `min_normalized_len` are skipped. Files shorter than one window produce
/// nothing.
pub fn fingerprint_content(content: &str, config: &FingerprintConfig) -> Vec<Fingerprint> {
    let window = config.window_lines.max(1);
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() < window {
        return Vec::new();
    }

    lines
        .windows(window)
        .enumerate()
        .filter_map(|(i, block)| {
            let normalized = normalize_window(block);
            if normalized.len() < config.min_normalized_len {
                return None;
            }
            Some(Fingerprint {
                digest: hex::encode(Sha256::digest(normalized.as_bytes())),
                start_line: i + 1,
                end_line: i + window,
                size: normalized.len(),
            })
        })
        .collect()
}
