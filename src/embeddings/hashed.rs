use anyhow::{bail, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use super::provider::{normalize, EmbeddingProvider};
use crate::metrics::EMBEDDING_REQUESTS;

/// Dimensions reserved for code-pattern counts
const PATTERN_DIMS: usize = 10;
/// Dimensions reserved for layout statistics
const STRUCTURE_DIMS: usize = 6;
const MIN_DIMENSION: usize = PATTERN_DIMS + STRUCTURE_DIMS + 16;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("token pattern");
    static ref CODE_PATTERNS: [Regex; PATTERN_DIMS] = [
        Regex::new(r"\b(def|fn|func|function)\b").expect("pattern"),
        Regex::new(r"\b(class|struct|interface|trait)\b").expect("pattern"),
        Regex::new(r"\b(import|include|require|use)\b").expect("pattern"),
        Regex::new(r"\b(for|while|loop)\b").expect("pattern"),
        Regex::new(r"\b(if|elif|else|switch|match|case)\b").expect("pattern"),
        Regex::new(r"\b(try|except|catch|finally|raise|throw)\b").expect("pattern"),
        Regex::new(r"\b(eval|exec|system|popen)\b").expect("pattern"),
        Regex::new(r"(?i)\b(select|insert|update|delete)\b").expect("pattern"),
        Regex::new(r"(#|//|/\*)").expect("pattern"),
        Regex::new(r"\b(return|yield)\b").expect("pattern"),
    ];
}

/// Deterministic embedding built from hashed code features.
///
/// Layout: pattern counts, then hashed token frequencies, then layout
/// statistics; the result is unit length so inner product is cosine
/// similarity. Needs no model download and no network.
#[derive(Debug, Clone)]
pub struct HashedFeatureEmbedder {
    dimension: usize,
}

impl HashedFeatureEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension < MIN_DIMENSION {
            bail!(
                "hashed embedding dimension must be at least {}, got {}",
                MIN_DIMENSION,
                dimension
            );
        }
        Ok(Self { dimension })
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let token_dims = self.dimension - PATTERN_DIMS - STRUCTURE_DIMS;

        for (i, pattern) in CODE_PATTERNS.iter().enumerate() {
            let count = pattern.find_iter(text).count() as f32;
            vector[i] = 0.5 * (1.0 + count).ln();
        }

        let mut token_counts = vec![0u32; token_dims];
        for token in TOKEN.find_iter(text) {
            let lower = token.as_str().to_lowercase();
            token_counts[bucket(&lower, token_dims)] += 1;
            // identifiers also contribute their snake_case parts
            if lower.contains('_') {
                for part in lower.split('_').filter(|p| p.len() > 1) {
                    token_counts[bucket(part, token_dims)] += 1;
                }
            }
        }
        for (i, count) in token_counts.into_iter().enumerate() {
            if count > 0 {
                vector[PATTERN_DIMS + i] = 1.0 + (count as f32).ln();
            }
        }

        let lines: Vec<&str> = text.lines().collect();
        if !lines.is_empty() {
            let total = lines.len() as f32;
            let base = self.dimension - STRUCTURE_DIMS;
            let blank = lines.iter().filter(|l| l.trim().is_empty()).count() as f32;
            let indented = lines.iter().filter(|l| l.starts_with([' ', '\t'])).count() as f32;
            let braces = text.matches(['{', '}']).count() as f32;
            let avg_len = lines.iter().map(|l| l.len()).sum::<usize>() as f32 / total;

            vector[base] = (1.0 + total).ln() * 0.1;
            vector[base + 1] = (avg_len / 100.0).min(1.0);
            vector[base + 2] = indented / total;
            vector[base + 3] = blank / total;
            vector[base + 4] = (braces / total).min(1.0);
            vector[base + 5] = if text.contains("    ") { 0.2 } else { 0.0 };
        }

        normalize(&mut vector);
        vector
    }
}

/// FNV-1a; stable across platforms and compiler versions so persisted
/// vectors stay comparable with fresh query vectors.
fn bucket(token: &str, buckets: usize) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % buckets as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for HashedFeatureEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        EMBEDDING_REQUESTS.inc();
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &'static str {
        "hashed-features"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::provider::dot;

    #[test]
    fn test_rejects_tiny_dimension() {
        assert!(HashedFeatureEmbedder::new(8).is_err());
    }

    #[test]
    fn test_identical_text_has_similarity_one() {
        let embedder = HashedFeatureEmbedder::new(512).unwrap();
        let text = "def load(path):\n    return json.load(open(path))";
        let a = embedder.vectorize(text);
        let b = embedder.vectorize(text);
        assert_eq!(a, b);
        assert!((dot(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashedFeatureEmbedder::new(512).unwrap();
        let code = embedder.vectorize("result = eval(user_input)\nprint(result)");
        let related = embedder.vectorize("where is eval called on user input");
        let unrelated = embedder.vectorize("SELECT name FROM customers WHERE id = 4");
        assert!(dot(&code, &related) > dot(&code, &unrelated));
    }

    #[tokio::test]
    async fn test_provider_health() {
        let embedder = HashedFeatureEmbedder::new(64).unwrap();
        assert!(embedder.health_check().await.unwrap().is_healthy());
        assert_eq!(embedder.embed_query("x").await.unwrap().len(), 64);
    }
}
