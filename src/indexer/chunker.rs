use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AnalysisConfig;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk budget must be greater than zero")]
    InvalidBudget,
}

/// A contiguous line range of a source file, sized for one analyzer call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position in the file's chunk sequence
    pub id: usize,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    pub content: String,
    pub size: usize,
}

impl Chunk {
    pub fn line_count(&self) -> usize {
        self.end_line + 1 - self.start_line
    }
}

/// How chunk ends are snapped to declaration boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryStyle {
    /// Top-level declarations start at column zero
    Indentation,
    /// Blocks close with `}`
    Braces,
    None,
}

impl BoundaryStyle {
    fn for_language(language: &str) -> Self {
        match language {
            "python" => BoundaryStyle::Indentation,
            "javascript" | "typescript" | "java" | "c" | "cpp" | "csharp" | "go" | "rust"
            | "swift" | "kotlin" | "scala" | "php" => BoundaryStyle::Braces,
            _ => BoundaryStyle::None,
        }
    }
}

/// Splits oversized files into overlapping windows bounded by a byte budget.
///
/// The window length is derived from the file's average line length; each
/// raw end may be pulled back by up to `lookback` lines so a window ends on a
/// declaration boundary. Consecutive windows share `overlap_lines` lines.
#[derive(Debug, Clone)]
pub struct Chunker {
    budget: usize,
    overlap_lines: usize,
    lookback: usize,
    max_file_size: usize,
}

impl Chunker {
    pub fn new(budget: usize, overlap_lines: usize) -> Self {
        Self {
            budget,
            overlap_lines,
            lookback: 10,
            max_file_size: budget,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            budget: config.chunk_budget,
            overlap_lines: config.chunk_overlap_lines,
            lookback: config.boundary_lookback,
            max_file_size: config.max_file_size,
        }
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    /// Whether a file of `size` bytes is analyzed chunk by chunk.
    pub fn needs_chunking(&self, size: usize) -> bool {
        size > self.max_file_size
    }

    /// Split `content` into chunks. Empty content yields no chunks.
    pub fn chunk(&self, content: &str, language: &str) -> Result<Vec<Chunk>, ChunkError> {
        if self.budget == 0 {
            return Err(ChunkError::InvalidBudget);
        }

        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        if content.len() <= self.budget {
            return Ok(vec![Chunk {
                id: 0,
                start_line: 1,
                end_line: lines.len(),
                content: content.to_string(),
                size: content.len(),
            }]);
        }

        let total = lines.len();
        // offsets[i] = bytes of lines[..i], each line counted with its newline
        let mut offsets = Vec::with_capacity(total + 1);
        offsets.push(0usize);
        for line in &lines {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + line.len() + 1);
        }
        let span_bytes = |start: usize, end: usize| offsets[end] - offsets[start] - 1;

        let avg_line_len = content.len().div_ceil(total).max(1);
        let lines_per_chunk = (self.budget / avg_line_len).max(1);
        let style = BoundaryStyle::for_language(language);

        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let mut end = (start + lines_per_chunk).min(total);
            if end < total {
                end = self.adjust_boundary(&lines, start, end, style);
            }
            while end - start > 1 && span_bytes(start, end) > self.budget {
                end -= 1;
            }

            let text = lines[start..end].join("\n");
            chunks.push(Chunk {
                id: chunks.len(),
                start_line: start + 1,
                end_line: end,
                size: text.len(),
                content: text,
            });

            if end >= total {
                break;
            }
            start = end.saturating_sub(self.overlap_lines).max(start + 1);
        }

        Ok(chunks)
    }

    /// Pull a raw end back onto a declaration boundary, never by more than
    /// `lookback` lines and never to the window start.
    fn adjust_boundary(&self, lines: &[&str], start: usize, end: usize, style: BoundaryStyle) -> usize {
        let floor = end.saturating_sub(self.lookback).max(start + 1);
        if floor >= end {
            return end;
        }

        match style {
            BoundaryStyle::Indentation => (floor..end)
                .rev()
                .find(|&i| {
                    let line = lines[i];
                    !line.trim().is_empty() && !line.starts_with([' ', '\t'])
                })
                .unwrap_or(end),
            BoundaryStyle::Braces => (floor - 1..end)
                .rev()
                .find(|&i| {
                    let line = lines[i];
                    line.trim_end().ends_with('}') && !line.trim_start().starts_with("//")
                })
                .map(|i| i + 1)
                .unwrap_or(end),
            BoundaryStyle::None => end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered_lines(chunks: &[Chunk], total: usize) -> Vec<bool> {
        let mut covered = vec![false; total];
        for chunk in chunks {
            for line in chunk.start_line..=chunk.end_line {
                covered[line - 1] = true;
            }
        }
        covered
    }

    #[test]
    fn test_small_file_single_chunk() {
        let chunker = Chunker::new(1024, 100);
        let content = "def main():\n    print('hello')\n";

        let chunks = chunker.chunk(content, "python").unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, 0);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 2);
        assert_eq!(chunks[0].content, content);
    }

    #[test]
    fn test_empty_content() {
        let chunker = Chunker::new(1024, 100);
        assert!(chunker.chunk("", "python").unwrap().is_empty());
    }

    #[test]
    fn test_zero_budget_is_an_error() {
        let chunker = Chunker::new(0, 10);
        assert_eq!(chunker.chunk("x = 1", "python"), Err(ChunkError::InvalidBudget));
    }

    #[test]
    fn test_chunks_cover_file_and_overlap() {
        let content = (0..400)
            .map(|i| format!("value_{:04} = compute({})", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunker = Chunker::new(2_000, 20);

        let chunks = chunker.chunk(&content, "text").unwrap();

        assert!(chunks.len() > 2);
        assert!(covered_lines(&chunks, 400).iter().all(|&c| c));
        for pair in chunks.windows(2) {
            assert!(pair[1].start_line > pair[0].start_line);
            // consecutive windows share exactly the configured overlap
            assert_eq!(pair[0].end_line + 1 - pair[1].start_line, 20);
        }
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, i);
            assert!(chunk.size <= 2_000);
        }
        assert_eq!(chunks.last().unwrap().end_line, 400);
    }

    #[test]
    fn test_python_boundary_moves_back_to_top_level_line() {
        // 30-byte lines, budget fits 20 of them; a top-level def sits at line 17
        let mut lines: Vec<String> = (0..60).map(|i| format!("    body_line_{:03} = {:08}", i, i)).collect();
        lines[16] = format!("{:<29}", "def handler():");
        let content = lines.join("\n");
        let chunker = Chunker::new(600, 5);

        let chunks = chunker.chunk(&content, "python").unwrap();

        // first window stops right before the declaration
        assert_eq!(chunks[0].end_line, 16);
        assert!(chunks[1].content.contains("def handler():"));
    }

    #[test]
    fn test_brace_boundary_includes_closing_brace() {
        let mut lines: Vec<String> = (0..60).map(|i| format!("  let v{:03} = call({:010});", i, i)).collect();
        lines[14] = format!("{:<29}", "}");
        let content = lines.join("\n");
        let chunker = Chunker::new(600, 5);

        let chunks = chunker.chunk(&content, "javascript").unwrap();

        assert_eq!(chunks[0].end_line, 15);
        assert!(chunks[0].content.trim_end().ends_with('}'));
    }

    #[test]
    fn test_boundary_outside_lookback_is_ignored() {
        let mut lines: Vec<String> = (0..60).map(|i| format!("    body_line_{:03} = {:08}", i, i)).collect();
        // too far back from the raw end of line 20
        lines[3] = format!("{:<29}", "class Early:");
        let content = lines.join("\n");
        let chunker = Chunker::new(600, 5);

        let chunks = chunker.chunk(&content, "python").unwrap();

        assert_eq!(chunks[0].end_line, 20);
    }

    #[test]
    fn test_large_file_three_chunks() {
        // 25,000 lines of 100 bytes each = 2.5 MB against a 1 MB budget
        let line = "x".repeat(99);
        let content = std::iter::repeat(line.as_str())
            .take(25_000)
            .collect::<Vec<_>>()
            .join("\n");
        let chunker = Chunker::new(1_000_000, 100);

        let chunks = chunker.chunk(&content, "text").unwrap();

        assert_eq!(chunks.len(), 3);
        let covered = covered_lines(&chunks, 25_000);
        assert_eq!(covered.iter().filter(|&&c| c).count(), 25_000);
        assert_eq!(chunks[0].end_line + 1 - chunks[1].start_line, 100);
    }

    #[test]
    fn test_deterministic() {
        let content = (0..500).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let chunker = Chunker::new(1_000, 10);
        assert_eq!(
            chunker.chunk(&content, "rust").unwrap(),
            chunker.chunk(&content, "rust").unwrap()
        );
    }

    #[test]
    fn test_needs_chunking() {
        let config = AnalysisConfig::default();
        let chunker = Chunker::from_config(&config);
        assert!(!chunker.needs_chunking(1024 * 1024));
        assert!(chunker.needs_chunking(1024 * 1024 + 1));
    }
}
