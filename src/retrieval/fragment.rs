use lazy_static::lazy_static;
use regex::Regex;

use crate::config::RetrievalConfig;

lazy_static! {
    static ref FUNCTION: Regex =
        Regex::new(r"(?m)^\s*(pub\s+)?(async\s+)?(def|fn|func|function)\s+\w+|=>\s*\{")
            .expect("function pattern");
    static ref IMPORT: Regex =
        Regex::new(r"(?m)^\s*(import\s|from\s+\S+\s+import\s|use\s|#include\s|require\(|using\s)")
            .expect("import pattern");
    static ref COMMENT: Regex =
        Regex::new(r"(?m)^\s*(#[^!\[]|//|/\*|\*|--|\x22\x22\x22)").expect("comment pattern");
}

/// Starts of declarations a fragment should preferably begin with
const DECLARATION_STARTS: &[&str] = &[
    "fn ",
    "pub fn ",
    "async fn ",
    "pub async fn ",
    "impl ",
    "struct ",
    "pub struct ",
    "enum ",
    "pub enum ",
    "trait ",
    "def ",
    "async def ",
    "class ",
    "function ",
    "export function ",
    "export const ",
    "export default ",
    "func ",
    "public ",
    "private ",
];

/// Most lines carried over from one fragment into the next
const MAX_OVERLAP_LINES: usize = 5;

/// A retrieval-sized piece of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub index: usize,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl Fragment {
    pub fn has_function(&self) -> bool {
        FUNCTION.is_match(&self.content)
    }

    pub fn has_import(&self) -> bool {
        IMPORT.is_match(&self.content)
    }

    pub fn has_comment(&self) -> bool {
        COMMENT.is_match(&self.content)
    }
}

/// Splits file content into overlapping fragments for embedding.
///
/// Independent of the analysis chunker: sizes are in characters and much
/// smaller, and breaks prefer blank lines, closing braces and the line
/// before a declaration.
#[derive(Debug, Clone)]
pub struct Fragmenter {
    target_chars: usize,
    overlap_chars: usize,
    min_len: usize,
}

impl Fragmenter {
    pub fn new(target_chars: usize, overlap_chars: usize, min_len: usize) -> Self {
        Self {
            target_chars: target_chars.max(1),
            overlap_chars,
            min_len,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(
            config.fragment_size,
            config.fragment_overlap,
            config.min_fragment_len,
        )
    }

    /// Fragments of `content` whose trimmed length reaches the minimum,
    /// numbered in order of appearance.
    pub fn split(&self, content: &str) -> Vec<Fragment> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let mut fragments = Vec::new();
        let mut start = 0;

        while start < lines.len() {
            let end = self.find_boundary(&lines, start);
            let text = lines[start..=end].join("\n");

            if text.trim().len() >= self.min_len {
                fragments.push(Fragment {
                    index: fragments.len(),
                    content: text,
                    start_line: start + 1,
                    end_line: end + 1,
                });
            }

            if end + 1 >= lines.len() {
                break;
            }
            let overlap = self.overlap_lines(&lines, start, end);
            start = (end + 1 - overlap).max(start + 1);
        }

        fragments
    }

    fn find_boundary(&self, lines: &[&str], start: usize) -> usize {
        let mut chars = 0;
        let mut last_break = None;

        for (i, line) in lines.iter().enumerate().skip(start) {
            chars += line.len() + 1;

            if i > start && is_break_point(line, lines.get(i + 1).copied()) {
                last_break = Some(i);
            }

            if chars >= self.target_chars {
                // accept a break point within the last fifth of the fragment
                let threshold = i.saturating_sub((i - start) / 5);
                return match last_break {
                    Some(b) if b >= threshold => b,
                    _ => i,
                };
            }
        }

        lines.len() - 1
    }

    fn overlap_lines(&self, lines: &[&str], start: usize, end: usize) -> usize {
        if self.overlap_chars == 0 {
            return 0;
        }
        let mut chars = 0;
        let mut count = 0;
        for line in lines[start..=end].iter().rev() {
            chars += line.len() + 1;
            count += 1;
            if chars >= self.overlap_chars {
                break;
            }
        }
        // never overlap the whole fragment
        count.min(MAX_OVERLAP_LINES).min(end - start)
    }
}

fn is_break_point(line: &str, next_line: Option<&str>) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed == "}" || trimmed == "};" {
        return true;
    }
    next_line
        .map(|next| {
            let next = next.trim_start();
            DECLARATION_STARTS.iter().any(|d| next.starts_with(d))
        })
        .unwrap_or(false)
}
