use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::fingerprint::{fingerprint_content, Fingerprint};
use crate::config::FingerprintConfig;
use crate::findings::{Category, Finding, Severity};

pub const DUPLICATE_TITLE: &str = "Duplicate code block detected";
const DUPLICATE_REMEDIATION: &str =
    "Extract common logic into a reusable function/module to reduce duplication.";

/// One place a fingerprint was seen.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Occurrence {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Every occurrence of one digest across the corpus (always two or more).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub digest: String,
    /// Sorted by (file, start line)
    pub occurrences: Vec<Occurrence>,
}

impl DuplicateGroup {
    /// Occurrences per file, each list compacted.
    pub fn compacted_by_file(&self) -> BTreeMap<&str, Vec<Occurrence>> {
        let mut per_file: BTreeMap<&str, Vec<Occurrence>> = BTreeMap::new();
        for occurrence in &self.occurrences {
            per_file
                .entry(occurrence.file_path.as_str())
                .or_default()
                .push(occurrence.clone());
        }
        per_file
            .into_iter()
            .map(|(file, occurrences)| (file, compact(occurrences)))
            .collect()
    }
}

/// Merge occurrences that touch or overlap the previously retained one.
///
/// Input must belong to one file; it is sorted by start line first.
pub fn compact(mut occurrences: Vec<Occurrence>) -> Vec<Occurrence> {
    occurrences.sort();
    let mut retained: Vec<Occurrence> = Vec::with_capacity(occurrences.len());
    for occurrence in occurrences {
        match retained.last_mut() {
            Some(previous) if occurrence.start_line <= previous.end_line + 1 => {
                previous.end_line = previous.end_line.max(occurrence.end_line);
            }
            _ => retained.push(occurrence),
        }
    }
    retained
}

/// Corpus-wide digest → occurrences table.
#[derive(Debug, Default, Clone)]
pub struct DuplicationIndex {
    by_digest: BTreeMap<String, Vec<Occurrence>>,
    files: usize,
}

impl DuplicationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint a set of files in parallel and index the results.
    pub fn build(files: &[(String, Arc<str>)], config: &FingerprintConfig) -> Self {
        let fingerprinted: Vec<(&String, Vec<Fingerprint>)> = files
            .par_iter()
            .map(|(path, content)| (path, fingerprint_content(content, config)))
            .collect();

        let mut index = Self::new();
        for (path, fingerprints) in fingerprinted {
            index.add(path, fingerprints);
        }
        index
    }

    pub fn add(&mut self, file_path: &str, fingerprints: Vec<Fingerprint>) {
        self.files += 1;
        for fingerprint in fingerprints {
            self.by_digest
                .entry(fingerprint.digest)
                .or_default()
                .push(Occurrence {
                    file_path: file_path.to_string(),
                    start_line: fingerprint.start_line,
                    end_line: fingerprint.end_line,
                });
        }
    }

    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Digests seen at least twice, ordered by digest.
    pub fn groups(&self) -> Vec<DuplicateGroup> {
        self.by_digest
            .iter()
            .filter(|(_, occurrences)| occurrences.len() >= 2)
            .map(|(digest, occurrences)| {
                let mut occurrences = occurrences.clone();
                occurrences.sort();
                DuplicateGroup {
                    digest: digest.clone(),
                    occurrences,
                }
            })
            .collect()
    }

    /// One finding per file per duplicated digest, anchored at the first
    /// compacted occurrence and citing the corpus-wide occurrence count.
    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        for group in self.groups() {
            let total = group.occurrences.len();
            for (file, compacted) in group.compacted_by_file() {
                let Some(anchor) = compacted.first() else {
                    continue;
                };
                findings.push((
                    group.digest.clone(),
                    Finding::new(
                        Category::CodeDuplication,
                        Severity::Low,
                        anchor.start_line,
                        DUPLICATE_TITLE,
                        format!("This block appears {} times across the codebase.", total),
                    )
                    .with_remediation(DUPLICATE_REMEDIATION)
                    .in_file(file),
                ));
            }
        }

        findings.sort_by(|(digest_a, a), (digest_b, b)| {
            (&a.file_path, a.line, digest_a).cmp(&(&b.file_path, b.line, digest_b))
        });
        findings.into_iter().map(|(_, finding)| finding).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Vec<String> {
        (0..10)
            .map(|i| format!("    result_{} = transform(record.field_{}, scale)", i, i))
            .collect()
    }

    fn occurrence(file: &str, start: usize, end: usize) -> Occurrence {
        Occurrence {
            file_path: file.to_string(),
            start_line: start,
            end_line: end,
        }
    }

    #[test]
    fn test_compact_merges_touching_occurrences() {
        let compacted = compact(vec![
            occurrence("a.py", 11, 20),
            occurrence("a.py", 1, 10),
            occurrence("a.py", 40, 49),
        ]);

        assert_eq!(
            compacted,
            vec![occurrence("a.py", 1, 20), occurrence("a.py", 40, 49)]
        );
    }

    #[test]
    fn test_single_occurrence_is_not_a_group() {
        let content = block().join("\n");
        let index = DuplicationIndex::build(
            &[("only.py".to_string(), Arc::from(content))],
            &FingerprintConfig::default(),
        );

        assert!(index.groups().is_empty());
        assert!(index.findings().is_empty());
    }

    #[test]
    fn test_block_repeated_across_files() {
        let block = block();
        let mut first = Vec::new();
        for copy in 0..3 {
            first.extend(block.iter().cloned());
            first.push(format!("separator_unique_to_copy_{}()", copy));
        }
        let mut second = vec!["import helpers".to_string()];
        second.extend(block.iter().cloned());

        let files = vec![
            ("a.py".to_string(), Arc::from(first.join("\n"))),
            ("b.py".to_string(), Arc::from(second.join("\n"))),
        ];
        let index = DuplicationIndex::build(&files, &FingerprintConfig::default());

        let findings = index.findings();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].file_path, "a.py");
        assert_eq!(findings[0].line, 1);
        assert_eq!(findings[1].file_path, "b.py");
        assert_eq!(findings[1].line, 2);
        for finding in &findings {
            assert_eq!(finding.category, Category::CodeDuplication);
            assert_eq!(finding.severity, Severity::Low);
            assert!(finding.description.contains("appears 4 times"));
        }
    }

    #[test]
    fn test_order_independent() {
        let block = block().join("\n");
        let files = vec![
            ("x.py".to_string(), Arc::from(format!("{}\nx_only()", block))),
            ("y.py".to_string(), Arc::from(format!("y_only()\n{}", block))),
            ("z.py".to_string(), Arc::from(format!("z()\nz()\n{}", block))),
        ];
        let mut reversed = files.clone();
        reversed.reverse();

        let config = FingerprintConfig::default();
        let forward = DuplicationIndex::build(&files, &config);
        let backward = DuplicationIndex::build(&reversed, &config);

        assert_eq!(forward.groups(), backward.groups());
        assert_eq!(forward.findings(), backward.findings());
    }
}
