use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Why a file could not become a [`SourceUnit`].
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    UnsupportedEncoding { path: PathBuf },

    #[error("failed to parse notebook {path}: {source}")]
    Notebook {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One analyzable file. Content is shared so tasks can hold it cheaply.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    /// Path relative to the analyzed root, used as the report key
    pub display_path: String,
    pub language: String,
    pub content: Arc<str>,
    pub size: usize,
}

impl SourceUnit {
    /// Read a file from disk. Notebooks contribute their code cells only.
    pub fn read(path: &Path, root: &Path) -> Result<Self, SourceError> {
        let bytes = std::fs::read(path).map_err(|source| SourceError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| SourceError::UnsupportedEncoding {
            path: path.to_path_buf(),
        })?;

        let is_notebook = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("ipynb"))
            .unwrap_or(false);

        let content = if is_notebook {
            extract_notebook_code(&text).map_err(|source| SourceError::Notebook {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            text
        };

        let display_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        Ok(Self::from_content(path.to_path_buf(), display_path, content))
    }

    pub fn from_content(path: PathBuf, display_path: String, content: String) -> Self {
        let language = detect_language(&path);
        let size = content.len();
        Self {
            path,
            display_path,
            language,
            content: Arc::from(content),
            size,
        }
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.display_path)
    }
}

/// Map a file extension onto a language tag.
pub fn detect_language(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "py" | "ipynb" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "c" => "c",
        "cpp" | "cc" | "cxx" | "h" | "hpp" | "hxx" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "" => "unknown",
        other => other,
    }
    .to_string()
}

#[derive(Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Deserialize)]
struct NotebookCell {
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CellSource {
    Lines(Vec<String>),
    Text(String),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

fn extract_notebook_code(raw: &str) -> Result<String, serde_json::Error> {
    let notebook: Notebook = serde_json::from_str(raw)?;
    let cells: Vec<String> = notebook
        .cells
        .into_iter()
        .filter(|cell| cell.cell_type == "code")
        .map(|cell| match cell.source {
            CellSource::Lines(lines) => lines.concat(),
            CellSource::Text(text) => text,
        })
        .filter(|code| !code.trim().is_empty())
        .collect();
    Ok(cells.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("main.rs")), "rust");
        assert_eq!(detect_language(Path::new("app.TSX")), "typescript");
        assert_eq!(detect_language(Path::new("lib/util.hpp")), "cpp");
        assert_eq!(detect_language(Path::new("Makefile")), "unknown");
        assert_eq!(detect_language(Path::new("notes.txt")), "txt");
    }

    #[test]
    fn test_read_source_unit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("src").join("app.py");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "import os\nprint(os.getcwd())\n").unwrap();

        let unit = SourceUnit::read(&path, dir.path()).unwrap();
        assert_eq!(unit.display_path, "src/app.py");
        assert_eq!(unit.language, "python");
        assert_eq!(unit.line_count(), 2);
        assert_eq!(unit.file_name(), "app.py");
    }

    #[test]
    fn test_non_utf8_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blob.py");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let err = SourceUnit::read(&path, dir.path()).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn test_notebook_code_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("analysis.ipynb");
        let notebook = r##"{
            "cells": [
                {"cell_type": "markdown", "source": ["# Title"]},
                {"cell_type": "code", "source": ["x = 1\n", "y = x + 1"]},
                {"cell_type": "code", "source": "print(y)"}
            ]
        }"##;
        std::fs::write(&path, notebook).unwrap();

        let unit = SourceUnit::read(&path, dir.path()).unwrap();
        assert_eq!(unit.language, "python");
        assert_eq!(&*unit.content, "x = 1\ny = x + 1\n\nprint(y)");
    }
}
