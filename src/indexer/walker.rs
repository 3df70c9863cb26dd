use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::AnalysisConfig;

/// Walks the source tree respecting .gitignore and custom ignore patterns
pub struct Walker {
    root: PathBuf,
    extensions: HashSet<String>,
    ignore_patterns: Vec<String>,
}

impl Walker {
    pub fn new(root: PathBuf, config: &AnalysisConfig) -> Self {
        Self {
            root,
            extensions: config
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Iterate analyzable files under the root.
    pub fn walk(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .hidden(true)
            // gitignore rules apply outside of git checkouts too
            .require_git(false);

        if let Some(overrides) = self.overrides().0 {
            builder.overrides(overrides);
        }

        builder
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
            .filter(move |entry| !self.is_ignored(entry.path()))
            .filter(move |entry| self.has_wanted_extension(entry.path()))
            .map(|entry| entry.into_path())
    }

    /// Collect all analyzable files, sorted so runs are reproducible
    pub fn collect_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.walk().collect();
        files.sort();
        files
    }

    /// Exclusion overrides for the ignore patterns, plus the patterns that
    /// are not valid globs and were left out.
    fn overrides(&self) -> (Option<Override>, Vec<String>) {
        let mut builder = OverrideBuilder::new(&self.root);
        let mut rejected = Vec::new();

        for pattern in &self.ignore_patterns {
            let added = builder
                .add(&format!("!{}", pattern))
                .and_then(|b| b.add(&format!("!{}/**", pattern)));
            if let Err(e) = added {
                warn!(pattern = %pattern, error = %e, "Skipping invalid ignore pattern");
                rejected.push(pattern.clone());
            }
        }

        match builder.build() {
            Ok(overrides) => (Some(overrides), rejected),
            Err(e) => {
                warn!(error = %e, "Ignore patterns could not be compiled; only exact directory names apply");
                (None, rejected)
            }
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.components().any(|component| {
            let name = component.as_os_str().to_string_lossy();
            self.ignore_patterns.iter().any(|pattern| name == pattern.as_str())
        })
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn test_config() -> AnalysisConfig {
        AnalysisConfig {
            extensions: vec!["py".to_string(), "js".to_string()],
            ignore_patterns: vec!["node_modules".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_walker_filters_extensions() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.py"), "print('hi')").unwrap();
        fs::write(dir.path().join("index.js"), "console.log(1)").unwrap();
        fs::write(dir.path().join("README.md"), "# readme").unwrap();

        let walker = Walker::new(dir.path().to_path_buf(), &test_config());
        let files = walker.collect_files();

        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("app.py"));
        assert!(files[1].ends_with("index.js"));
    }

    #[test]
    fn test_walker_ignores_directories() {
        let dir = tempdir().unwrap();
        let vendored = dir.path().join("node_modules").join("lib");
        fs::create_dir_all(&vendored).unwrap();
        fs::write(dir.path().join("main.js"), "run()").unwrap();
        fs::write(vendored.join("dep.js"), "module.exports = 1").unwrap();

        let walker = Walker::new(dir.path().to_path_buf(), &test_config());
        let files = walker.collect_files();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("main.js"));
    }

    #[test]
    fn test_walker_respects_gitignore() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "generated.py\n").unwrap();
        fs::write(dir.path().join("generated.py"), "x = 1").unwrap();
        fs::write(dir.path().join("kept.py"), "y = 2").unwrap();

        let walker = Walker::new(dir.path().to_path_buf(), &test_config());
        let files = walker.collect_files();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("kept.py"));
    }

    #[test]
    fn test_invalid_ignore_pattern_keeps_the_valid_ones() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.js"), "run()").unwrap();
        fs::write(dir.path().join("bundle.min.js"), "x()").unwrap();

        let config = AnalysisConfig {
            ignore_patterns: vec!["*.min.js".to_string(), "[unclosed".to_string()],
            ..test_config()
        };
        let walker = Walker::new(dir.path().to_path_buf(), &config);

        let (overrides, rejected) = walker.overrides();
        assert!(overrides.is_some());
        assert_eq!(rejected, vec!["[unclosed".to_string()]);

        let files = walker.collect_files();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("app.js"));
    }
}
