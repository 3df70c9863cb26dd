use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use super::service::{Analyzer, ServiceError};
use crate::findings::{AnalysisOutcome, Category, Finding, Severity};

/// One line-level pattern.
struct Rule {
    pattern: Regex,
    /// Empty means every language
    languages: &'static [&'static str],
    category: Category,
    severity: Severity,
    title: &'static str,
    description: &'static str,
    remediation: &'static str,
}

const PYTHON: &[&str] = &["python"];
const JS: &[&str] = &["javascript", "typescript"];
const C_LIKE: &[&str] = &["c", "cpp"];
const DYNAMIC: &[&str] = &["python", "javascript", "typescript", "ruby", "php"];
const ANY: &[&str] = &[];

fn rule(
    pattern: &str,
    languages: &'static [&'static str],
    category: Category,
    severity: Severity,
    title: &'static str,
    description: &'static str,
    remediation: &'static str,
) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("built-in pattern must compile"),
        languages,
        category,
        severity,
        title,
        description,
        remediation,
    }
}

lazy_static! {
    static ref RULES: Vec<Rule> = vec![
        rule(
            r"\beval\s*\(",
            DYNAMIC,
            Category::Security,
            Severity::High,
            "Use of eval()",
            "Use of eval() is dangerous: it executes arbitrary code built from data.",
            "Eliminate dynamic eval() execution; parse the input explicitly instead.",
        ),
        rule(
            r"\bexec\s*\(",
            PYTHON,
            Category::Security,
            Severity::High,
            "Use of exec()",
            "Use of exec() is dangerous: it executes arbitrary code built from data.",
            "Replace exec() with explicit dispatch over the allowed operations.",
        ),
        rule(
            r"\bpickle\.loads?\s*\(",
            PYTHON,
            Category::Security,
            Severity::Medium,
            "Unsafe deserialization",
            "pickle can execute arbitrary code while loading untrusted data.",
            "Use a data-only format such as JSON for untrusted input.",
        ),
        rule(
            r"\bos\.system\s*\(|shell\s*=\s*True",
            PYTHON,
            Category::Security,
            Severity::High,
            "Shell command execution",
            "Commands run through a shell are open to injection.",
            "Pass an argument list to subprocess without shell=True.",
        ),
        rule(
            r#"\.execute\s*\(\s*f["']|\.execute\s*\([^)]*%\s*\("#,
            PYTHON,
            Category::Security,
            Severity::High,
            "SQL built with string formatting",
            "Interpolating values into SQL text allows injection.",
            "Use parameterized queries.",
        ),
        rule(
            r"^\s*except\s*:",
            PYTHON,
            Category::BestPractices,
            Severity::Low,
            "Bare except clause",
            "A bare except also swallows KeyboardInterrupt and SystemExit.",
            "Catch the specific exception types you expect.",
        ),
        rule(
            r"\.innerHTML\s*=",
            JS,
            Category::Security,
            Severity::Medium,
            "Assignment to innerHTML",
            "Writing unsanitized markup to innerHTML enables cross-site scripting.",
            "Use textContent or sanitize the markup first.",
        ),
        rule(
            r"\bdocument\.write\s*\(",
            JS,
            Category::Security,
            Severity::Medium,
            "Use of document.write()",
            "document.write() injects raw markup into the page.",
            "Build DOM nodes explicitly.",
        ),
        rule(
            r#"\bset(Timeout|Interval)\s*\(\s*["'`]"#,
            JS,
            Category::Security,
            Severity::Medium,
            "String passed to timer",
            "Passing a string to setTimeout/setInterval evaluates it as code.",
            "Pass a function instead of a string.",
        ),
        rule(
            r"\bgets\s*\(",
            C_LIKE,
            Category::Security,
            Severity::High,
            "Use of gets()",
            "gets() cannot bound its input and always risks a buffer overflow.",
            "Use fgets() with the buffer size.",
        ),
        rule(
            r"\bstrcpy\s*\(",
            C_LIKE,
            Category::Security,
            Severity::Medium,
            "Use of strcpy()",
            "strcpy() does not check the destination size.",
            "Use a bounded copy such as strncpy() or snprintf().",
        ),
        rule(
            r#"(?i)\b(password|passwd|secret|api_key|apikey|access_token)\s*[:=]\s*["'][^"']{4,}["']"#,
            ANY,
            Category::Security,
            Severity::High,
            "Hard-coded credential",
            "A credential appears to be embedded in source code.",
            "Load secrets from the environment or a secret store.",
        ),
        rule(
            r"\b(TODO|FIXME|XXX)\b",
            ANY,
            Category::Maintainability,
            Severity::Low,
            "Unresolved TODO/FIXME",
            "The code carries an unresolved work marker.",
            "Resolve the marker or track it in the issue tracker.",
        ),
    ];
}

/// Built-in line scanner for a handful of well-known risky constructs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternAnalyzer;

impl PatternAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous scan; the async trait method just wraps this.
    pub fn scan(&self, content: &str, language: &str) -> Vec<Finding> {
        let rules: Vec<&Rule> = RULES
            .iter()
            .filter(|rule| rule.languages.is_empty() || rule.languages.contains(&language))
            .collect();

        let mut findings = Vec::new();
        for (index, line) in content.lines().enumerate() {
            for rule in &rules {
                if rule.pattern.is_match(line) {
                    findings.push(
                        Finding::new(
                            rule.category,
                            rule.severity,
                            index + 1,
                            rule.title,
                            rule.description,
                        )
                        .with_remediation(rule.remediation),
                    );
                }
            }
        }
        findings
    }
}

#[async_trait]
impl Analyzer for PatternAnalyzer {
    fn name(&self) -> &'static str {
        "patterns"
    }

    async fn analyze(
        &self,
        content: &str,
        language: &str,
        _file_name: &str,
    ) -> Result<AnalysisOutcome, ServiceError> {
        let findings = self.scan(content, language);
        Ok(AnalysisOutcome {
            summary: format!("Pattern scan found {} issues.", findings.len()),
            findings,
            ..Default::default()
        })
    }
}
