//! Lenient decoding of structured analyzer and inference output.

use serde::Deserialize;
use serde_json::Value;

use crate::findings::{AnalysisOutcome, Category, Finding, Metrics, Severity};

#[derive(Debug, Default, Deserialize)]
struct RawOutcome {
    #[serde(default, alias = "findings", deserialize_with = "null_as_default")]
    issues: Vec<RawIssue>,
    #[serde(default, deserialize_with = "null_as_default")]
    metrics: serde_json::Map<String, Value>,
    #[serde(default)]
    summary: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    recommendations: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default, deserialize_with = "null_as_default")]
    category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    severity: String,
    #[serde(default, alias = "line_number")]
    line: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    title: String,
    #[serde(default, alias = "message", deserialize_with = "null_as_default")]
    description: String,
    #[serde(default, alias = "suggestion", alias = "fix")]
    remediation: Option<String>,
    #[serde(default, alias = "code_snippet")]
    snippet: Option<String>,
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode a service response into an outcome.
///
/// Accepts bare JSON, JSON wrapped in a markdown code fence, or JSON
/// embedded in surrounding prose. Returns `None` when no JSON object can be
/// recovered; callers treat that as an empty result.
pub fn parse_outcome(raw: &str) -> Option<AnalysisOutcome> {
    let parsed: RawOutcome = candidates(raw)
        .into_iter()
        .find_map(|candidate| serde_json::from_str(candidate).ok())?;
    Some(convert(parsed))
}

fn candidates(raw: &str) -> Vec<&str> {
    let trimmed = raw.trim();
    let mut out = vec![trimmed];

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            out.push(body[..end].trim());
        }
    }

    if let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if open < close {
            out.push(&trimmed[open..=close]);
        }
    }

    out
}

fn convert(raw: RawOutcome) -> AnalysisOutcome {
    let findings = raw
        .issues
        .into_iter()
        .map(|issue| {
            let category = Category::parse_lenient(&issue.category);
            let title = if issue.title.trim().is_empty() {
                category.as_str().replace('_', " ")
            } else {
                issue.title.trim().to_string()
            };
            let description = if issue.description.trim().is_empty() {
                title.clone()
            } else {
                issue.description.trim().to_string()
            };
            Finding {
                category,
                severity: Severity::parse_lenient(&issue.severity),
                line: line_number(&issue.line),
                title,
                description,
                remediation: issue.remediation.filter(|s| !s.trim().is_empty()),
                snippet: issue.snippet.filter(|s| !s.trim().is_empty()),
                file_path: String::new(),
                chunk_id: None,
            }
        })
        .collect();

    let metrics: Metrics = raw
        .metrics
        .into_iter()
        .filter_map(|(key, value)| number(&value).map(|n| (key, n)))
        .collect();

    let summary = match raw.summary {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    };

    let recommendations = raw
        .recommendations
        .into_iter()
        .filter_map(|value| match value {
            Value::String(text) => Some(text),
            Value::Object(map) => map
                .get("text")
                .or_else(|| map.get("recommendation"))
                .and_then(Value::as_str)
                .map(String::from),
            _ => None,
        })
        .collect();

    AnalysisOutcome {
        findings,
        metrics,
        summary,
        recommendations,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn line_number(value: &Value) -> usize {
    number(value)
        .filter(|n| *n >= 1.0)
        .map(|n| n as usize)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let raw = r#"{
            "issues": [{
                "category": "security",
                "severity": "high",
                "line_number": 12,
                "title": "SQL injection",
                "description": "Query built from user input",
                "suggestion": "Use parameters"
            }],
            "metrics": {"complexity_score": 72, "note": "n/a"},
            "summary": "One issue"
        }"#;

        let outcome = parse_outcome(raw).unwrap();
        assert_eq!(outcome.findings.len(), 1);
        let finding = &outcome.findings[0];
        assert_eq!(finding.category, Category::Security);
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.line, 12);
        assert_eq!(finding.remediation.as_deref(), Some("Use parameters"));
        assert_eq!(outcome.metrics.len(), 1);
        assert_eq!(outcome.metrics["complexity_score"], 72.0);
        assert_eq!(outcome.summary, "One issue");
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Here is the review:\n```json\n{\"issues\": [], \"summary\": \"clean\"}\n```\nThanks";
        let outcome = parse_outcome(raw).unwrap();
        assert!(outcome.findings.is_empty());
        assert_eq!(outcome.summary, "clean");
    }

    #[test]
    fn test_embedded_json() {
        let raw = "Result: {\"issues\": [{\"category\": \"testing_gaps\", \"line\": \"4\"}]} done";
        let outcome = parse_outcome(raw).unwrap();
        assert_eq!(outcome.findings[0].category, Category::Testing);
        assert_eq!(outcome.findings[0].line, 4);
        assert_eq!(outcome.findings[0].severity, Severity::Info);
        assert_eq!(outcome.findings[0].title, "testing");
    }

    #[test]
    fn test_null_fields_keep_the_other_issues() {
        let raw = r#"{
            "issues": [
                {"category": "security", "severity": "high", "line": 3, "title": "eval", "description": "dynamic code"},
                {"category": null, "severity": "low", "line": 9, "title": "naming", "description": null}
            ],
            "recommendations": null,
            "summary": null
        }"#;

        let outcome = parse_outcome(raw).unwrap();
        assert_eq!(outcome.findings.len(), 2);
        let second = &outcome.findings[1];
        assert_eq!(second.category, Category::BestPractices);
        assert_eq!(second.severity, Severity::Low);
        assert_eq!(second.description, "naming");
        assert!(outcome.recommendations.is_empty());
        assert!(outcome.summary.is_empty());
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_outcome("I could not analyze this file.").is_none());
        assert!(parse_outcome("{ not json }").is_none());
    }
}
