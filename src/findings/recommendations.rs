use super::model::{Category, Finding, Severity};

pub const FALLBACK_RECOMMENDATION: &str =
    "Prioritize fixing high-severity issues and add tests to prevent regressions.";

/// Recommendations derived from finding counts, used when no analyzer
/// supplied any. Never returns an empty list.
pub fn heuristic_recommendations(findings: &[Finding]) -> Vec<String> {
    let count = |category: Category| findings.iter().filter(|f| f.category == category).count();
    let critical = findings
        .iter()
        .filter(|f| f.severity == Severity::Critical)
        .count();

    let mut recommendations = Vec::new();
    if critical > 0 {
        recommendations.push("Address critical security and performance issues immediately");
    }
    if count(Category::Security) > 3 {
        recommendations.push("Consider implementing a security review process");
    }
    if count(Category::Complexity) > 5 {
        recommendations.push("Refactor complex functions to improve maintainability");
    }
    if count(Category::Testing) > 3 {
        recommendations.push("Increase test coverage for better code reliability");
    }
    if count(Category::Documentation) > 3 {
        recommendations.push("Improve code documentation and comments");
    }
    if recommendations.is_empty() {
        recommendations.push(FALLBACK_RECOMMENDATION);
    }

    recommendations.into_iter().map(String::from).collect()
}

/// Append `incoming` to `target`, skipping strings already present.
pub fn union_into(target: &mut Vec<String>, incoming: &[String]) {
    for recommendation in incoming {
        let trimmed = recommendation.trim();
        if !trimmed.is_empty() && !target.iter().any(|existing| existing == trimmed) {
            target.push(trimmed.to_string());
        }
    }
}
