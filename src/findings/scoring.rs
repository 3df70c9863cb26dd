use crate::config::ScoringConfig;

use super::model::{Category, Finding, Metrics};

pub const SECURITY_SCORE: &str = "security_score";
pub const MAINTAINABILITY_SCORE: &str = "maintainability_score";
pub const OVERALL_SCORE: &str = "overall_score";
pub const COMPLEXITY_SCORE: &str = "complexity_score";

/// Categories that count against maintainability.
const MAINTAINABILITY_CATEGORIES: [Category; 5] = [
    Category::Maintainability,
    Category::Complexity,
    Category::BestPractices,
    Category::CodeDuplication,
    Category::Documentation,
];

/// Derive 0-100 quality scores from findings alone.
///
/// Each finding costs `severity weight × category weight`. Security and
/// maintainability only count their own categories; the overall score counts
/// everything with a gentler multiplier. An empty list scores 100 throughout.
pub fn issue_based_scores(findings: &[Finding], config: &ScoringConfig) -> Metrics {
    let mut security_penalty = 0.0;
    let mut maintainability_penalty = 0.0;
    let mut total_penalty = 0.0;

    for finding in findings {
        let penalty =
            config.severity_weight(finding.severity) * config.category_weight(finding.category);
        total_penalty += penalty;
        if finding.category == Category::Security {
            security_penalty += penalty;
        }
        if MAINTAINABILITY_CATEGORIES.contains(&finding.category) {
            maintainability_penalty += penalty;
        }
    }

    let score = |penalty: f64, multiplier: f64| round1((100.0 - penalty * multiplier).clamp(0.0, 100.0));

    Metrics::from([
        (
            SECURITY_SCORE.to_string(),
            score(security_penalty, config.security_multiplier),
        ),
        (
            MAINTAINABILITY_SCORE.to_string(),
            score(maintainability_penalty, config.maintainability_multiplier),
        ),
        (
            OVERALL_SCORE.to_string(),
            score(total_penalty, config.overall_multiplier),
        ),
    ])
}

/// True when an analyzer already supplied scores that should not be replaced.
pub fn has_external_scores(metrics: &Metrics) -> bool {
    metrics.contains_key(SECURITY_SCORE) || metrics.contains_key(MAINTAINABILITY_SCORE)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
