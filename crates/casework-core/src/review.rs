//! Cross-specialist review.
//!
//! A reviewer scores another specialist's analysis with its own specialty
//! checks plus three generic ones (coverage, redundancy, consistency). The
//! weighted score is nudged by how well the reviewer's style complements the
//! author's, then mapped to approve / refine / reject.

use crate::error::{check_range, CaseworkError, Result};
use crate::types::{Specialist, Stage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_CHECK_WEIGHT: f64 = 0.1;
pub const UNKNOWN_REVIEWER_SCORE: f64 = 0.5;
pub const UNKNOWN_AUTHOR_COMPLEMENTARITY: f64 = 0.8;

const COVERAGE_MIN: f64 = 0.8;
const REDUNDANCY_SIMILARITY: f64 = 0.8;
const REDUNDANCY_PAIR_SHARE: f64 = 0.2;
const CONSISTENCY_MIN: f64 = 0.3;

/// Rows are reviewers, columns authors, both in [`Specialist::all`] order.
const COMPLEMENTARITY: [[f64; 5]; 5] = [
    // strategist forensic behavioral tactical coordinator
    [0.70, 0.85, 0.80, 0.90, 0.75], // strategist
    [0.85, 0.70, 0.90, 0.80, 0.75], // forensic
    [0.80, 0.90, 0.70, 0.85, 0.80], // behavioral
    [0.90, 0.80, 0.85, 0.70, 0.80], // tactical
    [0.75, 0.75, 0.80, 0.80, 0.70], // coordinator
];

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    /// `[0, 100]`.
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Specialist who wrote the analysis, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behavioral_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temporal_patterns: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl Analysis {
    /// An analysis with no insights has nothing to review.
    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }
}

/// The case the analysis belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub narrative: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewInput {
    pub reviewer: String,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub context: ReviewContext,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    Refine,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Approved => "approved",
            ReviewStatus::Refine => "refine",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub score: f64,
    pub weight: f64,
    pub detail: String,
    #[serde(skip)]
    suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub status: ReviewStatus,
    pub justification: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Always within `[0, 1]`.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complementarity: Option<f64>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewThresholds {
    pub approve: f64,
    pub reject: f64,
    pub max_failed_checks: usize,
}

impl Default for ReviewThresholds {
    fn default() -> Self {
        Self {
            approve: 0.8,
            reject: 0.5,
            max_failed_checks: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewEngine {
    thresholds: ReviewThresholds,
}

impl ReviewEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: ReviewThresholds) -> Self {
        Self { thresholds }
    }

    pub fn review_input(&self, input: &ReviewInput) -> Result<ReviewResult> {
        self.review(&input.reviewer, input.analysis.as_ref(), &input.context)
    }

    pub fn review(
        &self,
        reviewer: &str,
        analysis: Option<&Analysis>,
        context: &ReviewContext,
    ) -> Result<ReviewResult> {
        if reviewer.trim().is_empty() {
            return Err(CaseworkError::InvalidReviewInput(
                "reviewer is empty".to_string(),
            ));
        }

        let analysis = match analysis {
            Some(a) if !a.is_empty() => a,
            _ => {
                return Ok(ReviewResult {
                    status: ReviewStatus::Rejected,
                    justification: "analysis is empty: no insights to review".to_string(),
                    suggestions: vec!["submit at least one insight backed by evidence".to_string()],
                    score: 0.0,
                    checks: Vec::new(),
                    complementarity: None,
                })
            }
        };
        validate(analysis)?;

        let Ok(reviewer) = reviewer.parse::<Specialist>() else {
            tracing::debug!(reviewer, "no review rules for reviewer; passing through");
            return Ok(ReviewResult {
                status: ReviewStatus::Approved,
                justification: format!("no review rules for '{reviewer}'; approved without checks"),
                suggestions: Vec::new(),
                score: UNKNOWN_REVIEWER_SCORE,
                checks: Vec::new(),
                complementarity: None,
            });
        };

        let mut checks = specialty_checks(reviewer, analysis);
        checks.push(coverage(analysis));
        checks.push(redundancy(analysis));
        checks.push(consistency(analysis, context));

        let c = complementarity(reviewer, analysis.author.as_deref());
        let total_weight: f64 = checks.iter().map(|ch| ch.weight).sum();
        let weighted = if total_weight > 0.0 {
            checks.iter().map(|ch| ch.score * ch.weight).sum::<f64>() / total_weight
        } else {
            0.0
        };
        let score = weighted * (0.85 + 0.15 * c);

        let failed: Vec<&CheckOutcome> = checks.iter().filter(|ch| !ch.passed).collect();
        let t = &self.thresholds;
        let status = if score >= t.approve && failed.is_empty() {
            ReviewStatus::Approved
        } else if score < t.reject || failed.len() > t.max_failed_checks {
            ReviewStatus::Rejected
        } else {
            ReviewStatus::Refine
        };

        let mut suggestions: Vec<String> = failed
            .iter()
            .filter_map(|ch| ch.suggestion.clone())
            .collect();
        if status != ReviewStatus::Approved {
            suggestions.push(remediation(reviewer).to_string());
        }

        let justification = if failed.is_empty() {
            format!("{reviewer} review: score {score:.2}, all {} checks passed", checks.len())
        } else {
            let names: Vec<&str> = failed.iter().map(|ch| ch.name.as_str()).collect();
            format!(
                "{reviewer} review: score {score:.2}, failed {}",
                names.join(", ")
            )
        };

        tracing::debug!(%reviewer, %status, score, failed = failed.len(), "review complete");

        Ok(ReviewResult {
            status,
            justification,
            suggestions,
            score,
            checks,
            complementarity: Some(c),
        })
    }
}

pub fn complementarity(reviewer: Specialist, author: Option<&str>) -> f64 {
    match author.and_then(|a| a.parse::<Specialist>().ok()) {
        Some(author) => COMPLEMENTARITY[reviewer.index()][author.index()],
        None => UNKNOWN_AUTHOR_COMPLEMENTARITY,
    }
}

fn validate(analysis: &Analysis) -> Result<()> {
    check_range(analysis.confidence, 0.0, 100.0)
        .map_err(|e| CaseworkError::InvalidReviewInput(format!("analysis confidence: {e}")))?;
    for (i, insight) in analysis.insights.iter().enumerate() {
        check_range(insight.confidence, 0.0, 100.0)
            .map_err(|e| CaseworkError::InvalidReviewInput(format!("insight {i}: {e}")))?;
    }
    Ok(())
}

fn remediation(reviewer: Specialist) -> &'static str {
    match reviewer {
        Specialist::Forensic => "tie every insight to concrete, catalogued evidence",
        Specialist::Behavioral => "address ethical considerations and observed behavioral patterns",
        Specialist::Strategist => "expand key points and add actionable recommendations",
        Specialist::Tactical => "anchor the analysis in a timeline and concrete next steps",
        Specialist::Coordinator => "write a fuller summary the whole team can act on",
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check(name: &str, weight: f64, score: f64, passed: bool, detail: String, suggestion: &str) -> CheckOutcome {
    CheckOutcome {
        name: name.to_string(),
        passed,
        score,
        weight,
        detail,
        suggestion: (!passed).then(|| suggestion.to_string()),
    }
}

fn non_empty(name: &str, weight: f64, items: &[String], suggestion: &str) -> CheckOutcome {
    let present = items.iter().any(|s| !s.trim().is_empty());
    check(
        name,
        weight,
        if present { 1.0 } else { 0.0 },
        present,
        format!("{} item(s)", items.len()),
        suggestion,
    )
}

fn specialty_checks(reviewer: Specialist, a: &Analysis) -> Vec<CheckOutcome> {
    match reviewer {
        Specialist::Forensic => {
            let backed = a.insights.iter().filter(|i| !i.evidence.is_empty()).count();
            let share = backed as f64 / a.insights.len() as f64;
            // High-confidence claims need more than one piece of evidence.
            let calibrated = a
                .insights
                .iter()
                .filter(|i| i.confidence < 80.0 || i.evidence.len() >= 2)
                .count() as f64
                / a.insights.len() as f64;
            vec![
                check(
                    "evidence_backing",
                    0.3,
                    share,
                    backed == a.insights.len(),
                    format!("{backed}/{} insights cite evidence", a.insights.len()),
                    "cite at least one evidence item for every insight",
                ),
                check(
                    "confidence_calibration",
                    0.2,
                    calibrated,
                    calibrated >= 0.8,
                    format!("{:.0}% of insights calibrated", calibrated * 100.0),
                    "lower confidence on claims backed by a single evidence item",
                ),
            ]
        }
        Specialist::Behavioral => {
            const ETHICS: &[&str] = &[
                "ethic", "bias", "privacy", "consent", "presumption", "proportional", "etica", "ética",
            ];
            let text = [a.summary.as_str()]
                .into_iter()
                .chain(a.key_points.iter().map(String::as_str))
                .chain(a.recommendations.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            let ethical = ETHICS.iter().any(|k| text.contains(k));
            vec![
                check(
                    "ethical_considerations",
                    0.3,
                    if ethical { 1.0 } else { 0.0 },
                    ethical,
                    if ethical { "ethical considerations stated" } else { "no ethical considerations stated" }.to_string(),
                    "state the ethical considerations (bias, privacy, presumption of innocence)",
                ),
                non_empty(
                    "behavioral_patterns",
                    0.2,
                    &a.behavioral_patterns,
                    "describe the behavioral patterns the conclusions rely on",
                ),
            ]
        }
        Specialist::Strategist => {
            let depth = (a.key_points.len() as f64 / 3.0).min(1.0);
            vec![
                non_empty("recommendations", 0.25, &a.recommendations, "add actionable recommendations"),
                check(
                    "key_point_depth",
                    0.25,
                    depth,
                    a.key_points.len() >= 3,
                    format!("{} key point(s)", a.key_points.len()),
                    "develop at least three key points",
                ),
            ]
        }
        Specialist::Tactical => vec![
            non_empty(
                "temporal_patterns",
                0.3,
                &a.temporal_patterns,
                "place the findings on a timeline",
            ),
            non_empty("recommendations", 0.2, &a.recommendations, "propose concrete next steps"),
        ],
        Specialist::Coordinator => {
            let words = a.summary.split_whitespace().count();
            let ratio = (words as f64 / 10.0).min(1.0);
            vec![
                check(
                    "summary_length",
                    0.25,
                    ratio,
                    words >= 10,
                    format!("summary has {words} word(s)"),
                    "expand the summary to at least ten words",
                ),
                non_empty("recommendations", 0.2, &a.recommendations, "add recommendations for the team"),
            ]
        }
    }
}

fn coverage(a: &Analysis) -> CheckOutcome {
    let parts = [
        !a.summary.trim().is_empty(),
        !a.key_points.is_empty(),
        !a.insights.is_empty(),
    ];
    let share = parts.iter().filter(|p| **p).count() as f64 / parts.len() as f64;
    check(
        "coverage",
        DEFAULT_CHECK_WEIGHT,
        share,
        share >= COVERAGE_MIN,
        format!("{:.0}% of summary/key points/insights present", share * 100.0),
        "fill in the summary, key points and insights",
    )
}

fn redundancy(a: &Analysis) -> CheckOutcome {
    let sets: Vec<HashSet<String>> = a.insights.iter().map(|i| tokens(&i.description)).collect();
    let mut pairs = 0usize;
    let mut similar = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            pairs += 1;
            if jaccard(&sets[i], &sets[j]) > REDUNDANCY_SIMILARITY {
                similar += 1;
            }
        }
    }
    let share = if pairs == 0 { 0.0 } else { similar as f64 / pairs as f64 };
    check(
        "redundancy",
        DEFAULT_CHECK_WEIGHT,
        1.0 - share,
        share <= REDUNDANCY_PAIR_SHARE,
        format!("{similar}/{pairs} insight pairs near-duplicate"),
        "merge insights that restate the same point",
    )
}

fn consistency(a: &Analysis, ctx: &ReviewContext) -> CheckOutcome {
    let narrative = keywords(&ctx.narrative);
    let summary = keywords(&a.summary);
    if narrative.is_empty() || summary.is_empty() {
        return check(
            "consistency",
            DEFAULT_CHECK_WEIGHT,
            1.0,
            true,
            "nothing to compare".to_string(),
            "",
        );
    }
    let overlap = summary.intersection(&narrative).count() as f64 / summary.len() as f64;
    check(
        "consistency",
        DEFAULT_CHECK_WEIGHT,
        (overlap / CONSISTENCY_MIN).min(1.0),
        overlap >= CONSISTENCY_MIN,
        format!("{:.0}% keyword overlap with the case narrative", overlap * 100.0),
        "align the summary with the facts of the case narrative",
    )
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

const STOPWORDS: &[&str] = &[
    "that", "this", "with", "from", "have", "were", "been", "they", "their", "there", "which",
    "what", "when", "where", "into", "about", "also", "than", "then", "them", "will", "would",
];

fn keywords(text: &str) -> HashSet<String> {
    tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() >= 4 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn insight(description: &str, evidence: &[&str], confidence: f64) -> Insight {
        Insight {
            kind: "observation".to_string(),
            description: description.to_string(),
            evidence: evidence.iter().map(|s| s.to_string()).collect(),
            confidence,
        }
    }

    fn strong_analysis() -> Analysis {
        Analysis {
            author: Some("behavioral".to_string()),
            summary: "The suspect visited the harbour warehouse twice before the fire".to_string(),
            key_points: vec![
                "two visits to the warehouse".to_string(),
                "fuel purchased the same day".to_string(),
                "alibi contradicted by camera".to_string(),
            ],
            insights: vec![
                insight("warehouse visits recorded on camera", &["cam-12", "cam-14"], 85.0),
                insight("fuel receipt found in the car", &["receipt-3"], 60.0),
            ],
            behavioral_patterns: vec!["repeated reconnaissance".to_string()],
            temporal_patterns: vec!["visits a day apart".to_string()],
            recommendations: vec!["interview the night guard".to_string()],
            confidence: 70.0,
        }
    }

    fn context() -> ReviewContext {
        ReviewContext {
            case_id: Some("c1".to_string()),
            stage: Some(Stage::CrossValidation),
            narrative: "Fire at the harbour warehouse; suspect seen visiting before the fire".to_string(),
        }
    }

    #[test]
    fn zero_insights_rejected() {
        let mut a = strong_analysis();
        a.insights.clear();
        let r = ReviewEngine::new().review("forensic", Some(&a), &context()).unwrap();
        assert_eq!(r.status, ReviewStatus::Rejected);
        assert!(r.score < 0.3);

        let r = ReviewEngine::new().review("forensic", None, &context()).unwrap();
        assert_eq!(r.status, ReviewStatus::Rejected);
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn unknown_reviewer_passes_through() {
        let r = ReviewEngine::new()
            .review("astrologer", Some(&strong_analysis()), &context())
            .unwrap();
        assert_eq!(r.status, ReviewStatus::Approved);
        assert_eq!(r.score, 0.5);
    }

    #[test]
    fn empty_reviewer_is_invalid() {
        let err = ReviewEngine::new()
            .review(" ", Some(&strong_analysis()), &context())
            .unwrap_err();
        assert!(matches!(err, CaseworkError::InvalidReviewInput(_)));
    }

    #[test]
    fn strong_analysis_approved_by_forensic() {
        let r = ReviewEngine::new()
            .review("forensic", Some(&strong_analysis()), &context())
            .unwrap();
        assert_eq!(r.status, ReviewStatus::Approved, "{r:?}");
        assert!(r.suggestions.is_empty());
        assert_eq!(r.complementarity, Some(0.9));
    }

    #[test]
    fn missing_evidence_needs_refinement() {
        let mut a = strong_analysis();
        a.insights.push(insight("motive may be insurance", &[], 40.0));
        let r = ReviewEngine::new().review("forensic", Some(&a), &context()).unwrap();
        assert_eq!(r.status, ReviewStatus::Refine);
        assert!(r.suggestions.iter().any(|s| s.contains("evidence")));
    }

    #[test]
    fn behavioral_reviewer_wants_ethics() {
        let r = ReviewEngine::new()
            .review("behavioral", Some(&strong_analysis()), &context())
            .unwrap();
        let ethics = r.checks.iter().find(|c| c.name == "ethical_considerations").unwrap();
        assert!(!ethics.passed);
        assert_ne!(r.status, ReviewStatus::Approved);
        assert!(!r.suggestions.is_empty());
    }

    #[test]
    fn redundant_insights_are_flagged() {
        let mut a = strong_analysis();
        a.insights = vec![
            insight("suspect seen at the warehouse", &["e1"], 50.0),
            insight("Suspect seen at the warehouse", &["e2"], 50.0),
            insight("suspect seen at the warehouse!", &["e3"], 50.0),
        ];
        let check = redundancy(&a);
        assert!(!check.passed);
        assert_eq!(check.score, 0.0);
    }

    #[test]
    fn unrelated_summary_is_inconsistent() {
        let mut a = strong_analysis();
        a.summary = "Quarterly revenue projections for distribution centres".to_string();
        let check = consistency(&a, &context());
        assert!(!check.passed);
        assert!(check.score < 1.0);
    }

    #[test]
    fn empty_narrative_passes_consistency() {
        let check = consistency(&strong_analysis(), &ReviewContext::default());
        assert!(check.passed);
    }

    #[test]
    fn scores_stay_bounded_and_refine_has_suggestions() {
        let engine = ReviewEngine::new();
        let mut sparse = strong_analysis();
        sparse.summary.clear();
        sparse.key_points.clear();
        sparse.recommendations.clear();
        sparse.behavioral_patterns.clear();
        sparse.temporal_patterns.clear();

        for reviewer in Specialist::all() {
            for a in [strong_analysis(), sparse.clone()] {
                let r = engine.review(reviewer.as_str(), Some(&a), &context()).unwrap();
                assert!((0.0..=1.0).contains(&r.score), "{reviewer}: {}", r.score);
                if r.status == ReviewStatus::Refine {
                    assert!(!r.suggestions.is_empty());
                }
            }
        }
    }

    #[test]
    fn complementarity_matrix_is_bounded() {
        for r in Specialist::all() {
            for a in Specialist::all() {
                let c = complementarity(*r, Some(a.as_str()));
                assert!((0.7..=0.9).contains(&c));
            }
            assert_eq!(complementarity(*r, None), UNKNOWN_AUTHOR_COMPLEMENTARITY);
        }
    }

    #[test]
    fn out_of_range_insight_confidence_is_invalid() {
        let mut a = strong_analysis();
        a.insights[0].confidence = 120.0;
        assert!(ReviewEngine::new().review("forensic", Some(&a), &context()).is_err());
    }
}
