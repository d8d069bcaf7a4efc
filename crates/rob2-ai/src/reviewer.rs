//! Decision-path review.
//!
//! The model audits a domain result against the domain's decision paths and
//! may revise it. The local decision table then has the final word: if the
//! overall risk still differs from the endpoint the signal answers select,
//! the endpoint replaces it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rob2_core::paths::table;
use rob2_core::{DomainKey, DomainResult, REVIEW_PRINCIPLES, ReviewInfo, schema};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ConfigError, LlmError};
use crate::evaluator::{Evaluation, normalize};
use crate::llm::ModelCaller;
use crate::prompt::PromptRenderer;

pub const REVIEW_FAILED: &str = "REVIEW_FAILED";

// ── Standards ──

/// Decision-path text and principles sent to the reviewer model.
///
/// Custom standards change only what the model is shown; enforcement always
/// uses the built-in tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewStandards {
    domains: HashMap<DomainKey, String>,
    principles: Option<String>,
}

#[derive(Deserialize)]
struct StandardsFile {
    review_standards: HashMap<String, String>,
}

impl ReviewStandards {
    /// Load `{"review_standards": {"<domain_key>": "...", "default": "..."}}`.
    ///
    /// Keys that name no domain are ignored with a warning.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Standards {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let file: StandardsFile = serde_json::from_str(text)?;
        let mut standards = Self::default();
        for (key, text) in file.review_standards {
            if key == "default" {
                standards.principles = Some(text);
                continue;
            }
            match key.parse::<DomainKey>() {
                Ok(domain) => {
                    standards.domains.insert(domain, text);
                }
                Err(_) => warn!(key = %key, "ignoring review standard for unknown domain"),
            }
        }
        Ok(standards)
    }

    pub fn standard(&self, key: DomainKey) -> String {
        self.domains
            .get(&key)
            .cloned()
            .unwrap_or_else(|| table(key).render())
    }

    pub fn principles(&self) -> &str {
        self.principles.as_deref().unwrap_or(REVIEW_PRINCIPLES)
    }
}

// ── Verdict ──

/// The reviewer model's verdict on one domain result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReviewVerdict {
    #[serde(default)]
    pub needs_revision: bool,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub revision_reasons: Vec<String>,
    #[serde(default)]
    pub revised_output: Option<Value>,
    #[serde(default)]
    pub confidence: f64,
}

impl ReviewVerdict {
    pub fn clamped_confidence(&self) -> f64 {
        if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        }
    }
}

// ── Reviewer ──

pub struct DecisionReviewer {
    caller: ModelCaller,
    prompts: Arc<dyn PromptRenderer>,
    standards: ReviewStandards,
}

impl DecisionReviewer {
    pub fn new(
        caller: ModelCaller,
        prompts: Arc<dyn PromptRenderer>,
        standards: ReviewStandards,
    ) -> Self {
        Self {
            caller,
            prompts,
            standards,
        }
    }

    /// Review an evaluation. Defaulted evaluations pass through unreviewed.
    pub async fn review_evaluation(&self, evaluation: Evaluation) -> DomainResult {
        match evaluation {
            Evaluation::Evaluated(result) => self.review(result).await,
            defaulted @ Evaluation::Defaulted { .. } => {
                info!(domain = %defaulted.key(), "skipping review of default result");
                defaulted.into_result()
            }
        }
    }

    /// Review one domain result. Never fails: a failed review returns the
    /// original result marked `REVIEW_FAILED`.
    pub async fn review(&self, result: DomainResult) -> DomainResult {
        let key = result.domain_key;
        let prompt = self.prompts.decision_review(
            schema(key),
            &self.standards.standard(key),
            self.standards.principles(),
            &result,
        );

        match self.caller.structured::<ReviewVerdict>(&prompt).await {
            Ok(verdict) => apply_verdict(result, verdict),
            Err(e) => review_failed(result, &e),
        }
    }
}

/// Apply a model verdict, then enforce the local decision table.
pub fn apply_verdict(original: DomainResult, verdict: ReviewVerdict) -> DomainResult {
    let key = original.domain_key;
    let mut reviewed = original;
    let mut was_revised = false;
    let mut reasons = Vec::new();

    if verdict.needs_revision {
        reasons.extend(verdict.revision_reasons.iter().cloned());
        if let Some(revised) = &verdict.revised_output {
            let normalized = normalize(key, revised);
            reviewed.signals = normalized.signals;
            reviewed.overall = normalized.overall;
            was_revised = true;
        }
    }

    let cited = verdict.path.trim();
    let path = match table(key).resolve_result(&reviewed) {
        Some(resolution) => {
            let label = resolution.label();
            if resolution.risk != reviewed.overall.risk {
                let from = reviewed.overall.risk;
                reasons.push(format!(
                    "Overall risk {from} does not match the decision path endpoint {}; \
                     corrected per {label}",
                    resolution.risk
                ));
                reviewed.overall.reason = format!(
                    "{} [Corrected from {from} to {} by decision path.]",
                    reviewed.overall.reason.trim_end(),
                    resolution.risk
                );
                reviewed.overall.risk = resolution.risk;
                was_revised = true;
                warn!(
                    domain = %key,
                    from = %from,
                    to = %resolution.risk,
                    "decision table overrode overall risk"
                );
            }
            if !cited.is_empty() && path_ids(cited) != path_ids(&label) {
                reasons.push(format!("Reviewer cited {cited}; decision table selects {label}"));
            }
            label
        }
        None => cited.to_string(),
    };

    info!(domain = %key, was_revised, path = %path, "domain reviewed");
    reviewed.decision_path = Some(path.clone());
    reviewed.review_info = Some(ReviewInfo {
        was_revised,
        decision_path: path,
        revision_reasons: reasons,
        confidence: verdict.clamped_confidence(),
        reviewed_at: Utc::now().to_rfc3339(),
        reviewer_domain: key,
    });
    reviewed
}

/// Path names in a label: `["PATH_1", "PATH_4"]` for
/// `PATH_1: ... -> Low risk + PATH_4: ... -> Low risk`.
fn path_ids(label: &str) -> Vec<&str> {
    label
        .split(" + ")
        .map(|part| part.split(':').next().unwrap_or(part).trim())
        .collect()
}

fn review_failed(original: DomainResult, error: &LlmError) -> DomainResult {
    warn!(domain = %original.domain_key, error = %error, "review failed, keeping original result");
    let key = original.domain_key;
    let mut result = original;
    result.decision_path = Some(REVIEW_FAILED.to_string());
    result.review_info = Some(ReviewInfo {
        was_revised: false,
        decision_path: REVIEW_FAILED.to_string(),
        revision_reasons: vec![format!("Review failed: {error}")],
        confidence: 0.0,
        reviewed_at: Utc::now().to_rfc3339(),
        reviewer_domain: key,
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::DefaultPrompts;
    use crate::testing::ScriptedModel;
    use pretty_assertions::assert_eq;
    use rob2_core::{RiskLevel, SignalAnswer};
    use serde_json::json;
    use std::time::Duration;

    fn reviewer(model: Arc<ScriptedModel>, standards: ReviewStandards) -> DecisionReviewer {
        DecisionReviewer::new(
            ModelCaller::new(model).with_backoff(Duration::ZERO),
            Arc::new(DefaultPrompts),
            standards,
        )
    }

    /// Randomization result with q1_1 = N and an overall of Low risk.
    fn non_random_but_low() -> DomainResult {
        normalize(
            DomainKey::Randomization,
            &json!({
                "signals": {"q1_1": {"answer": "N", "reason": "alternation", "evidence": []}},
                "overall": {"risk": "Low risk", "reason": "looks fine", "evidence": []}
            }),
        )
    }

    #[tokio::test]
    async fn model_revision_is_applied() {
        let verdict = json!({
            "needs_revision": true,
            "path": "PATH_3: q1_1[N|PN] -> High risk",
            "revision_reasons": ["Sequence not random"],
            "revised_output": {
                "signals": {"q1_1": {"answer": "N", "reason": "alternation", "evidence": []}},
                "overall": {"risk": "High risk", "reason": "not random", "evidence": []}
            },
            "confidence": 1.4
        });
        let model = Arc::new(ScriptedModel::always(&verdict.to_string()));
        let reviewed = reviewer(model, ReviewStandards::default())
            .review(non_random_but_low())
            .await;

        assert_eq!(reviewed.overall.risk, RiskLevel::High);
        let info = reviewed.review_info.unwrap();
        assert!(info.was_revised);
        assert_eq!(info.confidence, 1.0);
        assert_eq!(info.revision_reasons, vec!["Sequence not random".to_string()]);
        assert_eq!(info.reviewer_domain, DomainKey::Randomization);
        assert_eq!(
            reviewed.decision_path.as_deref(),
            Some("PATH_3: q1_1[N|PN] -> High risk")
        );
    }

    #[tokio::test]
    async fn table_overrides_a_model_that_misses_the_mismatch() {
        let verdict = json!({"needs_revision": false, "path": "PATH_1", "confidence": 0.9});
        let model = Arc::new(ScriptedModel::always(&verdict.to_string()));
        let reviewed = reviewer(model, ReviewStandards::default())
            .review(non_random_but_low())
            .await;

        assert_eq!(reviewed.overall.risk, RiskLevel::High);
        let path = reviewed.decision_path.clone().unwrap();
        assert!(path.starts_with("PATH_3: q1_1[N|PN]"));
        let info = reviewed.review_info.unwrap();
        assert!(info.was_revised);
        assert!(info.revision_reasons[0].contains("Low risk"));
        assert!(info.revision_reasons[1].starts_with("Reviewer cited PATH_1;"));
        assert!(reviewed.overall.reason.starts_with("looks fine"));
    }

    #[tokio::test]
    async fn recorded_path_comes_from_the_table_when_risk_agrees() {
        let result = normalize(
            DomainKey::Randomization,
            &json!({
                "signals": {
                    "q1_1": {"answer": "N", "reason": "alternation", "evidence": []},
                    "q1_2": {"answer": "Y", "reason": "envelopes", "evidence": []},
                    "q1_3": {"answer": "N", "reason": "balanced", "evidence": []}
                },
                "overall": {"risk": "High risk", "reason": "not random", "evidence": []}
            }),
        );
        let verdict = json!({
            "needs_revision": false,
            "path": "PATH_1: q1_1[Y|PY|NI] -> Low risk",
            "confidence": 0.6
        });
        let model = Arc::new(ScriptedModel::always(&verdict.to_string()));
        let reviewed = reviewer(model, ReviewStandards::default()).review(result).await;

        let expected = "PATH_3: q1_1[N|PN] -> High risk";
        assert_eq!(reviewed.overall.risk, RiskLevel::High);
        assert_eq!(reviewed.decision_path.as_deref(), Some(expected));
        let info = reviewed.review_info.unwrap();
        assert_eq!(info.decision_path, expected);
        assert!(!info.was_revised);
        assert_eq!(
            info.revision_reasons,
            vec![format!(
                "Reviewer cited PATH_1: q1_1[Y|PY|NI] -> Low risk; decision table selects {expected}"
            )]
        );
    }

    #[test]
    fn path_ids_split_multi_part_labels() {
        assert_eq!(path_ids("PATH_3"), vec!["PATH_3"]);
        assert_eq!(
            path_ids("PATH_1: q2_1[N] -> Low risk + PATH_5: q2_6[Y] -> Low risk"),
            vec!["PATH_1", "PATH_5"]
        );
    }

    #[tokio::test]
    async fn consistent_result_records_no_reasons() {
        let mut result = non_random_but_low();
        result.overall.risk = RiskLevel::High;
        let verdict = json!({
            "needs_revision": false,
            "path": "PATH_3: q1_1[N|PN] -> High risk",
            "confidence": 0.8
        });
        let model = Arc::new(ScriptedModel::always(&verdict.to_string()));
        let reviewed = reviewer(model, ReviewStandards::default()).review(result).await;

        let info = reviewed.review_info.unwrap();
        assert!(!info.was_revised);
        assert!(info.revision_reasons.is_empty());
        assert_eq!(info.confidence, 0.8);
    }

    #[tokio::test]
    async fn failure_marks_review_failed() {
        let model = Arc::new(ScriptedModel::always("I cannot answer that."));
        let original = non_random_but_low();
        let reviewed = reviewer(model, ReviewStandards::default())
            .review(original.clone())
            .await;

        assert_eq!(reviewed.decision_path.as_deref(), Some(REVIEW_FAILED));
        assert_eq!(reviewed.overall, original.overall);
        assert_eq!(reviewed.signals, original.signals);
        let info = reviewed.review_info.unwrap();
        assert_eq!(info.confidence, 0.0);
        assert!(!info.was_revised);
        assert!(info.revision_reasons[0].starts_with("Review failed: "));
    }

    #[tokio::test]
    async fn defaulted_evaluations_are_not_reviewed() {
        let model = Arc::new(ScriptedModel::always("{}"));
        let reviewer = reviewer(model.clone(), ReviewStandards::default());
        let result = reviewer
            .review_evaluation(Evaluation::Defaulted {
                key: DomainKey::Selection,
                cause: "down".into(),
            })
            .await;

        assert_eq!(model.calls(), 0);
        assert!(result.review_info.is_none());
        assert!(result.signals.values().all(|s| s.answer == SignalAnswer::NI));
    }

    #[tokio::test]
    async fn custom_standards_reach_the_prompt() {
        let standards = ReviewStandards::from_json(
            r#"{"review_standards": {
                "randomization": "CUSTOM RANDOMIZATION PATHS",
                "default": "CUSTOM PRINCIPLES",
                "domain_x": "ignored"
            }}"#,
        )
        .unwrap();
        let verdict = json!({"needs_revision": false, "path": "", "confidence": 0.5});
        let model = Arc::new(ScriptedModel::always(&verdict.to_string()));
        reviewer(model.clone(), standards)
            .review(non_random_but_low())
            .await;

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("CUSTOM RANDOMIZATION PATHS"));
        assert!(prompt.contains("CUSTOM PRINCIPLES"));
        assert!(!prompt.contains("## Decision Path Principles"));
    }

    #[test]
    fn built_in_standards_render_tables() {
        let standards = ReviewStandards::default();
        assert!(standards.standard(DomainKey::Selection).contains("PATH_4"));
        assert_eq!(standards.principles(), REVIEW_PRINCIPLES);
    }

    #[test]
    fn standards_file_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standards.json");
        std::fs::write(&path, "not json").unwrap();
        let err = ReviewStandards::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Standards { .. }));

        let missing = ReviewStandards::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
