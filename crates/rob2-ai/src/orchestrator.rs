//! Evaluation orchestrator: one document's evidence in, ordered result rows out.
//!
//! Two barriers per document. All domain evaluations finish before any review
//! starts, and all reviews finish before aggregation.

use std::sync::Arc;

use futures::future::join_all;
use rob2_core::{DomainKey, DomainResult, DomainRisk, EvidenceItem, ResultRow, TextBlock, aggregate};
use tracing::info;

use crate::analysis::AnalysisSelector;
use crate::config::Rob2Config;
use crate::error::{ConfigError, LlmError};
use crate::evaluator::{DomainEvaluator, Evaluation};
use crate::filter::EntryFilter;
use crate::llm::{HttpModel, LanguageModel, ModelCaller};
use crate::prompt::{DefaultPrompts, PromptRenderer};
use crate::reviewer::{DecisionReviewer, ReviewStandards};

pub struct Orchestrator {
    selector: AnalysisSelector,
    evaluator: DomainEvaluator,
    reviewer: Option<DecisionReviewer>,
    filter: Option<EntryFilter>,
}

impl Orchestrator {
    /// Selector and evaluators only: no entry filter, no review.
    pub fn new(caller: ModelCaller, prompts: Arc<dyn PromptRenderer>) -> Self {
        Self {
            selector: AnalysisSelector::new(caller.clone(), prompts.clone()),
            evaluator: DomainEvaluator::new(caller, prompts),
            reviewer: None,
            filter: None,
        }
    }

    pub fn with_reviewer(mut self, reviewer: DecisionReviewer) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn with_filter(mut self, filter: EntryFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Build the HTTP-backed pipeline described by `config`.
    pub fn from_config(config: &Rob2Config) -> Result<Self, ConfigError> {
        let http = HttpModel::from_config(&config.model)?;
        let filter_model: Option<Arc<dyn LanguageModel>> = config
            .filter
            .model
            .as_deref()
            .map(|name| Arc::new(http.with_model(name)) as Arc<dyn LanguageModel>);
        Self::with_models(Arc::new(http), filter_model, config)
    }

    /// Build the pipeline around the given models. The filter uses
    /// `filter_model` when present, else `model`.
    pub fn with_models(
        model: Arc<dyn LanguageModel>,
        filter_model: Option<Arc<dyn LanguageModel>>,
        config: &Rob2Config,
    ) -> Result<Self, ConfigError> {
        let prompts: Arc<dyn PromptRenderer> = Arc::new(DefaultPrompts);
        let caller = ModelCaller::from_config(model.clone(), &config.model);
        let mut orchestrator = Self::new(caller.clone(), prompts.clone());

        if config.review.enabled {
            let standards = match &config.review.standards_path {
                Some(path) => ReviewStandards::from_file(path)?,
                None => ReviewStandards::default(),
            };
            let reviewer = DecisionReviewer::new(caller, prompts.clone(), standards);
            orchestrator = orchestrator.with_reviewer(reviewer);
        }

        if config.filter.enabled {
            let filter_caller =
                ModelCaller::from_config(filter_model.unwrap_or(model), &config.model);
            orchestrator = orchestrator.with_filter(EntryFilter::new(
                filter_caller,
                prompts,
                config.filter.clone(),
            ));
        }

        Ok(orchestrator)
    }

    /// Filter raw blocks (when a filter is set), then evaluate the rest.
    ///
    /// Only the entry filter can fail; evaluation itself always yields rows.
    pub async fn assess(&self, blocks: &[TextBlock]) -> Result<Vec<ResultRow>, LlmError> {
        let kept = match &self.filter {
            Some(filter) => filter.filter(blocks).await?,
            None => blocks.to_vec(),
        };
        let items: Vec<EvidenceItem> = kept
            .iter()
            .filter(|b| b.has_text())
            .map(TextBlock::to_evidence)
            .collect();
        info!(blocks = blocks.len(), items = items.len(), "evidence prepared");
        Ok(self.evaluate(&items).await)
    }

    /// Domain results in canonical order followed by the aggregate row.
    pub async fn evaluate(&self, items: &[EvidenceItem]) -> Vec<ResultRow> {
        let analysis = self.selector.select(items).await;
        let keys = DomainKey::for_analysis(analysis);

        let evaluations: Vec<Evaluation> =
            join_all(keys.iter().map(|&key| self.evaluator.evaluate(items, key))).await;
        let defaulted = evaluations.iter().filter(|e| e.is_defaulted()).count();

        let results: Vec<DomainResult> = match &self.reviewer {
            Some(reviewer) => {
                join_all(
                    evaluations
                        .into_iter()
                        .map(|evaluation| reviewer.review_evaluation(evaluation)),
                )
                .await
            }
            None => evaluations.into_iter().map(Evaluation::into_result).collect(),
        };

        let risks: Vec<DomainRisk> = results.iter().map(DomainResult::risk).collect();
        let overall = aggregate(&risks);
        info!(
            analysis = %analysis,
            domains = results.len(),
            defaulted,
            overall = %overall.overall(),
            "document evaluated"
        );

        results
            .into_iter()
            .map(ResultRow::Domain)
            .chain(std::iter::once(ResultRow::Overall(overall)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use pretty_assertions::assert_eq;
    use rob2_core::{OverallRisk, RiskLevel};
    use serde_json::json;
    use std::time::Duration;

    fn evaluation(signals: serde_json::Value, risk: &str) -> String {
        json!({"signals": signals, "overall": {"risk": risk, "reason": "r", "evidence": []}})
            .to_string()
    }

    /// Routes prompts by their heading and domain name.
    fn routed(prompt: &str) -> Result<String, LlmError> {
        if prompt.contains("decide which effect Domain 2") {
            return Ok("adherence".into());
        }
        if prompt.starts_with("# ROB2 Decision Path Review") {
            return Ok(json!({"needs_revision": false, "path": "", "confidence": 0.7}).to_string());
        }
        if prompt.contains("\"Domain 1:") {
            return Ok(evaluation(json!({"q1_1": "Y", "q1_2": "Y", "q1_3": "N"}), "Low risk"));
        }
        Ok(evaluation(json!({}), "Some concerns"))
    }

    fn items() -> Vec<EvidenceItem> {
        vec![EvidenceItem::new("Participants were randomized by computer.", 1)]
    }

    fn caller(model: Arc<ScriptedModel>) -> ModelCaller {
        ModelCaller::new(model).with_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn rows_follow_canonical_order_with_aggregate_last() {
        let model = Arc::new(ScriptedModel::new(routed));
        let orchestrator = Orchestrator::new(caller(model.clone()), Arc::new(DefaultPrompts));

        let rows = orchestrator.evaluate(&items()).await;

        assert_eq!(rows.len(), 6);
        let keys: Vec<DomainKey> = rows
            .iter()
            .filter_map(|r| r.as_domain())
            .map(|d| d.domain_key)
            .collect();
        assert_eq!(keys, DomainKey::for_analysis(rob2_core::AnalysisType::Adherence).to_vec());
        let overall = rows[5].as_overall().unwrap();
        assert_eq!(overall.evidence.len(), 5);
        assert_eq!(overall.overall(), OverallRisk::SomeConcerns);
        // One selector call and five evaluations.
        assert_eq!(model.calls(), 6);
    }

    #[tokio::test]
    async fn review_runs_after_every_evaluation() {
        let model = Arc::new(ScriptedModel::new(routed));
        let prompts: Arc<dyn PromptRenderer> = Arc::new(DefaultPrompts);
        let orchestrator = Orchestrator::new(caller(model.clone()), prompts.clone()).with_reviewer(
            DecisionReviewer::new(caller(model.clone()), prompts, ReviewStandards::default()),
        );

        let rows = orchestrator.evaluate(&items()).await;

        let prompts = model.prompts();
        let first_review = prompts
            .iter()
            .position(|p| p.starts_with("# ROB2 Decision Path Review"))
            .unwrap();
        assert_eq!(first_review, 6);
        assert_eq!(prompts.len(), 11);
        for row in &rows[..5] {
            assert!(row.as_domain().unwrap().review_info.is_some());
        }
        let randomization = rows[0].as_domain().unwrap();
        assert_eq!(randomization.overall.risk, RiskLevel::Low);
    }

    #[tokio::test]
    async fn failed_evaluations_default_and_skip_review() {
        let model = Arc::new(ScriptedModel::new(|prompt| {
            if prompt.contains("decide which effect Domain 2") {
                Ok("assignment".into())
            } else {
                Err(LlmError::Other("down".into()))
            }
        }));
        let prompts: Arc<dyn PromptRenderer> = Arc::new(DefaultPrompts);
        let orchestrator = Orchestrator::new(caller(model.clone()), prompts.clone()).with_reviewer(
            DecisionReviewer::new(caller(model.clone()), prompts, ReviewStandards::default()),
        );

        let rows = orchestrator.evaluate(&items()).await;

        // One selector call plus three attempts per domain; no reviews.
        assert_eq!(model.calls(), 1 + 5 * 3);
        for row in &rows[..5] {
            let result = row.as_domain().unwrap();
            assert_eq!(*result, DomainResult::defaulted(result.domain_key));
        }
        assert_eq!(rows[5].as_overall().unwrap().overall(), OverallRisk::SomeConcerns);
    }

    #[tokio::test]
    async fn empty_document_still_yields_full_rows() {
        let model = Arc::new(ScriptedModel::always("yes"));
        let orchestrator = Orchestrator::new(caller(model.clone()), Arc::new(DefaultPrompts));

        let rows = orchestrator.assess(&[]).await.unwrap();

        assert_eq!(model.calls(), 0);
        assert_eq!(rows.len(), 6);
        assert_eq!(
            rows[1].as_domain().unwrap().domain_key,
            DomainKey::DeviationAssignment
        );
    }

    #[tokio::test]
    async fn config_disables_filter_and_review() {
        let mut config = Rob2Config::default();
        config.filter.enabled = false;
        config.review.enabled = false;
        let model = Arc::new(ScriptedModel::always("{}"));
        let orchestrator = Orchestrator::with_models(model, None, &config).unwrap();
        assert!(orchestrator.filter.is_none());
        assert!(orchestrator.reviewer.is_none());

        let config = Rob2Config::default();
        let model = Arc::new(ScriptedModel::always("{}"));
        let orchestrator = Orchestrator::with_models(model, None, &config).unwrap();
        assert!(orchestrator.filter.is_some());
        assert!(orchestrator.reviewer.is_some());
    }
}
