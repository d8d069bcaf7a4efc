//! Analysis-type selection for domain 2.

use std::sync::Arc;

use rob2_core::{AnalysisType, EvidenceItem};
use tracing::{info, warn};

use crate::llm::ModelCaller;
use crate::prompt::PromptRenderer;

pub struct AnalysisSelector {
    caller: ModelCaller,
    prompts: Arc<dyn PromptRenderer>,
}

impl AnalysisSelector {
    pub fn new(caller: ModelCaller, prompts: Arc<dyn PromptRenderer>) -> Self {
        Self { caller, prompts }
    }

    /// Decide which domain-2 effect to assess. Never fails: an unusable
    /// answer or a failed call selects [`AnalysisType::Assignment`].
    pub async fn select(&self, items: &[EvidenceItem]) -> AnalysisType {
        if items.is_empty() {
            info!("no evidence, assuming assignment analysis");
            return AnalysisType::Assignment;
        }
        match self.caller.text(&self.prompts.analysis_type(items)).await {
            Ok(answer) => {
                let selected = parse_answer(&answer);
                info!(analysis = %selected, "analysis type selected");
                selected
            }
            Err(e) => {
                warn!(error = %e, "analysis type selection failed, assuming assignment");
                AnalysisType::Assignment
            }
        }
    }
}

/// `Adherence` when the answer mentions adherence anywhere, else `Assignment`.
pub fn parse_answer(answer: &str) -> AnalysisType {
    if answer.to_ascii_lowercase().contains("adherence") {
        AnalysisType::Adherence
    } else {
        AnalysisType::Assignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::prompt::DefaultPrompts;
    use crate::testing::ScriptedModel;
    use std::time::Duration;

    fn selector(model: ScriptedModel) -> (Arc<ScriptedModel>, AnalysisSelector) {
        let model = Arc::new(model);
        let caller = ModelCaller::new(model.clone()).with_backoff(Duration::ZERO);
        (model, AnalysisSelector::new(caller, Arc::new(DefaultPrompts)))
    }

    fn items() -> Vec<EvidenceItem> {
        vec![EvidenceItem::new("Per-protocol analysis was performed.", 5)]
    }

    #[test]
    fn answer_matching() {
        assert_eq!(parse_answer("Adherence"), AnalysisType::Adherence);
        assert_eq!(
            parse_answer("'adherence' (per-protocol)"),
            AnalysisType::Adherence
        );
        assert_eq!(parse_answer("assignment"), AnalysisType::Assignment);
        assert_eq!(parse_answer("unsure"), AnalysisType::Assignment);
    }

    #[tokio::test]
    async fn model_answer_selects_adherence() {
        let (_, selector) = selector(ScriptedModel::always("ADHERENCE"));
        assert_eq!(selector.select(&items()).await, AnalysisType::Adherence);
    }

    #[tokio::test]
    async fn failure_defaults_to_assignment() {
        let (model, selector) =
            selector(ScriptedModel::new(|_| Err(LlmError::Other("down".into()))));
        assert_eq!(selector.select(&items()).await, AnalysisType::Assignment);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn empty_evidence_skips_the_model() {
        let (model, selector) = selector(ScriptedModel::always("adherence"));
        assert_eq!(selector.select(&[]).await, AnalysisType::Assignment);
        assert_eq!(model.calls(), 0);
    }
}
