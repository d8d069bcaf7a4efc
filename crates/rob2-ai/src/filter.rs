//! Entry filter: coarse relevance classification over extracted text blocks.
//!
//! Scanning stops at the first level-1 references heading. Short blocks are
//! grouped so one query covers several of them. Every relevant unit keeps its
//! neighbors within the context window so the retained text stays readable.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use futures::stream::{self, StreamExt};
use regex::Regex;
use rob2_core::TextBlock;
use tracing::{debug, info};

use crate::config::FilterConfig;
use crate::error::LlmError;
use crate::llm::ModelCaller;
use crate::prompt::PromptRenderer;

static REFERENCES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:\d+(?:\.\d+)*|[ivxlc]+)\.?\s+)?(?:references?|bibliography|literature\s+cited|works\s+cited)\s*:?\s*$",
    )
    .expect("references pattern is valid")
});

/// Whether a block starts the references section.
pub fn is_references_heading(block: &TextBlock) -> bool {
    block.is_top_heading() && REFERENCES_HEADING.is_match(&block.text)
}

/// Number of leading blocks eligible for classification.
pub fn scan_limit(blocks: &[TextBlock]) -> usize {
    blocks
        .iter()
        .position(is_references_heading)
        .unwrap_or(blocks.len())
}

/// Group block indices below `limit` into query units.
///
/// Blocks without text are skipped. A run of consecutive short blocks forms
/// units of at most `batch_size`; any other block is a unit on its own.
pub fn plan_units(
    blocks: &[TextBlock],
    limit: usize,
    short_text_threshold: usize,
    batch_size: usize,
) -> Vec<Vec<usize>> {
    let is_short = |b: &TextBlock| b.text.trim().chars().count() < short_text_threshold;
    let mut units = Vec::new();
    let mut pending: Vec<usize> = Vec::new();

    for (idx, block) in blocks.iter().enumerate().take(limit) {
        if !block.has_text() {
            if !pending.is_empty() {
                units.push(std::mem::take(&mut pending));
            }
            continue;
        }
        if batch_size > 1 && is_short(block) {
            pending.push(idx);
            if pending.len() == batch_size {
                units.push(std::mem::take(&mut pending));
            }
        } else {
            if !pending.is_empty() {
                units.push(std::mem::take(&mut pending));
            }
            units.push(vec![idx]);
        }
    }
    if !pending.is_empty() {
        units.push(pending);
    }
    units
}

/// Indices retained for the relevant units, sorted and deduplicated.
pub fn retained_indices<'a>(
    relevant: impl IntoIterator<Item = &'a Vec<usize>>,
    context_window: usize,
    limit: usize,
) -> Vec<usize> {
    let mut keep = BTreeSet::new();
    for unit in relevant {
        for &idx in unit {
            let start = idx.saturating_sub(context_window);
            let end = idx.saturating_add(context_window).min(limit.saturating_sub(1));
            keep.extend(start..=end);
        }
    }
    keep.into_iter().collect()
}

/// Model-backed relevance filter.
pub struct EntryFilter {
    caller: ModelCaller,
    prompts: Arc<dyn PromptRenderer>,
    config: FilterConfig,
}

impl EntryFilter {
    pub fn new(
        caller: ModelCaller,
        prompts: Arc<dyn PromptRenderer>,
        config: FilterConfig,
    ) -> Self {
        Self {
            caller,
            prompts,
            config,
        }
    }

    /// Blocks relevant to a ROB2 assessment, in original order.
    pub async fn filter(&self, blocks: &[TextBlock]) -> Result<Vec<TextBlock>, LlmError> {
        let limit = scan_limit(blocks);
        if limit < blocks.len() {
            info!(
                heading = %blocks[limit].text.trim(),
                index = limit,
                skipped = blocks.len() - limit,
                "references section found, stopping scan"
            );
        }

        let units = plan_units(
            blocks,
            limit,
            self.config.short_text_threshold,
            self.config.batch_size,
        );

        let verdicts: Vec<Result<bool, LlmError>> = stream::iter(units.iter())
            .map(|unit| self.is_relevant(blocks, unit))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut relevant = Vec::new();
        for (unit, verdict) in units.iter().zip(verdicts) {
            if verdict? {
                relevant.push(unit);
            }
        }

        let kept = retained_indices(relevant.iter().copied(), self.config.context_window, limit);
        info!(
            scanned = limit,
            queries = units.len(),
            kept = kept.len(),
            "entry filter complete"
        );
        Ok(kept.into_iter().map(|i| blocks[i].clone()).collect())
    }

    async fn is_relevant(&self, blocks: &[TextBlock], unit: &[usize]) -> Result<bool, LlmError> {
        let text = unit
            .iter()
            .map(|&i| blocks[i].text.trim())
            .collect::<Vec<_>>()
            .join("\n\n");
        let answer = self.caller.text(&self.prompts.relevance(&text)).await?;
        let relevant = is_yes(&answer);
        debug!(blocks = ?unit, relevant, "relevance verdict");
        Ok(relevant)
    }
}

/// `yes`-prefixed answers, case-insensitive.
pub fn is_yes(answer: &str) -> bool {
    answer
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase()
        .starts_with("yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::DefaultPrompts;
    use crate::testing::ScriptedModel;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn long(text: &str) -> TextBlock {
        TextBlock::text(format!("{text} {}", "x".repeat(100)), 1)
    }

    fn filter_with(model: Arc<ScriptedModel>, config: FilterConfig) -> EntryFilter {
        EntryFilter::new(
            ModelCaller::new(model).with_backoff(Duration::ZERO),
            Arc::new(DefaultPrompts),
            config,
        )
    }

    fn unbatched() -> FilterConfig {
        FilterConfig {
            batch_size: 1,
            ..FilterConfig::default()
        }
    }

    #[test]
    fn references_heading_variants() {
        for text in [
            "REFERENCES",
            "References",
            "7. References",
            "IV. Bibliography",
            "Works Cited:",
        ] {
            assert!(is_references_heading(&TextBlock::heading(text, 9, 1)), "{text}");
        }
        assert!(!is_references_heading(&TextBlock::heading("References", 9, 2)));
        assert!(!is_references_heading(&TextBlock::text("References", 9)));
        assert!(!is_references_heading(&TextBlock::heading(
            "References to prior trials",
            9,
            1
        )));
    }

    #[test]
    fn short_blocks_batch_until_size_or_break() {
        let blocks = vec![
            TextBlock::text("a", 1),
            TextBlock::text("b", 1),
            TextBlock::text("c", 1),
            long("d"),
            TextBlock::text("e", 1),
            TextBlock::default(),
            TextBlock::text("f", 1),
        ];
        let units = plan_units(&blocks, blocks.len(), 80, 2);
        assert_eq!(units, vec![vec![0, 1], vec![2], vec![3], vec![4], vec![6]]);
    }

    #[test]
    fn batches_never_cross_the_limit() {
        let blocks: Vec<TextBlock> = (0..4).map(|i| TextBlock::text(format!("s{i}"), 1)).collect();
        let units = plan_units(&blocks, 2, 80, 5);
        assert_eq!(units, vec![vec![0, 1]]);
    }

    #[test]
    fn window_is_clipped_to_scanned_range() {
        let units = [vec![0], vec![4]];
        assert_eq!(retained_indices(units.iter(), 1, 5), vec![0, 1, 3, 4]);
        assert_eq!(retained_indices(units.iter(), 3, 5), vec![0, 1, 2, 3, 4]);
        assert!(retained_indices(std::iter::empty(), 1, 5).is_empty());
    }

    #[test]
    fn oversized_window_keeps_the_whole_scanned_range() {
        let units = [vec![2]];
        assert_eq!(retained_indices(units.iter(), usize::MAX, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn yes_detection() {
        assert!(is_yes("Yes"));
        assert!(is_yes("  yes, it is relevant"));
        assert!(is_yes("**Yes**"));
        assert!(!is_yes("No"));
        assert!(!is_yes("The answer is yes"));
    }

    #[tokio::test]
    async fn references_section_is_never_queried() {
        let blocks = vec![
            long("Methods: participants were randomized"),
            long("Results"),
            TextBlock::heading("REFERENCES", 9, 1),
            long("Smith J. Randomized trial of allocation concealment."),
            long("Doe A. Blinding in trials."),
        ];
        let model = Arc::new(ScriptedModel::always("yes"));
        let filter = filter_with(model.clone(), unbatched());

        let kept = filter.filter(&blocks).await.unwrap();

        assert_eq!(model.calls(), 2);
        assert!(model.prompts().iter().all(|p| !p.contains("Smith J.")));
        assert_eq!(kept, blocks[..2].to_vec());
    }

    #[tokio::test]
    async fn relevant_block_keeps_neighbors_in_order() {
        let blocks = vec![
            long("Title page"),
            long("Funding"),
            long("Allocation was concealed"),
            long("Acknowledgements"),
            long("Author list"),
        ];
        let model = Arc::new(ScriptedModel::new(|prompt| {
            Ok(if prompt.contains("Allocation") { "Yes." } else { "no" }.to_string())
        }));
        let filter = filter_with(model, unbatched());

        let kept = filter.filter(&blocks).await.unwrap();
        assert_eq!(kept, blocks[1..4].to_vec());
    }

    #[tokio::test]
    async fn classifier_errors_propagate() {
        let model = Arc::new(ScriptedModel::new(|_| Err(LlmError::Other("down".into()))));
        let filter = filter_with(model, unbatched());
        let err = filter.filter(&[long("text")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Exhausted { .. }));
    }

    #[tokio::test]
    async fn batched_query_covers_short_blocks() {
        let blocks = vec![
            TextBlock::text("Randomized.", 1),
            TextBlock::text("Blinded.", 1),
            TextBlock::text("Thanks.", 1),
        ];
        let model = Arc::new(ScriptedModel::always("yes"));
        let filter = filter_with(model.clone(), FilterConfig::default());

        let kept = filter.filter(&blocks).await.unwrap();
        assert_eq!(model.calls(), 1);
        assert!(model.prompts()[0].contains("Randomized.\n\nBlinded.\n\nThanks."));
        assert_eq!(kept.len(), 3);
    }
}
