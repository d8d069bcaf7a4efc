//! Subcommand implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rob2_ai::{Orchestrator, Rob2Config};
use rob2_core::{
    DomainKey, REVIEW_PRINCIPLES, ResultRow, aggregate, risks_from_rows, schema, table,
};
use rob2_store::{FileCache, FileOutcome, Report, load_blocks};
use tracing::{error, info, warn};

use crate::cli::{AggregateArgs, DomainArgs, EvaluateArgs};
use crate::display;

pub fn load_config(path: Option<&Path>) -> Result<Rob2Config> {
    Rob2Config::load_with_dotenv(path).context("loading configuration")
}

// ── evaluate ──

pub async fn evaluate(args: EvaluateArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let orchestrator = Orchestrator::from_config(&config).context("building evaluation pipeline")?;
    let cache = config.cache.enabled.then(|| FileCache::new(&config.cache.dir));
    info!(
        files = args.inputs.len(),
        provider = %config.model.provider,
        model = %config.model.name,
        filter = config.filter.enabled,
        review = config.review.enabled,
        cache = config.cache.enabled,
        "starting evaluation"
    );

    let report = run_batch(&orchestrator, cache.as_ref(), &args.inputs).await;
    report
        .write(&args.output)
        .with_context(|| format!("writing report to {}", args.output.display()))?;

    print!("{}", display::render_summary(&report));
    println!("\nReport written to {}", args.output.display());
    Ok(())
}

/// Evaluate each file in turn. A failed file becomes an error record keyed by
/// that file and the batch moves on.
pub async fn run_batch(
    orchestrator: &Orchestrator,
    cache: Option<&FileCache>,
    inputs: &[PathBuf],
) -> Report {
    let mut report = Report::new();
    for path in inputs {
        let file_id = path.display().to_string();
        let outcome = match evaluate_file(orchestrator, cache, path).await {
            Ok(rows) => FileOutcome::Evaluated(rows),
            Err(e) => {
                let message = format!("{e:#}");
                error!(file = %file_id, error = %message, "evaluation failed");
                FileOutcome::Failed(message)
            }
        };
        report.record(file_id, outcome);
    }
    report
}

async fn evaluate_file(
    orchestrator: &Orchestrator,
    cache: Option<&FileCache>,
    path: &Path,
) -> Result<Vec<ResultRow>> {
    if let Some(cache) = cache
        && let Some(rows) = cache.get_for(path)?
    {
        info!(file = %path.display(), "using cached result");
        return Ok(rows);
    }

    let blocks = load_blocks(path)?;
    let rows = orchestrator
        .assess(&blocks)
        .await
        .context("relevance filtering failed")?;

    if let Some(cache) = cache
        && let Err(e) = cache.put_for(path, &rows)
    {
        warn!(file = %path.display(), error = %e, "could not cache result");
    }
    Ok(rows)
}

// ── aggregate ──

pub fn aggregate_file(args: &AggregateArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let rows: Vec<serde_json::Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of result rows", args.input.display()))?;
    let result = aggregate(&risks_from_rows(&rows));
    print!("{}", display::render_aggregate(&result));
    Ok(())
}

// ── schema / paths ──

fn selected(args: &DomainArgs) -> Vec<DomainKey> {
    match args.domain {
        Some(key) => vec![key],
        None => DomainKey::ALL.to_vec(),
    }
}

pub fn print_schema(args: &DomainArgs) {
    for key in selected(args) {
        println!("{}", display::render_schema(schema(key)));
    }
}

pub fn print_paths(args: &DomainArgs) {
    for key in selected(args) {
        println!("{}", table(key).render());
    }
    println!("{REVIEW_PRINCIPLES}");
}

// ── config ──

pub fn print_config(config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if config.model.api_key.is_some() {
        config.model.api_key = Some("<redacted>".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rob2_ai::{CompletionRequest, LanguageModel, LlmError};
    use rob2_core::OverallRisk;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Says "yes" to relevance, "assignment" to analysis type, and rates
    /// every domain Low risk.
    #[derive(Default)]
    struct LowRiskModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for LowRiskModel {
        fn name(&self) -> &str {
            "low-risk"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = &request.prompt;
            Ok(if prompt.contains("Answer only 'yes' or 'no'.") {
                "yes".to_string()
            } else if prompt.contains("'assignment' or 'adherence'") {
                "assignment".to_string()
            } else {
                r#"{"signals": {}, "overall": {"risk": "Low risk", "reason": "r", "evidence": []}}"#
                    .to_string()
            })
        }
    }

    fn orchestrator(model: Arc<LowRiskModel>) -> Orchestrator {
        let mut config = Rob2Config::default();
        config.review.enabled = false;
        Orchestrator::with_models(model, None, &config).unwrap()
    }

    #[tokio::test]
    async fn failed_file_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.md");
        std::fs::write(&good, "# Methods\n\nPatients were randomized by computer.").unwrap();
        let missing = dir.path().join("missing.json");
        let unsupported = dir.path().join("paper.pdf");
        std::fs::write(&unsupported, b"%PDF").unwrap();

        let model = Arc::new(LowRiskModel::default());
        let report = run_batch(
            &orchestrator(model),
            None,
            &[missing.clone(), good.clone(), unsupported.clone()],
        )
        .await;

        let errors: Vec<(&str, &str)> = report.errors().collect();
        assert_eq!(errors.len(), 2);
        let missing_id = missing.display().to_string();
        assert!(errors.iter().any(|(id, e)| *id == missing_id && e.contains("not found")));
        assert!(errors.iter().any(|(_, e)| e.contains("unsupported")));
        assert_eq!(report.results().count(), 1);
        assert_eq!(report.overall(&good.display().to_string()), Some(OverallRisk::Low));
    }

    #[tokio::test]
    async fn cached_results_skip_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let paper = dir.path().join("paper.txt");
        std::fs::write(&paper, "Allocation was concealed with sealed envelopes.").unwrap();
        let cache = FileCache::new(dir.path().join("cache"));

        let model = Arc::new(LowRiskModel::default());
        let orchestrator = orchestrator(model.clone());
        let first = run_batch(&orchestrator, Some(&cache), &[paper.clone()]).await;
        let calls = model.calls.load(Ordering::SeqCst);
        assert!(calls > 0);

        let second = run_batch(&orchestrator, Some(&cache), &[paper]).await;
        assert_eq!(model.calls.load(Ordering::SeqCst), calls);
        assert_eq!(first, second);
    }
}
