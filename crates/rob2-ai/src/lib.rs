//! ROB2 evaluation pipeline over a language model: entry filter, analysis-type
//! selection, domain evaluation, decision-path review, orchestration.

pub mod analysis;
pub mod config;
mod error;
pub mod evaluator;
pub mod filter;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod reviewer;

#[cfg(test)]
mod testing;

pub use analysis::AnalysisSelector;
pub use config::{CacheConfig, FilterConfig, ModelConfig, ReviewConfig, Rob2Config};
pub use error::{ConfigError, LlmError};
pub use evaluator::{DomainEvaluator, Evaluation};
pub use filter::EntryFilter;
pub use llm::{CompletionRequest, HttpModel, LanguageModel, ModelCaller, Provider};
pub use orchestrator::Orchestrator;
pub use prompt::{DefaultPrompts, PromptRenderer};
pub use reviewer::{DecisionReviewer, REVIEW_FAILED, ReviewStandards, ReviewVerdict};
