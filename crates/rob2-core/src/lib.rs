//! Core ROB2 domain model: answer vocabularies, judgement records, signal
//! schemas, decision-path tables, and the overall-risk aggregator.
//!
//! Everything here is pure data and deterministic logic. Model calls live in
//! `rob2-ai`; storage lives in `rob2-store`.

pub mod aggregate;
pub mod answer;
pub mod block;
mod error;
pub mod judgement;
pub mod paths;
pub mod schema;

pub use aggregate::{AGGREGATION_RULE_SET, aggregate, risks_from_rows};
pub use answer::{OverallRisk, RiskLevel, RiskValue, SignalAnswer};
pub use block::TextBlock;
pub use error::CoreError;
pub use judgement::{
    AggregateResult, DomainJudgement, DomainResult, DomainRisk, EvidenceItem, OverallJudgement,
    OVERALL_DOMAIN, ResultRow, ReviewInfo, SignalJudgement, UNKNOWN_PAGE,
};
pub use paths::{Condition, DecisionPath, DecisionTable, REVIEW_PRINCIPLES, Resolution, table};
pub use schema::{AnalysisType, DomainKey, DomainSchema, SignalQuestion, schema};
