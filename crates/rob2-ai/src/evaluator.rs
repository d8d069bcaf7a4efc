//! Domain evaluation: one model call per domain, normalized into a
//! [`DomainResult`] that matches the domain's schema exactly.

use std::collections::BTreeMap;
use std::sync::Arc;

use rob2_core::judgement::page_from_value;
use rob2_core::{
    DomainJudgement, DomainKey, DomainResult, EvidenceItem, RiskLevel, SignalAnswer,
    SignalJudgement, UNKNOWN_PAGE, schema,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::ModelCaller;
use crate::prompt::PromptRenderer;

/// Outcome of evaluating one domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Evaluated(DomainResult),
    /// No usable model output; the domain takes its default result.
    Defaulted { key: DomainKey, cause: String },
}

impl Evaluation {
    pub fn key(&self) -> DomainKey {
        match self {
            Self::Evaluated(result) => result.domain_key,
            Self::Defaulted { key, .. } => *key,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Self::Defaulted { .. })
    }

    pub fn into_result(self) -> DomainResult {
        match self {
            Self::Evaluated(result) => result,
            Self::Defaulted { key, .. } => DomainResult::defaulted(key),
        }
    }
}

impl From<Evaluation> for DomainResult {
    fn from(evaluation: Evaluation) -> Self {
        evaluation.into_result()
    }
}

pub struct DomainEvaluator {
    caller: ModelCaller,
    prompts: Arc<dyn PromptRenderer>,
}

impl DomainEvaluator {
    pub fn new(caller: ModelCaller, prompts: Arc<dyn PromptRenderer>) -> Self {
        Self { caller, prompts }
    }

    pub async fn evaluate(&self, items: &[EvidenceItem], key: DomainKey) -> Evaluation {
        if items.is_empty() {
            info!(domain = %key, "no evidence items, using default result");
            return Evaluation::Defaulted {
                key,
                cause: "no evidence items".to_string(),
            };
        }

        let prompt = self.prompts.domain_evaluation(schema(key), items);
        match self.caller.structured::<Value>(&prompt).await {
            Ok(raw) => {
                let result = normalize(key, &raw);
                info!(domain = %key, risk = %result.overall.risk, "domain evaluated");
                Evaluation::Evaluated(result)
            }
            Err(e) => {
                warn!(domain = %key, error = %e, "domain evaluation failed, using default result");
                Evaluation::Defaulted {
                    key,
                    cause: e.to_string(),
                }
            }
        }
    }
}

// ── Normalization ──

/// Coerce raw model output into a schema-exact [`DomainResult`].
///
/// Keeps exactly the schema's signal ids (missing ones become `NI`, unknown
/// ones are dropped), maps answers leniently and replaces answers the signal
/// does not allow with `NI`. An unrecognized overall risk becomes
/// `Some concerns`.
pub fn normalize(key: DomainKey, raw: &Value) -> DomainResult {
    let schema = schema(key);
    let raw_signals = raw.get("signals").and_then(Value::as_object);

    let mut signals = BTreeMap::new();
    for question in schema.signals {
        let judgement = match raw_signals.and_then(|s| s.get(question.id)) {
            Some(value) => {
                let mut judgement = signal_judgement(value);
                if !question.allows(judgement.answer) {
                    warn!(
                        domain = %key,
                        signal = question.id,
                        answer = %judgement.answer,
                        "answer not allowed for signal, using NI"
                    );
                    judgement.answer = SignalAnswer::NI;
                }
                judgement
            }
            None => {
                warn!(domain = %key, signal = question.id, "signal missing from response");
                SignalJudgement::no_information()
            }
        };
        signals.insert(question.id.to_string(), judgement);
    }

    if let Some(extra) = raw_signals {
        for id in extra.keys().filter(|id| schema.signal(id).is_none()) {
            warn!(domain = %key, signal = %id, "dropping unknown signal");
        }
    }

    DomainResult {
        domain_key: key,
        domain: schema.domain_name.to_string(),
        signals,
        overall: overall_judgement(key, raw.get("overall")),
        decision_path: None,
        review_info: None,
    }
}

fn signal_judgement(value: &Value) -> SignalJudgement {
    // A bare string is taken as the answer code.
    if let Some(answer) = value.as_str() {
        return SignalJudgement {
            answer: SignalAnswer::parse_lenient(answer).unwrap_or(SignalAnswer::NI),
            reason: String::new(),
            evidence: Vec::new(),
        };
    }
    let answer = value
        .get("answer")
        .and_then(Value::as_str)
        .and_then(SignalAnswer::parse_lenient)
        .unwrap_or(SignalAnswer::NI);
    SignalJudgement {
        answer,
        reason: text_field(value, "reason"),
        evidence: evidence_list(value.get("evidence")),
    }
}

fn overall_judgement(key: DomainKey, value: Option<&Value>) -> DomainJudgement {
    let Some(value) = value else {
        warn!(domain = %key, "overall judgement missing, using Some concerns");
        return DomainJudgement {
            risk: RiskLevel::SomeConcerns,
            reason: "No overall judgement was returned".to_string(),
            evidence: Vec::new(),
        };
    };

    let raw_risk = value.get("risk").and_then(Value::as_str).unwrap_or_default();
    let risk = RiskLevel::parse_lenient(raw_risk).unwrap_or_else(|| {
        warn!(domain = %key, risk = raw_risk, "unrecognized overall risk, using Some concerns");
        RiskLevel::SomeConcerns
    });
    DomainJudgement {
        risk,
        reason: text_field(value, "reason"),
        evidence: evidence_list(value.get("evidence")),
    }
}

fn text_field(value: &Value, field: &str) -> String {
    match value.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Accept a list of `{text, page_idx}` objects, a list of strings, or a
/// single string.
fn evidence_list(value: Option<&Value>) -> Vec<EvidenceItem> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ (Value::String(_) | Value::Object(_))) => vec![v],
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(EvidenceItem::new(text.clone(), UNKNOWN_PAGE)),
            Value::Object(_) => {
                let text = item.get("text").and_then(Value::as_str)?;
                let page = item.get("page_idx").map_or(UNKNOWN_PAGE, page_from_value);
                Some(EvidenceItem::new(text, page))
            }
            _ => None,
        })
        .filter(|e| !e.text.trim().is_empty())
        .collect()
}
