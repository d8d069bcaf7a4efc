//! Judgement records produced by an evaluation run.
//!
//! All records serialize to the JSON shape reporters consume: domain rows
//! carry `"signals"`, the overall row carries `"judgement"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::answer::{OverallRisk, RiskLevel, RiskValue, SignalAnswer};
use crate::schema::{DomainKey, schema};

/// Page index used when the source page is not known.
pub const UNKNOWN_PAGE: i64 = -1;

/// Domain label of the aggregate row.
pub const OVERALL_DOMAIN: &str = "Overall risk of bias";

const NO_INFORMATION: &str = "No information available";

// ── Evidence ──

/// A verbatim quotation and its source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub text: String,
    #[serde(default = "unknown_page", deserialize_with = "lenient_page")]
    pub page_idx: i64,
}

impl EvidenceItem {
    pub fn new(text: impl Into<String>, page_idx: i64) -> Self {
        Self {
            text: text.into(),
            page_idx,
        }
    }
}

fn unknown_page() -> i64 {
    UNKNOWN_PAGE
}

/// Accept integers, integral floats, numeric strings, or null.
///
/// Anything unusable becomes [`UNKNOWN_PAGE`] rather than failing the whole
/// record.
pub fn lenient_page<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map_or(UNKNOWN_PAGE, page_from_value))
}

/// Interpret a JSON value as a page index.
pub fn page_from_value(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .unwrap_or(UNKNOWN_PAGE),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(UNKNOWN_PAGE),
        _ => UNKNOWN_PAGE,
    }
}

// ── Domain rows ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalJudgement {
    pub answer: SignalAnswer,
    pub reason: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

impl SignalJudgement {
    /// The judgement recorded when nothing usable was returned for a signal.
    pub fn no_information() -> Self {
        Self {
            answer: SignalAnswer::NI,
            reason: NO_INFORMATION.to_string(),
            evidence: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainJudgement {
    pub risk: RiskLevel,
    pub reason: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

/// Reviewer annotation attached to a domain result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewInfo {
    pub was_revised: bool,
    pub decision_path: String,
    #[serde(default)]
    pub revision_reasons: Vec<String>,
    pub confidence: f64,
    /// RFC 3339 timestamp.
    pub reviewed_at: String,
    pub reviewer_domain: DomainKey,
}

/// Judgement for one domain of one study.
///
/// `signals` holds exactly the schema's signal ids; ids sort in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    pub domain_key: DomainKey,
    pub domain: String,
    pub signals: BTreeMap<String, SignalJudgement>,
    pub overall: DomainJudgement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_info: Option<ReviewInfo>,
}

impl DomainResult {
    /// The result used when a domain could not be evaluated: every signal
    /// `NI`, overall `Some concerns`.
    pub fn defaulted(key: DomainKey) -> Self {
        let schema = schema(key);
        let signals = schema
            .signal_ids()
            .map(|id| (id.to_string(), SignalJudgement::no_information()))
            .collect();
        Self {
            domain_key: key,
            domain: schema.domain_name.to_string(),
            signals,
            overall: DomainJudgement {
                risk: RiskLevel::SomeConcerns,
                reason: "No information available to assess this domain".to_string(),
                evidence: Vec::new(),
            },
            decision_path: None,
            review_info: None,
        }
    }

    /// Answer recorded for a signal, if present.
    pub fn answer(&self, signal_id: &str) -> Option<SignalAnswer> {
        self.signals.get(signal_id).map(|s| s.answer)
    }

    pub fn risk(&self) -> DomainRisk {
        DomainRisk {
            domain: self.domain.clone(),
            risk: self.overall.risk.into(),
        }
    }
}

// ── Overall row ──

/// One domain's contribution to the overall verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRisk {
    pub domain: String,
    pub risk: RiskValue,
}

impl DomainRisk {
    pub fn new(domain: impl Into<String>, risk: impl Into<RiskValue>) -> Self {
        Self {
            domain: domain.into(),
            risk: risk.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallJudgement {
    pub overall: OverallRisk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub domain: String,
    pub judgement: OverallJudgement,
    pub reasoning: String,
    pub evidence: Vec<DomainRisk>,
}

impl AggregateResult {
    pub fn overall(&self) -> OverallRisk {
        self.judgement.overall
    }
}

/// One row of a study's result list. The aggregate row is always last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultRow {
    Domain(DomainResult),
    Overall(AggregateResult),
}

impl ResultRow {
    pub fn as_domain(&self) -> Option<&DomainResult> {
        match self {
            Self::Domain(d) => Some(d),
            Self::Overall(_) => None,
        }
    }

    pub fn as_overall(&self) -> Option<&AggregateResult> {
        match self {
            Self::Overall(a) => Some(a),
            Self::Domain(_) => None,
        }
    }
}
