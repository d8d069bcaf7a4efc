//! Answer vocabularies: signal answer codes and risk levels.
//!
//! Serialized forms are fixed strings (`"PY"`, `"Some concerns"`, ...) because
//! reporters and cached result files match on them verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Answer code for a signal question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalAnswer {
    /// Yes.
    Y,
    /// Probably yes.
    PY,
    /// Probably no.
    PN,
    /// No.
    N,
    /// No information.
    NI,
    /// Not applicable (conditionally skipped; deviation domains only).
    NA,
}

impl SignalAnswer {
    /// The five codes every signal question accepts.
    pub const STANDARD: &'static [SignalAnswer] = &[Self::Y, Self::PY, Self::PN, Self::N, Self::NI];

    /// Standard codes plus `NA`, for conditionally-skipped questions.
    pub const WITH_NOT_APPLICABLE: &'static [SignalAnswer] =
        &[Self::Y, Self::PY, Self::PN, Self::N, Self::NI, Self::NA];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Y => "Y",
            Self::PY => "PY",
            Self::PN => "PN",
            Self::N => "N",
            Self::NI => "NI",
            Self::NA => "NA",
        }
    }

    /// Parse a code as a model might write it.
    ///
    /// Accepts the canonical codes in any case as well as spelled-out forms
    /// ("Probably yes", "No information", "N/A"). Returns `None` for anything
    /// else.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '*')
            .to_ascii_uppercase()
            .replace(['_', '-'], " ");
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        match cleaned.as_str() {
            "Y" | "YES" => Some(Self::Y),
            "PY" | "PROBABLY YES" => Some(Self::PY),
            "PN" | "PROBABLY NO" => Some(Self::PN),
            "N" | "NO" => Some(Self::N),
            "NI" | "NO INFORMATION" | "NO INFO" => Some(Self::NI),
            "NA" | "N/A" | "NOT APPLICABLE" => Some(Self::NA),
            _ => None,
        }
    }
}

impl fmt::Display for SignalAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level risk of bias judgement.
///
/// Ordered by severity so the worse of two levels is `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Low risk")]
    Low,
    #[serde(rename = "Some concerns")]
    SomeConcerns,
    #[serde(rename = "High risk")]
    High,
}

impl RiskLevel {
    pub const ALL: &'static [RiskLevel] = &[Self::Low, Self::SomeConcerns, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low risk",
            Self::SomeConcerns => "Some concerns",
            Self::High => "High risk",
        }
    }

    /// Parse a risk level as a model might write it ("low", "High Risk", ...).
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let cleaned = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '*')
            .to_ascii_lowercase();
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        match cleaned.as_str() {
            "low" | "low risk" | "low risk of bias" => Some(Self::Low),
            "some concerns" | "some concern" | "some" => Some(Self::SomeConcerns),
            "high" | "high risk" | "high risk of bias" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall (study-level) verdict: a risk level, or not applicable when no
/// domains were assessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverallRisk {
    #[serde(rename = "Low risk")]
    Low,
    #[serde(rename = "Some concerns")]
    SomeConcerns,
    #[serde(rename = "High risk")]
    High,
    #[serde(rename = "Not applicable")]
    NotApplicable,
}

impl OverallRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low risk",
            Self::SomeConcerns => "Some concerns",
            Self::High => "High risk",
            Self::NotApplicable => "Not applicable",
        }
    }
}

impl From<RiskLevel> for OverallRisk {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => Self::Low,
            RiskLevel::SomeConcerns => Self::SomeConcerns,
            RiskLevel::High => Self::High,
        }
    }
}

impl fmt::Display for OverallRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain risk as carried into aggregation.
///
/// Results produced by this workspace always hold a [`RiskLevel`]. Rows read
/// back from edited or foreign result files may carry anything, and those
/// values are kept verbatim so the aggregator can flag them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RiskValue {
    Level(RiskLevel),
    Unrecognized(String),
}

impl RiskValue {
    pub fn level(&self) -> Option<RiskLevel> {
        match self {
            Self::Level(level) => Some(*level),
            Self::Unrecognized(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Level(level) => level.as_str(),
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<RiskLevel> for RiskValue {
    fn from(level: RiskLevel) -> Self {
        Self::Level(level)
    }
}

impl fmt::Display for RiskValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
