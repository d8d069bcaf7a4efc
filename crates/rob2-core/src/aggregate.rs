//! Overall risk-of-bias aggregation.
//!
//! Combines per-domain risks into one study-level verdict. Deterministic and
//! order independent; the evidence list echoes the input in input order.

use tracing::warn;

use crate::answer::{OverallRisk, RiskLevel, RiskValue};
use crate::judgement::{AggregateResult, DomainRisk, OVERALL_DOMAIN, OverallJudgement};

/// The rule set [`aggregate`] applies, first match wins.
///
/// This is the three-rule algorithm of the Cochrane handbook. Weighting
/// randomization and missing-data domains more heavily, or escalating to
/// `High risk` at three or more `Some concerns`, were both rejected: neither
/// is part of the published algorithm and both make results depend on
/// settings that reporters cannot see.
pub const AGGREGATION_RULE_SET: &str = "\
1. No domains supplied: Not applicable.
2. Any domain High risk: High risk.
3. All domains Low risk: Low risk.
4. Any domain Some concerns: Some concerns.
5. Otherwise (only unrecognized values): Some concerns, flagged as an anomaly.";

/// Aggregate domain risks into the overall judgement.
pub fn aggregate(risks: &[DomainRisk]) -> AggregateResult {
    let evidence = risks.to_vec();

    if risks.is_empty() {
        return overall(
            OverallRisk::NotApplicable,
            "No domain judgements were supplied, so no overall risk of bias can be assigned."
                .to_string(),
            evidence,
        );
    }

    let unrecognized: Vec<&DomainRisk> =
        risks.iter().filter(|r| r.risk.level().is_none()).collect();
    for risk in &unrecognized {
        warn!(domain = %risk.domain, value = %risk.risk, "unrecognized domain risk value");
    }

    let with = |level: RiskLevel| -> Vec<&str> {
        risks
            .iter()
            .filter(|r| r.risk.level() == Some(level))
            .map(|r| r.domain.as_str())
            .collect()
    };
    let high = with(RiskLevel::High);
    let concerns = with(RiskLevel::SomeConcerns);

    let (verdict, mut reasoning) = if !high.is_empty() {
        (
            OverallRisk::High,
            format!(
                "At least one domain is judged High risk ({}), so the overall risk of bias is High risk.",
                high.join("; ")
            ),
        )
    } else if risks.iter().all(|r| r.risk.level() == Some(RiskLevel::Low)) {
        (
            OverallRisk::Low,
            format!(
                "All {} domains are judged Low risk, so the overall risk of bias is Low risk.",
                risks.len()
            ),
        )
    } else if !concerns.is_empty() {
        (
            OverallRisk::SomeConcerns,
            format!(
                "No domain is judged High risk, but some concerns were raised in {} ({}), so the \
                 overall risk of bias is Some concerns.",
                plural(concerns.len(), "domain"),
                concerns.join("; ")
            ),
        )
    } else {
        (
            OverallRisk::SomeConcerns,
            "Anomaly: the domain risks match no aggregation rule because some values are not \
             recognized risk levels. Defaulting the overall risk of bias to Some concerns."
                .to_string(),
        )
    };

    if !unrecognized.is_empty() {
        let listed: Vec<String> = unrecognized
            .iter()
            .map(|r| format!("{} = {:?}", r.domain, r.risk.as_str()))
            .collect();
        reasoning.push_str(&format!(
            " Unrecognized risk values were ignored: {}.",
            listed.join("; ")
        ));
    }

    overall(verdict, reasoning, evidence)
}

fn overall(verdict: OverallRisk, reasoning: String, evidence: Vec<DomainRisk>) -> AggregateResult {
    AggregateResult {
        domain: OVERALL_DOMAIN.to_string(),
        judgement: OverallJudgement { overall: verdict },
        reasoning,
        evidence,
    }
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Extract domain risks from raw result rows, e.g. a result file that may
/// have been edited by hand.
///
/// Rows carrying `"judgement"` (a previous aggregate) are skipped. A row
/// without a string `overall.risk` contributes an unrecognized value so the
/// aggregator flags it.
pub fn risks_from_rows(rows: &[serde_json::Value]) -> Vec<DomainRisk> {
    rows.iter()
        .filter(|row| row.get("judgement").is_none())
        .map(|row| {
            let domain = row
                .get("domain")
                .and_then(|d| d.as_str())
                .unwrap_or("Unknown domain")
                .to_string();
            let risk = match row.pointer("/overall/risk") {
                Some(serde_json::Value::String(s)) => {
                    serde_json::from_value(serde_json::Value::String(s.clone()))
                        .unwrap_or_else(|_| RiskValue::Unrecognized(s.clone()))
                }
                Some(other) => RiskValue::Unrecognized(other.to_string()),
                None => RiskValue::Unrecognized(String::new()),
            };
            DomainRisk { domain, risk }
        })
        .collect()
}
