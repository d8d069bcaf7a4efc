//! Terminal rendering for reports, signal schemas and aggregate results.

use std::fmt::Write as _;

use rob2_core::{AggregateResult, DomainSchema, OverallRisk, ResultRow, SignalAnswer};
use rob2_store::Report;

const FILE_WIDTH: usize = 32;
const CELL_WIDTH: usize = 6;

// ── Summary table ──

fn short(risk: OverallRisk) -> &'static str {
    match risk {
        OverallRisk::Low => "Low",
        OverallRisk::SomeConcerns => "Some",
        OverallRisk::High => "High",
        OverallRisk::NotApplicable => "N/A",
    }
}

fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let tail: String = text
        .chars()
        .rev()
        .take(width - 3)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}

/// One line per evaluated file with its domain and overall verdicts, then the
/// failed files.
pub fn render_summary(report: &Report) -> String {
    let mut out = format!("{:<FILE_WIDTH$}", "File");
    for n in 1..=5 {
        let _ = write!(out, " {:<CELL_WIDTH$}", format!("D{n}"));
    }
    out.push_str(" Overall\n");
    out.push_str(&"-".repeat(FILE_WIDTH + 5 * (CELL_WIDTH + 1) + 8));
    out.push('\n');

    for (file_id, rows) in report.results() {
        let _ = write!(out, "{:<FILE_WIDTH$}", fit(file_id, FILE_WIDTH));
        for result in rows.iter().filter_map(ResultRow::as_domain) {
            let _ = write!(out, " {:<CELL_WIDTH$}", short(result.overall.risk.into()));
        }
        let overall = report.overall(file_id).map_or("-", short);
        let _ = writeln!(out, " {overall}");
    }

    let mut errors = report.errors().peekable();
    if errors.peek().is_some() {
        out.push_str("\nFailed:\n");
        for (file_id, message) in errors {
            let _ = writeln!(out, "  {file_id}: {message}");
        }
    }
    out
}

// ── Schema ──

pub fn render_schema(schema: &DomainSchema) -> String {
    let mut out = format!("=== {} ===\n", schema.domain_name);
    for signal in schema.signals {
        let allowed = signal
            .allowed
            .iter()
            .map(SignalAnswer::as_str)
            .collect::<Vec<_>>()
            .join("/");
        let _ = writeln!(out, "  {:<6} [{allowed}]\n         {}", signal.id, signal.text);
    }
    let options = schema
        .domain_options
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "  Risk options: {options}");
    out
}

// ── Aggregate ──

pub fn render_aggregate(result: &AggregateResult) -> String {
    let mut out = format!("{}: {}\n", result.domain, result.overall().as_str());
    for risk in &result.evidence {
        let _ = writeln!(out, "  {:<70} {}", fit(&risk.domain, 70), risk.risk.as_str());
    }
    let _ = writeln!(out, "\n{}", result.reasoning);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rob2_core::{DomainKey, DomainResult, DomainRisk, RiskLevel, aggregate, schema};
    use rob2_store::FileOutcome;

    fn rows(risks: [RiskLevel; 5]) -> Vec<ResultRow> {
        let results: Vec<DomainResult> = DomainKey::for_analysis(Default::default())
            .into_iter()
            .zip(risks)
            .map(|(key, risk)| {
                let mut result = DomainResult::defaulted(key);
                result.overall.risk = risk;
                result
            })
            .collect();
        let risks: Vec<DomainRisk> = results.iter().map(DomainResult::risk).collect();
        let overall = aggregate(&risks);
        results
            .into_iter()
            .map(ResultRow::Domain)
            .chain([ResultRow::Overall(overall)])
            .collect()
    }

    #[test]
    fn summary_lists_files_and_failures() {
        use RiskLevel::*;
        let mut report = Report::new();
        report.record(
            "trial.json",
            FileOutcome::Evaluated(rows([Low, Low, SomeConcerns, Low, High])),
        );
        report.record("broken.json", FileOutcome::Failed("file not found".into()));

        let text = render_summary(&report);
        let line = text.lines().find(|l| l.starts_with("trial.json")).unwrap();
        let cells: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(cells, vec!["trial.json", "Low", "Low", "Some", "Low", "High", "High"]);
        assert!(text.contains("Failed:\n  broken.json: file not found"));
    }

    #[test]
    fn long_file_ids_keep_their_tail() {
        let id = format!("{}/paper.json", "a".repeat(60));
        let fitted = fit(&id, FILE_WIDTH);
        assert_eq!(fitted.chars().count(), FILE_WIDTH);
        assert!(fitted.ends_with("paper.json"));
    }

    #[test]
    fn schema_lists_allowed_answers() {
        let text = render_schema(schema(DomainKey::DeviationAssignment));
        assert!(text.starts_with("=== Domain 2:"));
        assert!(text.contains("q2_3   [Y/PY/PN/N/NI/NA]"));
        assert!(text.contains("Risk options: Low risk, Some concerns, High risk"));
    }

    #[test]
    fn aggregate_lists_each_domain() {
        let result = aggregate(&[
            DomainRisk::new("Domain 1", RiskLevel::Low),
            DomainRisk::new("Domain 2", RiskLevel::High),
        ]);
        let text = render_aggregate(&result);
        assert!(text.starts_with("Overall risk of bias: High risk\n"));
        assert!(text.contains("Domain 2"));
        assert!(text.ends_with(&format!("{}\n", result.reasoning)));
    }
}
