//! Prompt rendering.
//!
//! Pipeline stages ask a [`PromptRenderer`] for their prompt text so the
//! wording can be swapped without touching the stages. [`DefaultPrompts`] is
//! the built-in wording.

use std::fmt::Write as _;

use rob2_core::{DomainResult, DomainSchema, EvidenceItem, SignalAnswer};

pub trait PromptRenderer: Send + Sync {
    /// Yes/no relevance question over one text unit.
    fn relevance(&self, text: &str) -> String;

    /// Assignment-vs-adherence question over the evidence.
    fn analysis_type(&self, items: &[EvidenceItem]) -> String;

    /// Full domain evaluation request.
    fn domain_evaluation(&self, schema: &DomainSchema, items: &[EvidenceItem]) -> String;

    /// Decision-path review request for one domain result.
    fn decision_review(
        &self,
        schema: &DomainSchema,
        standard: &str,
        principles: &str,
        result: &DomainResult,
    ) -> String;
}

/// Evidence rendered as `[Page N] text` paragraphs in source order.
pub fn render_context(items: &[EvidenceItem]) -> String {
    items
        .iter()
        .map(|item| format!("[Page {}] {}", item.page_idx, item.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn join_answers(answers: &[SignalAnswer]) -> String {
    answers
        .iter()
        .map(SignalAnswer::as_str)
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrompts;

// ── Templates ──

const RELEVANCE_PROMPT: &str = "\
You are an expert in risk of bias assessment for randomized controlled trials (ROB2 framework).
Answer 'yes' if the text below is relevant to a ROB2 risk of bias assessment (randomization, \
allocation concealment, blinding, interventions, adherence, baseline characteristics, outcome \
measurement, missing data, statistical analysis, trial registration or protocol), otherwise \
answer 'no'.

Text:
";

const ANALYSIS_TYPE_PROMPT: &str = "\
You are an expert in ROB2 risk of bias assessment.
Given the study content below, decide which effect Domain 2 should assess:
- 'assignment': the effect of assignment to intervention (intention-to-treat analysis)
- 'adherence': the effect of adhering to intervention (per-protocol or as-treated analysis)

Text:
";

impl PromptRenderer for DefaultPrompts {
    fn relevance(&self, text: &str) -> String {
        format!("{RELEVANCE_PROMPT}{text}\n\nAnswer only 'yes' or 'no'.")
    }

    fn analysis_type(&self, items: &[EvidenceItem]) -> String {
        let text = items
            .iter()
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        format!("{ANALYSIS_TYPE_PROMPT}{text}\n\nAnswer with only 'assignment' or 'adherence'.")
    }

    fn domain_evaluation(&self, schema: &DomainSchema, items: &[EvidenceItem]) -> String {
        let mut questions = String::new();
        let mut shape = String::new();
        for (i, signal) in schema.signals.iter().enumerate() {
            let options = join_answers(signal.allowed);
            let _ = writeln!(questions, "{}: {} [{}]", signal.id, signal.text, options);
            let comma = if i + 1 < schema.signals.len() { "," } else { "" };
            let _ = writeln!(
                shape,
                "    \"{}\": {{\"answer\": \"<one of {}>\", \"reason\": \"...\", \
                 \"evidence\": [{{\"text\": \"<exact quote>\", \"page_idx\": <page number>}}]}}{}",
                signal.id, options, comma
            );
        }
        let risks = schema
            .domain_options
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>();

        format!(
            "# ROB2 Domain Evaluation\n\
             \n\
             You are an expert in the ROB2 framework for randomized controlled trials. Assess \
             the risk of bias for the domain \"{domain}\".\n\
             \n\
             ## Evaluation Materials\n\
             Each block is marked with its source page as `[Page X]`.\n\
             \n\
             {context}\n\
             \n\
             ## Instructions\n\
             1. Answer every signal question below with one of its listed options, a reason, and \
             supporting evidence.\n\
             2. Give the overall risk of bias for the domain with a reason and evidence.\n\
             3. Evidence must quote the materials exactly and give the page number X from the \
             `[Page X]` marker of the quoted block.\n\
             4. Answer NI when the materials do not address a question.\n\
             \n\
             ## Signal Questions\n\
             {questions}\
             \n\
             ## Overall Risk Options\n\
             {risk_list}\n\
             \n\
             ## Output\n\
             Return only a JSON object with this structure:\n\
             {{\n  \"signals\": {{\n{shape}  }},\n  \"overall\": {{\"risk\": \"<one of {risk_alts}>\", \
             \"reason\": \"...\", \"evidence\": [{{\"text\": \"<exact quote>\", \"page_idx\": <page number>}}]}}\n}}\n",
            domain = schema.domain_name,
            context = render_context(items),
            questions = questions,
            risk_list = risks
                .iter()
                .map(|r| format!("- {r}"))
                .collect::<Vec<_>>()
                .join("\n"),
            shape = shape,
            risk_alts = risks.join("/"),
        )
    }

    fn decision_review(
        &self,
        schema: &DomainSchema,
        standard: &str,
        principles: &str,
        result: &DomainResult,
    ) -> String {
        let result_json = serde_json::to_string_pretty(result).unwrap_or_default();
        format!(
            "# ROB2 Decision Path Review\n\
             \n\
             You audit the evaluation of \"{domain}\" for compliance with its decision paths.\n\
             \n\
             {standard}\n\
             {principles}\n\
             ## Evaluation Result\n\
             ```json\n{result_json}\n```\n\
             \n\
             ## Steps\n\
             1. From the signal answers, identify the path that applies.\n\
             2. Check that the overall risk equals that path's endpoint.\n\
             3. If it does not, revise. Keep signal answers that have strong evidence and change \
             the overall risk; adjust a signal answer only if its evidence does not support it.\n\
             \n\
             ## Output\n\
             Return only a JSON object:\n\
             {{\n  \"needs_revision\": <true|false>,\n  \"path\": \"<PATH_n label as written above>\",\n  \
             \"revision_reasons\": [\"...\"],\n  \"revised_output\": <null, or an object with the same \
             \"signals\" and \"overall\" structure as the evaluation result>,\n  \
             \"confidence\": <number between 0 and 1>\n}}\n",
            domain = schema.domain_name,
        )
    }
}
