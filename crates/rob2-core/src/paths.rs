//! Decision-path tables.
//!
//! Each domain maps its signal answers to a risk level through an ordered list
//! of named paths. A path is a chain of conditions ending in one
//! [`RiskLevel`]; the first path whose conditions all hold wins. The
//! deviation-assignment domain is judged in two parts whose endpoints are
//! combined by taking the worse one.
//!
//! Every table is total over its schema's allowed answers: any complete set of
//! valid answers resolves to exactly one path per part.

use std::fmt::{self, Write as _};

use crate::answer::{RiskLevel, SignalAnswer};
use crate::judgement::DomainResult;
use crate::schema::{DomainKey, schema};

use SignalAnswer::{N, NA, NI, PN, PY, Y};

/// A condition over one or more signal answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The signal's answer is in the set.
    Signal(&'static str, &'static [SignalAnswer]),
    /// Every listed signal's answer is in the set.
    All(&'static [&'static str], &'static [SignalAnswer]),
    /// At least one listed signal's answer is in the set.
    Any(&'static [&'static str], &'static [SignalAnswer]),
}

impl Condition {
    fn holds(&self, answer_of: &impl Fn(&str) -> Option<SignalAnswer>) -> bool {
        let is_in =
            |id: &str, set: &[SignalAnswer]| answer_of(id).is_some_and(|a| set.contains(&a));
        match *self {
            Self::Signal(id, set) => is_in(id, set),
            Self::All(ids, set) => ids.iter().all(|&id| is_in(id, set)),
            Self::Any(ids, set) => ids.iter().any(|&id| is_in(id, set)),
        }
    }
}

fn answer_set(set: &[SignalAnswer]) -> String {
    set.iter().map(SignalAnswer::as_str).collect::<Vec<_>>().join("|")
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(id, set) => write!(f, "{id}[{}]", answer_set(set)),
            Self::All(ids, set) => write!(f, "({})[All {}]", ids.join(" & "), answer_set(set)),
            Self::Any(ids, set) => write!(f, "({})[Any {}]", ids.join(" & "), answer_set(set)),
        }
    }
}

/// One named path through a domain's decision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionPath {
    pub name: &'static str,
    pub conditions: &'static [Condition],
    pub risk: RiskLevel,
    pub description: &'static str,
}

impl DecisionPath {
    /// `PATH_n: cond -> cond -> Risk`.
    pub fn label(&self) -> String {
        let mut out = format!("{}: ", self.name);
        for condition in self.conditions {
            let _ = write!(out, "{condition} -> ");
        }
        out.push_str(self.risk.as_str());
        out
    }

    fn matches(&self, answer_of: &impl Fn(&str) -> Option<SignalAnswer>) -> bool {
        self.conditions.iter().all(|c| c.holds(answer_of))
    }
}

/// The paths taken through a table and the resulting endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// One path per table part.
    pub paths: Vec<&'static DecisionPath>,
    pub risk: RiskLevel,
}

impl Resolution {
    /// Path labels joined with `" + "`.
    pub fn label(&self) -> String {
        self.paths
            .iter()
            .map(|p| p.label())
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

/// The decision table for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionTable {
    pub key: DomainKey,
    pub parts: &'static [&'static [DecisionPath]],
}

impl DecisionTable {
    /// Resolve a set of answers. `None` when some part has no matching path,
    /// which only happens with missing or out-of-schema answers.
    pub fn resolve(&self, answer_of: impl Fn(&str) -> Option<SignalAnswer>) -> Option<Resolution> {
        let mut paths = Vec::with_capacity(self.parts.len());
        for part in self.parts {
            paths.push(part.iter().find(|p| p.matches(&answer_of))?);
        }
        let risk = paths.iter().map(|p| p.risk).max()?;
        Some(Resolution { paths, risk })
    }

    /// Resolve a domain result's recorded signal answers.
    pub fn resolve_result(&self, result: &DomainResult) -> Option<Resolution> {
        self.resolve(|id| result.answer(id))
    }

    pub fn paths(&self) -> impl Iterator<Item = &'static DecisionPath> {
        self.parts.iter().flat_map(|part| part.iter())
    }

    /// Markdown rendering sent to the reviewer model.
    pub fn render(&self) -> String {
        let mut out = format!("## Decision Paths for {}\n", schema(self.key).domain_name);
        let multi = self.parts.len() > 1;
        for (i, part) in self.parts.iter().enumerate() {
            if multi {
                let _ = write!(out, "\n### Part {}\n", i + 1);
            }
            for path in *part {
                let _ = write!(out, "\n**{}**\nDescription: {}\n", path.label(), path.description);
            }
        }
        if multi {
            out.push_str(
                "\nThe domain judgement is the worse of the part endpoints. Name both paths, \
                 joined with \" + \".\n",
            );
        }
        out
    }
}

/// Look up the decision table for a domain.
pub fn table(key: DomainKey) -> &'static DecisionTable {
    match key {
        DomainKey::Randomization => &RANDOMIZATION,
        DomainKey::DeviationAssignment => &DEVIATION_ASSIGNMENT,
        DomainKey::DeviationAdherence => &DEVIATION_ADHERENCE,
        DomainKey::MissingData => &MISSING_DATA,
        DomainKey::Measurement => &MEASUREMENT,
        DomainKey::Selection => &SELECTION,
    }
}

/// Principles sent with every review request.
pub const REVIEW_PRINCIPLES: &str = "\
## Decision Path Principles

1. Follow the decision tree exactly. Evaluate conditions in the order each path lists them.
2. Every risk judgement must be the endpoint of exactly one path.
3. Do not create new paths or exceptions, and do not judge risk outside the defined paths.
4. If the overall risk does not match the endpoint of the path the signal answers select, \
the overall risk must change.
5. A signal answer may be adjusted only when its recorded evidence does not support it.
";

// ── Tables ──

const YES: &[SignalAnswer] = &[Y, PY];
const NO: &[SignalAnswer] = &[N, PN];
const YES_NI: &[SignalAnswer] = &[Y, PY, NI];
const NO_NI: &[SignalAnswer] = &[N, PN, NI];
const ONLY_NI: &[SignalAnswer] = &[NI];
const NO_NA: &[SignalAnswer] = &[N, PN, NA];
const YES_NA: &[SignalAnswer] = &[Y, PY, NA];
const NO_NI_NA: &[SignalAnswer] = &[N, PN, NI, NA];

const BLINDING: &[&str] = &["q2_1", "q2_2"];
const SELECTED: &[&str] = &["q5_2", "q5_3"];

static RANDOMIZATION: DecisionTable = DecisionTable {
    key: DomainKey::Randomization,
    parts: &[&[
        DecisionPath {
            name: "PATH_1",
            conditions: &[
                Condition::Signal("q1_1", YES_NI),
                Condition::Signal("q1_2", YES),
                Condition::Signal("q1_3", NO_NI),
            ],
            risk: RiskLevel::Low,
            description: "Random sequence, concealed allocation, no baseline imbalance",
        },
        DecisionPath {
            name: "PATH_2",
            conditions: &[
                Condition::Signal("q1_1", YES_NI),
                Condition::Signal("q1_2", YES),
                Condition::Signal("q1_3", YES),
            ],
            risk: RiskLevel::SomeConcerns,
            description: "Concealed allocation but baseline imbalance suggests a problem",
        },
        DecisionPath {
            name: "PATH_3",
            conditions: &[Condition::Signal("q1_1", NO)],
            risk: RiskLevel::High,
            description: "Allocation sequence not random",
        },
        DecisionPath {
            name: "PATH_4",
            conditions: &[
                Condition::Signal("q1_1", YES_NI),
                Condition::Signal("q1_2", ONLY_NI),
                Condition::Signal("q1_3", NO_NI),
            ],
            risk: RiskLevel::SomeConcerns,
            description: "No information on concealment, no baseline imbalance",
        },
        DecisionPath {
            name: "PATH_5",
            conditions: &[
                Condition::Signal("q1_2", ONLY_NI),
                Condition::Signal("q1_3", YES),
            ],
            risk: RiskLevel::High,
            description: "No information on concealment with baseline imbalance",
        },
        DecisionPath {
            name: "PATH_6",
            conditions: &[Condition::Signal("q1_2", NO)],
            risk: RiskLevel::High,
            description: "Allocation sequence not concealed",
        },
    ]],
};

static DEVIATION_ASSIGNMENT: DecisionTable = DecisionTable {
    key: DomainKey::DeviationAssignment,
    parts: &[
        &[
            DecisionPath {
                name: "PATH_1",
                conditions: &[Condition::All(BLINDING, NO)],
                risk: RiskLevel::Low,
                description: "Participants and carers unaware of assignment",
            },
            DecisionPath {
                name: "PATH_2",
                conditions: &[
                    Condition::Any(BLINDING, YES_NI),
                    Condition::Signal("q2_3", NO_NA),
                ],
                risk: RiskLevel::Low,
                description: "Awareness possible but no deviations arising from the trial context",
            },
            DecisionPath {
                name: "PATH_3",
                conditions: &[
                    Condition::Any(BLINDING, YES_NI),
                    Condition::Signal("q2_3", ONLY_NI),
                ],
                risk: RiskLevel::SomeConcerns,
                description: "No information on deviations arising from the trial context",
            },
            DecisionPath {
                name: "PATH_4",
                conditions: &[
                    Condition::Any(BLINDING, YES_NI),
                    Condition::Signal("q2_3", YES),
                    Condition::Signal("q2_4", NO_NA),
                ],
                risk: RiskLevel::SomeConcerns,
                description: "Deviations occurred but were unlikely to affect the outcome",
            },
            DecisionPath {
                name: "PATH_5",
                conditions: &[
                    Condition::Any(BLINDING, YES_NI),
                    Condition::Signal("q2_3", YES),
                    Condition::Signal("q2_4", YES_NI),
                    Condition::Signal("q2_5", YES),
                ],
                risk: RiskLevel::SomeConcerns,
                description: "Deviations possibly affected the outcome but were balanced",
            },
            DecisionPath {
                name: "PATH_6",
                conditions: &[
                    Condition::Any(BLINDING, YES_NI),
                    Condition::Signal("q2_3", YES),
                    Condition::Signal("q2_4", YES_NI),
                    Condition::Signal("q2_5", NO_NI_NA),
                ],
                risk: RiskLevel::High,
                description: "Deviations affecting the outcome were not balanced",
            },
        ],
        &[
            DecisionPath {
                name: "PATH_7",
                conditions: &[Condition::Signal("q2_6", YES)],
                risk: RiskLevel::Low,
                description: "Appropriate analysis of the effect of assignment",
            },
            DecisionPath {
                name: "PATH_8",
                conditions: &[
                    Condition::Signal("q2_6", NO_NI),
                    Condition::Signal("q2_7", NO_NA),
                ],
                risk: RiskLevel::SomeConcerns,
                description: "Inappropriate analysis with little potential impact",
            },
            DecisionPath {
                name: "PATH_9",
                conditions: &[
                    Condition::Signal("q2_6", NO_NI),
                    Condition::Signal("q2_7", YES_NI),
                ],
                risk: RiskLevel::High,
                description: "Inappropriate analysis with potential for substantial impact",
            },
        ],
    ],
};

static DEVIATION_ADHERENCE: DecisionTable = DecisionTable {
    key: DomainKey::DeviationAdherence,
    parts: &[&[
        DecisionPath {
            name: "PATH_1",
            conditions: &[
                Condition::All(BLINDING, NO),
                Condition::All(&["q2_4", "q2_5"], NO_NA),
            ],
            risk: RiskLevel::Low,
            description: "Unaware of assignment, no implementation failures or non-adherence",
        },
        DecisionPath {
            name: "PATH_2",
            conditions: &[
                Condition::Any(BLINDING, YES_NI),
                Condition::Signal("q2_3", YES_NA),
                Condition::All(&["q2_4", "q2_5"], NO_NA),
            ],
            risk: RiskLevel::Low,
            description: "Non-protocol interventions balanced, no failures or non-adherence",
        },
        DecisionPath {
            name: "PATH_3",
            conditions: &[Condition::Signal("q2_6", YES)],
            risk: RiskLevel::SomeConcerns,
            description: "Problems present but an appropriate per-protocol analysis was used",
        },
        DecisionPath {
            name: "PATH_4",
            conditions: &[Condition::Signal("q2_6", NO_NI_NA)],
            risk: RiskLevel::High,
            description: "Problems present and not addressed by the analysis",
        },
    ]],
};

static MISSING_DATA: DecisionTable = DecisionTable {
    key: DomainKey::MissingData,
    parts: &[&[
        DecisionPath {
            name: "PATH_1",
            conditions: &[Condition::Signal("q3_1", YES)],
            risk: RiskLevel::Low,
            description: "Outcome data available for nearly all participants",
        },
        DecisionPath {
            name: "PATH_2",
            conditions: &[
                Condition::Signal("q3_1", NO_NI),
                Condition::Signal("q3_2", YES),
            ],
            risk: RiskLevel::Low,
            description: "Evidence that missingness did not bias the result",
        },
        DecisionPath {
            name: "PATH_3",
            conditions: &[
                Condition::Signal("q3_1", NO_NI),
                Condition::Signal("q3_2", NO_NI),
                Condition::Signal("q3_3", NO),
            ],
            risk: RiskLevel::Low,
            description: "Missingness could not depend on the true value",
        },
        DecisionPath {
            name: "PATH_4",
            conditions: &[
                Condition::Signal("q3_1", NO_NI),
                Condition::Signal("q3_2", NO_NI),
                Condition::Signal("q3_3", YES_NI),
                Condition::Signal("q3_4", NO),
            ],
            risk: RiskLevel::SomeConcerns,
            description: "Missingness could but is unlikely to depend on the true value",
        },
        DecisionPath {
            name: "PATH_5",
            conditions: &[
                Condition::Signal("q3_1", NO_NI),
                Condition::Signal("q3_2", NO_NI),
                Condition::Signal("q3_3", YES_NI),
                Condition::Signal("q3_4", YES_NI),
            ],
            risk: RiskLevel::High,
            description: "Missingness likely depends on the true value",
        },
    ]],
};

static MEASUREMENT: DecisionTable = DecisionTable {
    key: DomainKey::Measurement,
    parts: &[&[
        DecisionPath {
            name: "PATH_1",
            conditions: &[Condition::Signal("q4_1", YES)],
            risk: RiskLevel::High,
            description: "Measurement method inappropriate",
        },
        DecisionPath {
            name: "PATH_2",
            conditions: &[
                Condition::Signal("q4_1", NO_NI),
                Condition::Signal("q4_2", NO),
                Condition::Signal("q4_3", NO),
            ],
            risk: RiskLevel::Low,
            description: "Appropriate method, no differential measurement, assessors blinded",
        },
        DecisionPath {
            name: "PATH_3",
            conditions: &[
                Condition::Signal("q4_1", NO_NI),
                Condition::Signal("q4_2", NO),
                Condition::Signal("q4_3", YES_NI),
                Condition::Signal("q4_4", NO),
            ],
            risk: RiskLevel::Low,
            description: "Assessors aware but assessment could not be influenced",
        },
        DecisionPath {
            name: "PATH_4",
            conditions: &[
                Condition::Signal("q4_1", NO_NI),
                Condition::Signal("q4_2", NO),
                Condition::Signal("q4_3", YES_NI),
                Condition::Signal("q4_4", YES_NI),
                Condition::Signal("q4_5", NO),
            ],
            risk: RiskLevel::SomeConcerns,
            description: "Assessment could be but is unlikely to have been influenced",
        },
        DecisionPath {
            name: "PATH_5",
            conditions: &[
                Condition::Signal("q4_1", NO_NI),
                Condition::Signal("q4_2", NO),
                Condition::Signal("q4_3", YES_NI),
                Condition::Signal("q4_4", YES_NI),
                Condition::Signal("q4_5", YES_NI),
            ],
            risk: RiskLevel::High,
            description: "Assessment likely influenced by knowledge of intervention",
        },
        DecisionPath {
            name: "PATH_6",
            conditions: &[
                Condition::Signal("q4_1", NO_NI),
                Condition::Signal("q4_2", ONLY_NI),
                Condition::Signal("q4_3", NO),
            ],
            risk: RiskLevel::SomeConcerns,
            description: "No information on differential measurement, assessors blinded",
        },
        DecisionPath {
            name: "PATH_7",
            conditions: &[
                Condition::Signal("q4_1", NO_NI),
                Condition::Signal("q4_2", ONLY_NI),
                Condition::Signal("q4_3", YES_NI),
                Condition::Signal("q4_4", NO),
            ],
            risk: RiskLevel::SomeConcerns,
            description: "No information on differential measurement, assessors aware",
        },
        DecisionPath {
            name: "PATH_8",
            conditions: &[
                Condition::Signal("q4_1", NO_NI),
                Condition::Signal("q4_2", ONLY_NI),
                Condition::Signal("q4_3", YES_NI),
                Condition::Signal("q4_4", YES_NI),
                Condition::Signal("q4_5", NO),
            ],
            risk: RiskLevel::SomeConcerns,
            description: "Uncertain differential measurement, influence possible",
        },
        DecisionPath {
            name: "PATH_9",
            conditions: &[
                Condition::Signal("q4_1", NO_NI),
                Condition::Signal("q4_2", ONLY_NI),
                Condition::Signal("q4_3", YES_NI),
                Condition::Signal("q4_4", YES_NI),
                Condition::Signal("q4_5", YES_NI),
            ],
            risk: RiskLevel::High,
            description: "Uncertain differential measurement, influence likely",
        },
        DecisionPath {
            name: "PATH_10",
            conditions: &[
                Condition::Signal("q4_1", NO_NI),
                Condition::Signal("q4_2", YES),
            ],
            risk: RiskLevel::High,
            description: "Measurement likely differed between groups",
        },
    ]],
};

static SELECTION: DecisionTable = DecisionTable {
    key: DomainKey::Selection,
    parts: &[&[
        DecisionPath {
            name: "PATH_1",
            conditions: &[Condition::All(SELECTED, NO), Condition::Signal("q5_1", YES)],
            risk: RiskLevel::Low,
            description: "Pre-specified analysis plan, no selection of the result",
        },
        DecisionPath {
            name: "PATH_2",
            conditions: &[Condition::All(SELECTED, NO), Condition::Signal("q5_1", NO_NI)],
            risk: RiskLevel::SomeConcerns,
            description: "No pre-specified plan but no evidence of selection",
        },
        DecisionPath {
            name: "PATH_3",
            conditions: &[
                Condition::All(SELECTED, NO_NI),
                Condition::Any(SELECTED, ONLY_NI),
            ],
            risk: RiskLevel::SomeConcerns,
            description: "No information on selection, no evidence of it",
        },
        DecisionPath {
            name: "PATH_4",
            conditions: &[Condition::Any(SELECTED, YES)],
            risk: RiskLevel::High,
            description: "Result likely selected from multiple measurements or analyses",
        },
    ]],
};
