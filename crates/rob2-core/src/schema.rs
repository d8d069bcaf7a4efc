//! Signal schema registry.
//!
//! Static per-domain definitions: signal question ids and wording, the answer
//! codes each question accepts, and the domain-level risk options. Question
//! wording follows the ROB2 tool for individually randomized parallel-group
//! trials.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::answer::{RiskLevel, SignalAnswer};

/// Closed set of assessable ROB2 domain variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainKey {
    Randomization,
    DeviationAssignment,
    DeviationAdherence,
    MissingData,
    Measurement,
    Selection,
}

impl DomainKey {
    pub const ALL: &'static [DomainKey] = &[
        Self::Randomization,
        Self::DeviationAssignment,
        Self::DeviationAdherence,
        Self::MissingData,
        Self::Measurement,
        Self::Selection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Randomization => "randomization",
            Self::DeviationAssignment => "deviation_assignment",
            Self::DeviationAdherence => "deviation_adherence",
            Self::MissingData => "missing_data",
            Self::Measurement => "measurement",
            Self::Selection => "selection",
        }
    }

    /// Domains assessed for one study, in canonical report order.
    ///
    /// The domain-2 variant depends on the analysis type; the other four are
    /// always present. Reporters rely on this order positionally.
    pub fn for_analysis(analysis: AnalysisType) -> [DomainKey; 5] {
        let deviation = match analysis {
            AnalysisType::Assignment => Self::DeviationAssignment,
            AnalysisType::Adherence => Self::DeviationAdherence,
        };
        [
            Self::Randomization,
            deviation,
            Self::MissingData,
            Self::Measurement,
            Self::Selection,
        ]
    }

    pub fn schema(&self) -> &'static DomainSchema {
        schema(*self)
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s.trim())
            .ok_or_else(|| CoreError::UnknownDomain(s.to_string()))
    }
}

/// Which domain-2 effect is being assessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    /// Effect of assignment to intervention (intention-to-treat).
    #[default]
    Assignment,
    /// Effect of adhering to intervention (per-protocol / as-treated).
    Adherence,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Adherence => "adherence",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assignment" => Ok(Self::Assignment),
            "adherence" => Ok(Self::Adherence),
            _ => Err(CoreError::UnknownAnalysisType(s.to_string())),
        }
    }
}

/// One signal question of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalQuestion {
    pub id: &'static str,
    pub text: &'static str,
    pub allowed: &'static [SignalAnswer],
}

impl SignalQuestion {
    pub fn allows(&self, answer: SignalAnswer) -> bool {
        self.allowed.contains(&answer)
    }
}

/// Static definition of one domain variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DomainSchema {
    pub key: DomainKey,
    pub domain_name: &'static str,
    pub signals: &'static [SignalQuestion],
    pub domain_options: &'static [RiskLevel],
}

impl DomainSchema {
    pub fn signal(&self, id: &str) -> Option<&'static SignalQuestion> {
        self.signals.iter().find(|s| s.id == id)
    }

    pub fn signal_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.signals.iter().map(|s| s.id)
    }
}

/// Look up the schema for a domain variant.
pub fn schema(key: DomainKey) -> &'static DomainSchema {
    match key {
        DomainKey::Randomization => &RANDOMIZATION,
        DomainKey::DeviationAssignment => &DEVIATION_ASSIGNMENT,
        DomainKey::DeviationAdherence => &DEVIATION_ADHERENCE,
        DomainKey::MissingData => &MISSING_DATA,
        DomainKey::Measurement => &MEASUREMENT,
        DomainKey::Selection => &SELECTION,
    }
}

// ── Schemas ──

const STD: &[SignalAnswer] = SignalAnswer::STANDARD;
const STD_NA: &[SignalAnswer] = SignalAnswer::WITH_NOT_APPLICABLE;

static RANDOMIZATION: DomainSchema = DomainSchema {
    key: DomainKey::Randomization,
    domain_name: "Domain 1: Bias arising from the randomization process",
    signals: &[
        SignalQuestion {
            id: "q1_1",
            text: "Was the allocation sequence random?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q1_2",
            text: "Was the allocation sequence concealed until participants were enrolled and \
                   assigned to interventions?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q1_3",
            text: "Did baseline differences between intervention groups suggest a problem with \
                   the randomization process?",
            allowed: STD,
        },
    ],
    domain_options: RiskLevel::ALL,
};

static DEVIATION_ASSIGNMENT: DomainSchema = DomainSchema {
    key: DomainKey::DeviationAssignment,
    domain_name: "Domain 2: Bias due to deviations from intended interventions \
                  (effect of assignment to intervention)",
    signals: &[
        SignalQuestion {
            id: "q2_1",
            text: "Were participants aware of their assigned intervention during the trial?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q2_2",
            text: "Were carers and people delivering the interventions aware of participants' \
                   assigned intervention during the trial?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q2_3",
            text: "If Y/PY/NI to 2.1 or 2.2: Were there deviations from the intended \
                   intervention that arose because of the trial context?",
            allowed: STD_NA,
        },
        SignalQuestion {
            id: "q2_4",
            text: "If Y/PY to 2.3: Were these deviations likely to have affected the outcome?",
            allowed: STD_NA,
        },
        SignalQuestion {
            id: "q2_5",
            text: "If Y/PY/NI to 2.4: Were these deviations from intended intervention balanced \
                   between groups?",
            allowed: STD_NA,
        },
        SignalQuestion {
            id: "q2_6",
            text: "Was an appropriate analysis used to estimate the effect of assignment to \
                   intervention?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q2_7",
            text: "If N/PN/NI to 2.6: Was there potential for a substantial impact (on the \
                   result) of the failure to analyse participants in the group to which they \
                   were randomized?",
            allowed: STD_NA,
        },
    ],
    domain_options: RiskLevel::ALL,
};

static DEVIATION_ADHERENCE: DomainSchema = DomainSchema {
    key: DomainKey::DeviationAdherence,
    domain_name: "Domain 2: Bias due to deviations from intended interventions \
                  (effect of adhering to intervention)",
    signals: &[
        SignalQuestion {
            id: "q2_1",
            text: "Were participants aware of their assigned intervention during the trial?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q2_2",
            text: "Were carers and people delivering the interventions aware of participants' \
                   assigned intervention during the trial?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q2_3",
            text: "[If applicable:] If Y/PY/NI to 2.1 or 2.2: Were important non-protocol \
                   interventions balanced across intervention groups?",
            allowed: STD_NA,
        },
        SignalQuestion {
            id: "q2_4",
            text: "[If applicable:] Were there failures in implementing the intervention that \
                   could have affected the outcome?",
            allowed: STD_NA,
        },
        SignalQuestion {
            id: "q2_5",
            text: "[If applicable:] Was there non-adherence to the assigned intervention regimen \
                   that could have affected participants' outcomes?",
            allowed: STD_NA,
        },
        SignalQuestion {
            id: "q2_6",
            text: "If N/PN/NI to 2.3, or Y/PY/NI to 2.4 or 2.5: Was an appropriate analysis used \
                   to estimate the effect of adhering to the intervention?",
            allowed: STD_NA,
        },
    ],
    domain_options: RiskLevel::ALL,
};

static MISSING_DATA: DomainSchema = DomainSchema {
    key: DomainKey::MissingData,
    domain_name: "Domain 3: Bias due to missing outcome data",
    signals: &[
        SignalQuestion {
            id: "q3_1",
            text: "Were data for this outcome available for all, or nearly all, participants \
                   randomized?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q3_2",
            text: "If N/PN/NI to 3.1: Is there evidence that the result was not biased by \
                   missing outcome data?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q3_3",
            text: "If N/PN to 3.2: Could missingness in the outcome depend on its true value?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q3_4",
            text: "If Y/PY/NI to 3.3: Is it likely that missingness in the outcome depended on \
                   its true value?",
            allowed: STD,
        },
    ],
    domain_options: RiskLevel::ALL,
};

static MEASUREMENT: DomainSchema = DomainSchema {
    key: DomainKey::Measurement,
    domain_name: "Domain 4: Bias in measurement of the outcome",
    signals: &[
        SignalQuestion {
            id: "q4_1",
            text: "Was the method of measuring the outcome inappropriate?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q4_2",
            text: "Could measurement or ascertainment of the outcome have differed between \
                   intervention groups?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q4_3",
            text: "If N/PN/NI to 4.1 and 4.2: Were outcome assessors aware of the intervention \
                   received by study participants?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q4_4",
            text: "If Y/PY/NI to 4.3: Could assessment of the outcome have been influenced by \
                   knowledge of intervention received?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q4_5",
            text: "If Y/PY/NI to 4.4: Is it likely that assessment of the outcome was influenced \
                   by knowledge of intervention received?",
            allowed: STD,
        },
    ],
    domain_options: RiskLevel::ALL,
};

static SELECTION: DomainSchema = DomainSchema {
    key: DomainKey::Selection,
    domain_name: "Domain 5: Bias in selection of the reported result",
    signals: &[
        SignalQuestion {
            id: "q5_1",
            text: "Were the data that produced this result analysed in accordance with a \
                   pre-specified analysis plan that was finalized before unblinded outcome data \
                   were available for analysis?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q5_2",
            text: "Is the numerical result being assessed likely to have been selected, on the \
                   basis of the results, from multiple eligible outcome measurements (e.g. \
                   scales, definitions, time points) within the outcome domain?",
            allowed: STD,
        },
        SignalQuestion {
            id: "q5_3",
            text: "Is the numerical result being assessed likely to have been selected, on the \
                   basis of the results, from multiple eligible analyses of the data?",
            allowed: STD,
        },
    ],
    domain_options: RiskLevel::ALL,
};
