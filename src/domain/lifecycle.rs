//! Entity lifecycle model: status vocabularies, terminal states and the
//! rules governing the generic terminal-status transition.
//!
//! Legality checks here are synchronous and side-effect free so they can gate
//! a mutation before any optimistic cache write happens.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::domain::entity::EntityKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("unknown {kind} status '{status}'")]
    UnknownStatus { kind: EntityKind, status: String },

    #[error("invalid terminal status '{status}' for {kind}; valid: {allowed}")]
    NotTerminal {
        kind: EntityKind,
        status: String,
        allowed: String,
    },

    #[error("{operation} is not supported for {kind}")]
    UnsupportedOperation {
        kind: EntityKind,
        operation: &'static str,
    },
}

/// Generates a closed status vocabulary with its wire names.
///
/// The first literal of each variant is the canonical wire value; any further
/// literals are accepted aliases on input.
macro_rules! status_enum {
    ($name:ident, $doc:expr, { $($variant:ident => $wire:literal $(| $alias:literal)*),+ $(,)? }) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire $(| $alias)* => Ok($name::$variant),)+
                    other => Err(other.to_string()),
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(|value| {
                    serde::de::Error::custom(format!(
                        "unknown {} '{value}'",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

status_enum!(LeadStatus, "Lifecycle state of a lead.", {
    New => "new",
    Converted => "converted",
    Dropped => "dropped",
});

status_enum!(ClientStatus, "Lifecycle state of a client.", {
    Active => "active",
    NotProceeding => "notProceeding" | "not_proceeding",
    NotEligible => "notEligible" | "not_eligible",
});

status_enum!(CaseStage, "Pipeline stage of a case.", {
    Processing => "processing",
    Submitted => "submitted",
    UnderReview => "underReview",
    PreApproved => "preApproved",
    Valuation => "valuation",
    FolProcessing => "folProcessing",
    FolReceived => "folReceived",
    FolSigned => "folSigned",
    Disbursed => "disbursed",
    Declined => "declined",
    Withdrawn => "withdrawn",
});

/// Forward progression order; `disbursed` closes the pipeline.
const STAGE_ORDER: [CaseStage; 9] = [
    CaseStage::Processing,
    CaseStage::Submitted,
    CaseStage::UnderReview,
    CaseStage::PreApproved,
    CaseStage::Valuation,
    CaseStage::FolProcessing,
    CaseStage::FolReceived,
    CaseStage::FolSigned,
    CaseStage::Disbursed,
];

impl CaseStage {
    /// Next stage in the forward workflow, `None` at the end or for
    /// `declined`/`withdrawn`.
    pub fn next(self) -> Option<CaseStage> {
        let index = STAGE_ORDER.iter().position(|stage| *stage == self)?;
        STAGE_ORDER.get(index + 1).copied()
    }

    pub fn is_active(self) -> bool {
        !matches!(
            self,
            CaseStage::Disbursed | CaseStage::Declined | CaseStage::Withdrawn
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            CaseStage::Processing => "Processing",
            CaseStage::Submitted => "Submitted",
            CaseStage::UnderReview => "Under Review",
            CaseStage::PreApproved => "Pre-Approved",
            CaseStage::Valuation => "Valuation",
            CaseStage::FolProcessing => "FOL Processing",
            CaseStage::FolReceived => "FOL Received",
            CaseStage::FolSigned => "FOL Signed",
            CaseStage::Disbursed => "Disbursed",
            CaseStage::Declined => "Declined",
            CaseStage::Withdrawn => "Withdrawn",
        }
    }
}

/// A recognised lifecycle state of any entity kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityStatus {
    Lead(LeadStatus),
    Client(ClientStatus),
    Case(CaseStage),
}

impl EntityStatus {
    pub fn kind(self) -> EntityKind {
        match self {
            EntityStatus::Lead(_) => EntityKind::Lead,
            EntityStatus::Client(_) => EntityKind::Client,
            EntityStatus::Case(_) => EntityKind::Case,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityStatus::Lead(status) => status.as_str(),
            EntityStatus::Client(status) => status.as_str(),
            EntityStatus::Case(stage) => stage.as_str(),
        }
    }
}

impl Display for EntityStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parses a raw status or stage for the given kind.
pub fn parse_status(kind: EntityKind, raw: &str) -> Result<EntityStatus, LifecycleError> {
    let unknown = |status: String| LifecycleError::UnknownStatus { kind, status };
    match kind {
        EntityKind::Lead => raw.parse().map(EntityStatus::Lead).map_err(unknown),
        EntityKind::Client => raw.parse().map(EntityStatus::Client).map_err(unknown),
        EntityKind::Case => raw.parse().map(EntityStatus::Case).map_err(unknown),
    }
}

/// Whether the entity has reached a state it cannot leave.
///
/// Wider than the generic transition targets: a `disbursed` case is terminal
/// although it is only reachable through stage advance.
pub fn is_terminal(status: EntityStatus) -> bool {
    match status {
        EntityStatus::Lead(status) => status == LeadStatus::Dropped,
        EntityStatus::Client(status) => matches!(
            status,
            ClientStatus::NotEligible | ClientStatus::NotProceeding
        ),
        EntityStatus::Case(stage) => !stage.is_active(),
    }
}

/// Rule for one `(kind, target)` pair of the generic terminal transition.
#[derive(Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub target: EntityStatus,
    /// Operator-facing action label.
    pub label: &'static str,
    /// Callers must collect a reason before dispatching this transition.
    pub reason_required: bool,
    pub placeholder: &'static str,
}

static LEAD_RULES: [TransitionRule; 1] = [TransitionRule {
    target: EntityStatus::Lead(LeadStatus::Dropped),
    label: "Not Eligible",
    reason_required: false,
    placeholder: "Reason for not eligible?",
}];

static CLIENT_RULES: [TransitionRule; 2] = [
    TransitionRule {
        target: EntityStatus::Client(ClientStatus::NotProceeding),
        label: "Withdrawn",
        reason_required: false,
        placeholder: "Reason for withdrawal?",
    },
    TransitionRule {
        target: EntityStatus::Client(ClientStatus::NotEligible),
        label: "Not Eligible",
        reason_required: false,
        placeholder: "Reason for not eligible?",
    },
];

static CASE_RULES: [TransitionRule; 2] = [
    TransitionRule {
        target: EntityStatus::Case(CaseStage::Withdrawn),
        label: "Withdrawn",
        reason_required: true,
        placeholder: "Reason for withdrawal?",
    },
    TransitionRule {
        target: EntityStatus::Case(CaseStage::Declined),
        label: "Decline",
        reason_required: true,
        placeholder: "Reason for decline?",
    },
];

/// Terminal transition rules of a kind, in the order operators see them.
pub fn transition_rules(kind: EntityKind) -> &'static [TransitionRule] {
    match kind {
        EntityKind::Lead => &LEAD_RULES,
        EntityKind::Client => &CLIENT_RULES,
        EntityKind::Case => &CASE_RULES,
    }
}

/// Checks that `target` is a legal terminal status for `kind`.
pub fn validate_transition(
    kind: EntityKind,
    target: &str,
) -> Result<&'static TransitionRule, LifecycleError> {
    let status = parse_status(kind, target)?;
    let rules = transition_rules(kind);
    rules
        .iter()
        .find(|rule| rule.target == status)
        .ok_or_else(|| LifecycleError::NotTerminal {
            kind,
            status: target.to_string(),
            allowed: rules
                .iter()
                .map(|rule| rule.target.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
}
