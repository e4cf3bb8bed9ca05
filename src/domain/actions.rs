//! Operator action policy.
//!
//! A single pure function derives the actions offered for an entity. List
//! rows and detail panel headers both render the [`ActionSet`] it returns, so
//! the two surfaces can never present different capabilities for the same
//! entity state.

use serde::Serialize;
use serde_json::Value;

use crate::domain::entity::{EntityKind, LinkedCase};
use crate::domain::lifecycle::{
    CaseStage, EntityStatus, LeadStatus, LifecycleError, TransitionRule, is_terminal,
    parse_status, transition_rules,
};
use crate::domain::types::EntityId;

/// Visual weight of a dropdown action.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionVariant {
    Success,
    Warning,
    Danger,
}

/// A terminal transition offered through the generic status update.
#[derive(Clone, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct StatusAction {
    pub status: &'static str,
    pub label: &'static str,
    pub variant: ActionVariant,
    pub placeholder: &'static str,
    pub reason_required: bool,
}

impl StatusAction {
    fn from_rule(rule: &TransitionRule, variant: ActionVariant) -> Self {
        Self {
            status: rule.target.as_str(),
            label: rule.label,
            variant,
            placeholder: rule.placeholder,
            reason_required: rule.reason_required,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    /// Navigate to the owning or converted client.
    LinkToClient { client_id: EntityId },
    /// Menu of the cases opened for a client.
    CasesMenu { cases: Vec<EntityId> },
    AddNote,
    LogCall,
    /// Lead → client conversion.
    Convert,
    /// Opens case creation for a client.
    ConvertToCase,
    /// Case forward progression.
    AdvanceStage { label: String },
    MarkStatus(StatusAction),
}

pub type ActionSet = Vec<Action>;

/// Kind-specific references the policy needs beyond the derived flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionSubject {
    Lead {
        converted_client_id: Option<EntityId>,
    },
    Client {
        cases: Vec<EntityId>,
    },
    Case {
        client_id: Option<EntityId>,
        next_stage: Option<CaseStage>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionContext {
    pub subject: ActionSubject,
    /// Reached its terminal state or stage.
    pub is_terminal: bool,
    /// Progressed far enough to expose a cross-reference action.
    pub is_actioned: bool,
    /// Opened read-only from a cross-reference.
    pub view_only: bool,
}

impl ActionContext {
    /// Derives the context from a cached projection of the entity.
    ///
    /// Accepts both list rows and detail records: client list rows carry
    /// their cases under `caseId`, detail records under `cases`.
    pub fn from_record(
        kind: EntityKind,
        record: &Value,
        view_only: bool,
    ) -> Result<Self, LifecycleError> {
        let raw = record
            .get(kind.profile().status_field)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let status = parse_status(kind, raw)?;

        let subject = match status {
            EntityStatus::Lead(_) => ActionSubject::Lead {
                converted_client_id: id_field(record.get("convertedClientId")),
            },
            EntityStatus::Client(_) => {
                let cases = record
                    .get("cases")
                    .filter(|value| value.is_array())
                    .or_else(|| record.get("caseId"))
                    .and_then(|value| {
                        serde_json::from_value::<Vec<LinkedCase>>(value.clone()).ok()
                    })
                    .unwrap_or_default();
                ActionSubject::Client {
                    cases: cases.into_iter().map(|case| case.id).collect(),
                }
            }
            EntityStatus::Case(stage) => ActionSubject::Case {
                client_id: id_field(record.get("client").and_then(|client| client.get("id")))
                    .or_else(|| id_field(record.get("clientId"))),
                next_stage: stage.next(),
            },
        };

        Ok(Self::new(status, subject, view_only))
    }

    /// Builds the context computing the derived flags from the status.
    pub fn new(status: EntityStatus, subject: ActionSubject, view_only: bool) -> Self {
        let is_actioned = match (&status, &subject) {
            (EntityStatus::Lead(lead), _) => *lead == LeadStatus::Converted,
            (EntityStatus::Client(_), ActionSubject::Client { cases }) => !cases.is_empty(),
            (EntityStatus::Case(_), _) => true,
            _ => false,
        };
        Self {
            subject,
            is_terminal: is_terminal(status),
            is_actioned,
            view_only,
        }
    }
}

fn id_field(value: Option<&Value>) -> Option<EntityId> {
    value
        .and_then(Value::as_i64)
        .and_then(|id| EntityId::new(id).ok())
}

/// Returns the ordered actions an operator may take on the entity.
pub fn available_actions(ctx: &ActionContext) -> ActionSet {
    if ctx.view_only {
        return Vec::new();
    }

    match &ctx.subject {
        ActionSubject::Lead {
            converted_client_id,
        } => lead_actions(ctx, *converted_client_id),
        ActionSubject::Client { cases } => client_actions(ctx, cases),
        ActionSubject::Case {
            client_id,
            next_stage,
        } => case_actions(ctx, *client_id, *next_stage),
    }
}

fn lead_actions(ctx: &ActionContext, converted_client_id: Option<EntityId>) -> ActionSet {
    if ctx.is_terminal {
        return Vec::new();
    }

    if ctx.is_actioned {
        let mut actions = Vec::with_capacity(3);
        if let Some(client_id) = converted_client_id {
            actions.push(Action::LinkToClient { client_id });
        }
        actions.extend([Action::AddNote, Action::LogCall]);
        return actions;
    }

    let mut actions = vec![Action::AddNote, Action::LogCall, Action::Convert];
    actions.extend(
        transition_rules(EntityKind::Lead)
            .iter()
            .map(|rule| Action::MarkStatus(StatusAction::from_rule(rule, ActionVariant::Danger))),
    );
    actions
}

fn client_actions(ctx: &ActionContext, cases: &[EntityId]) -> ActionSet {
    let cases_menu = || Action::CasesMenu {
        cases: cases.to_vec(),
    };

    if ctx.is_terminal {
        return if cases.is_empty() {
            Vec::new()
        } else {
            vec![cases_menu()]
        };
    }

    if ctx.is_actioned && !cases.is_empty() {
        return vec![cases_menu(), Action::AddNote, Action::LogCall];
    }

    let mut actions = vec![Action::AddNote, Action::LogCall, Action::ConvertToCase];
    actions.extend(transition_rules(EntityKind::Client).iter().map(|rule| {
        let variant = if rule.target.as_str() == "notProceeding" {
            ActionVariant::Warning
        } else {
            ActionVariant::Danger
        };
        Action::MarkStatus(StatusAction::from_rule(rule, variant))
    }));
    actions
}

fn case_actions(
    ctx: &ActionContext,
    client_id: Option<EntityId>,
    next_stage: Option<CaseStage>,
) -> ActionSet {
    let mut actions = Vec::with_capacity(6);
    if let Some(client_id) = client_id {
        actions.push(Action::LinkToClient { client_id });
    }

    if ctx.is_terminal {
        return actions;
    }

    actions.extend([Action::AddNote, Action::LogCall]);
    actions.push(Action::AdvanceStage {
        label: next_stage
            .map(CaseStage::label)
            .unwrap_or("Advance")
            .to_string(),
    });
    actions.extend(transition_rules(EntityKind::Case).iter().map(|rule| {
        let variant = if rule.target.as_str() == "withdrawn" {
            ActionVariant::Warning
        } else {
            ActionVariant::Danger
        };
        Action::MarkStatus(StatusAction::from_rule(rule, variant))
    }));
    actions
}
