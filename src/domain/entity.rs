//! Entity kinds, their per-kind configuration and the shared record shape.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::types::{ActivityId, EntityId, TypeConstraintError};

/// The three pipeline stages an operator manages.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Lead,
    Client,
    Case,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Lead, EntityKind::Client, EntityKind::Case];

    /// Configuration table entry for this kind.
    pub fn profile(self) -> &'static EntityProfile {
        match self {
            EntityKind::Lead => &LEAD_PROFILE,
            EntityKind::Client => &CLIENT_PROFILE,
            EntityKind::Case => &CASE_PROFILE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Lead => "lead",
            EntityKind::Client => "client",
            EntityKind::Case => "case",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TypeConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead" => Ok(EntityKind::Lead),
            "client" => Ok(EntityKind::Client),
            "case" => Ok(EntityKind::Case),
            other => Err(TypeConstraintError::InvalidValue(format!(
                "unknown entity kind '{other}'"
            ))),
        }
    }
}

/// Shape of the detail cache key for a kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailKeyShape {
    /// `[resource, id]`
    Bare,
    /// `[resource, "detail", id]`
    Segmented,
}

/// Shape of the list cache key for a kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListKeyShape {
    /// `[resource, filters]`, invalidated through `[resource]`.
    Root,
    /// `[resource, "list", filters]`, invalidated through `[resource, "list"]`.
    Segmented,
}

/// Per-kind configuration consumed by the generic coordinator, the cache
/// key resolver and the backend adapter.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityProfile {
    /// REST collection and cache root, e.g. `leads`.
    pub resource: &'static str,
    /// Attribute carrying the lifecycle state.
    pub status_field: &'static str,
    /// Collection of transition records on the detail projection.
    pub status_changes_field: &'static str,
    /// Attribute receiving the reason of a terminal transition, if any.
    pub status_reason_field: Option<&'static str>,
    pub detail_key: DetailKeyShape,
    pub list_key: ListKeyShape,
}

static LEAD_PROFILE: EntityProfile = EntityProfile {
    resource: "leads",
    status_field: "status",
    status_changes_field: "statusChanges",
    status_reason_field: None,
    detail_key: DetailKeyShape::Bare,
    list_key: ListKeyShape::Root,
};

static CLIENT_PROFILE: EntityProfile = EntityProfile {
    resource: "clients",
    status_field: "status",
    status_changes_field: "statusChanges",
    status_reason_field: Some("statusReason"),
    detail_key: DetailKeyShape::Segmented,
    list_key: ListKeyShape::Segmented,
};

static CASE_PROFILE: EntityProfile = EntityProfile {
    resource: "cases",
    status_field: "stage",
    status_changes_field: "stageChanges",
    status_reason_field: Some("stageReason"),
    detail_key: DetailKeyShape::Segmented,
    list_key: ListKeyShape::Segmented,
};

pub const NOTES_FIELD: &str = "notes";
pub const CALL_LOGS_FIELD: &str = "callLogs";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CallOutcome {
    Connected,
    #[serde(alias = "no_answer")]
    NoAnswer,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CallOutcome::Connected => "connected",
            CallOutcome::NoAnswer => "noAnswer",
        }
    }
}

impl Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Note {
    pub id: ActivityId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CallLog {
    pub id: ActivityId,
    pub outcome: CallOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Transition record kept in the status (or stage) change collection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub id: ActivityId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Case reference shown on a client (`cases` on the detail projection,
/// `caseId` on list rows).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkedCase {
    pub id: EntityId,
    #[serde(default)]
    pub case_id: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
}

/// Lead conversion result returned by the backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeadConversion {
    pub lead: Value,
    pub client_id: EntityId,
}
