//! Mutation requests, their lifecycle phases and outcomes.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::backend::{BackendError, StatusUpdate};
use crate::cache::{AppliedPatch, KeyPattern, QueryKey};
use crate::domain::entity::{CallLog, CallOutcome, EntityKind, LeadConversion, Note};
use crate::domain::lifecycle::{CaseStage, LifecycleError};
use crate::domain::types::{EntityId, NonEmptyString, NoteContent, TransitionReason};

/// Operator intent against one entity.
#[derive(Clone, Debug, PartialEq)]
pub enum EntityMutation {
    AddNote {
        content: NoteContent,
    },
    LogCall {
        outcome: CallOutcome,
        notes: Option<NonEmptyString>,
    },
    /// Generic terminal transition; `status` is checked against the kind's
    /// rules before anything else happens.
    UpdateStatus {
        status: String,
        reason: Option<TransitionReason>,
        notes: Option<NonEmptyString>,
    },
    AdvanceStage {
        notes: Option<NonEmptyString>,
    },
    SetStage {
        stage: CaseStage,
        notes: Option<NonEmptyString>,
    },
    ConvertLead {
        notes: Option<NonEmptyString>,
    },
    UpdateFields {
        fields: Map<String, Value>,
    },
}

impl EntityMutation {
    pub fn name(&self) -> &'static str {
        match self {
            EntityMutation::AddNote { .. } => "add note",
            EntityMutation::LogCall { .. } => "log call",
            EntityMutation::UpdateStatus { .. } => "update status",
            EntityMutation::AdvanceStage { .. } => "advance stage",
            EntityMutation::SetStage { .. } => "set stage",
            EntityMutation::ConvertLead { .. } => "convert lead",
            EntityMutation::UpdateFields { .. } => "update fields",
        }
    }

    /// Mutations that rewrite list rows and so also cancel list fetches.
    pub fn touches_lists(&self) -> bool {
        !matches!(
            self,
            EntityMutation::AddNote { .. } | EntityMutation::LogCall { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MutationRequest {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub mutation: EntityMutation,
}

impl MutationRequest {
    pub fn new(kind: EntityKind, entity_id: EntityId, mutation: EntityMutation) -> Self {
        Self {
            kind,
            entity_id,
            mutation,
        }
    }
}

/// Lifecycle of one mutation.
///
/// `Idle → Validating → OptimisticallyApplied → Settling → Committed |
/// RolledBack`, or `Validating → Rejected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationPhase {
    Idle,
    Validating,
    OptimisticallyApplied,
    Settling,
    Committed,
    RolledBack,
    Rejected,
}

impl MutationPhase {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_advance_to(self, next: MutationPhase) -> bool {
        use MutationPhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, OptimisticallyApplied)
                | (Validating, Rejected)
                | (OptimisticallyApplied, Settling)
                | (Settling, Committed)
                | (Settling, RolledBack)
        )
    }

    pub fn is_final(self) -> bool {
        matches!(
            self,
            MutationPhase::Committed | MutationPhase::RolledBack | MutationPhase::Rejected
        )
    }
}

/// Phases a mutation has passed through, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseTrail(Vec<MutationPhase>);

impl PhaseTrail {
    pub(crate) fn new() -> Self {
        Self(vec![MutationPhase::Idle])
    }

    pub fn current(&self) -> MutationPhase {
        self.0.last().copied().unwrap_or(MutationPhase::Idle)
    }

    pub fn phases(&self) -> &[MutationPhase] {
        &self.0
    }

    pub(crate) fn advance(&mut self, next: MutationPhase) {
        debug_assert!(
            self.current().can_advance_to(next),
            "illegal mutation transition {:?} -> {next:?}",
            self.current()
        );
        self.0.push(next);
    }
}

/// Authoritative backend reply of a committed mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationResponse {
    Note(Note),
    CallLog(CallLog),
    Entity(Value),
    Conversion(LeadConversion),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MutationError {
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] LifecycleError),

    #[error("validation error: {0}")]
    Validation(String),

    /// Raised after the optimistic write has been rolled back.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl MutationError {
    /// Phase the mutation ended in.
    pub fn phase(&self) -> MutationPhase {
        match self {
            MutationError::InvalidTransition(_) | MutationError::Validation(_) => {
                MutationPhase::Rejected
            }
            MutationError::Backend(_) => MutationPhase::RolledBack,
        }
    }
}

/// A mutation whose optimistic write is visible in the cache and which
/// awaits its backend result.
///
/// Only values of this type can be settled, so a mutation cannot commit
/// without having passed validation.
#[derive(Debug)]
pub struct PendingMutation {
    pub(crate) request: MutationRequest,
    pub(crate) trail: PhaseTrail,
    pub(crate) detail_key: QueryKey,
    pub(crate) invalidate: Vec<KeyPattern>,
    pub(crate) applied: AppliedPatch,
    pub(crate) status_update: Option<StatusUpdate>,
}

impl PendingMutation {
    pub fn phase(&self) -> MutationPhase {
        self.trail.current()
    }

    pub fn trail(&self) -> &PhaseTrail {
        &self.trail
    }

    pub fn request(&self) -> &MutationRequest {
        &self.request
    }

    pub fn detail_key(&self) -> &QueryKey {
        &self.detail_key
    }

    /// Pre-images captured by the optimistic write.
    pub fn applied(&self) -> &AppliedPatch {
        &self.applied
    }

    /// Patterns invalidated once the mutation settles.
    pub fn invalidations(&self) -> &[KeyPattern] {
        &self.invalidate
    }
}

/// A mutation that reached `Committed` or `RolledBack`.
#[derive(Debug)]
pub struct SettledMutation {
    pub(crate) request: MutationRequest,
    pub(crate) trail: PhaseTrail,
    pub(crate) outcome: Result<MutationResponse, MutationError>,
}

impl SettledMutation {
    pub fn phase(&self) -> MutationPhase {
        self.trail.current()
    }

    pub fn trail(&self) -> &PhaseTrail {
        &self.trail
    }

    pub fn request(&self) -> &MutationRequest {
        &self.request
    }

    pub fn outcome(&self) -> &Result<MutationResponse, MutationError> {
        &self.outcome
    }

    pub fn into_result(self) -> Result<MutationResponse, MutationError> {
        self.outcome
    }
}
