//! Optimistic mutation coordinator.
//!
//! One engine, parameterised by [`EntityKind`], runs every operator mutation
//! through the same four phases: validate, snapshot and write optimistically,
//! dispatch, settle. Settling always invalidates the affected queries; the
//! optimistic value is never treated as final.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use crate::backend::{BackendResult, EntityWriter, StatusUpdate};
use crate::cache::QueryCache;
use crate::cache::keys::{detail_key, list_pattern, root_pattern};
use crate::cache::{CachePatch, KeyPattern};
use crate::domain::entity::EntityKind;
use crate::domain::lifecycle::{LifecycleError, validate_transition};
use crate::domain::types::TempIdSource;

pub mod mutation;
mod optimistic;

pub use mutation::{
    EntityMutation, MutationError, MutationPhase, MutationRequest, MutationResponse,
    PendingMutation, PhaseTrail, SettledMutation,
};

use optimistic::{Stamp, build_patch};

#[derive(Clone, Debug)]
pub struct MutationCoordinator {
    cache: QueryCache,
    temp_ids: Arc<TempIdSource>,
}

impl MutationCoordinator {
    pub fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            temp_ids: Arc::new(TempIdSource::new()),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Runs a mutation end to end against `backend`.
    pub async fn execute<B>(
        &self,
        backend: &B,
        request: MutationRequest,
    ) -> Result<MutationResponse, MutationError>
    where
        B: EntityWriter,
    {
        let pending = self.prepare(request)?;
        let result = dispatch(backend, &pending).await;
        self.settle(pending, result).into_result()
    }

    /// Validates the request and applies its optimistic write.
    ///
    /// A rejected request leaves the cache untouched and is never sent.
    pub fn prepare(&self, request: MutationRequest) -> Result<PendingMutation, MutationError> {
        let mut trail = PhaseTrail::new();
        trail.advance(MutationPhase::Validating);
        log::debug!(
            "Validating {} for {} {}",
            request.mutation.name(),
            request.kind,
            request.entity_id
        );
        let status_update = validate(&request).map_err(|err| {
            log::warn!(
                "Rejected {} for {} {}: {err}",
                request.mutation.name(),
                request.kind,
                request.entity_id
            );
            err
        })?;

        let kind = request.kind;
        let detail_key = detail_key(kind, request.entity_id);

        self.cache.cancel_queries(&KeyPattern::from(&detail_key));
        if request.mutation.touches_lists() {
            self.cache.cancel_queries(&list_pattern(kind));
        }

        let stamp = Stamp {
            id: self.temp_ids.next_id(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let patch: CachePatch = build_patch(&request, status_update.as_ref(), stamp);
        let applied = self.cache.apply(patch);
        trail.advance(MutationPhase::OptimisticallyApplied);

        let mut invalidate = vec![KeyPattern::from(&detail_key), list_pattern(kind)];
        if matches!(request.mutation, EntityMutation::ConvertLead { .. }) {
            invalidate.push(root_pattern(EntityKind::Client));
        }

        log::debug!(
            "Applied optimistic {} to {} cache entries",
            request.mutation.name(),
            applied.touched()
        );

        Ok(PendingMutation {
            request,
            trail,
            detail_key,
            invalidate,
            applied,
            status_update,
        })
    }

    /// Settles a pending mutation with its backend result.
    ///
    /// Success releases the optimistic write and invalidates the affected
    /// queries. Failure rolls the optimistic write back, invalidates, and
    /// carries the error.
    pub fn settle(
        &self,
        pending: PendingMutation,
        result: BackendResult<MutationResponse>,
    ) -> SettledMutation {
        let PendingMutation {
            request,
            mut trail,
            invalidate,
            applied,
            ..
        } = pending;
        trail.advance(MutationPhase::Settling);
        let name = request.mutation.name();
        let kind = request.kind;
        let id = request.entity_id;

        let outcome = match result {
            Ok(response) => {
                self.cache.release(applied.snapshots());
                trail.advance(MutationPhase::Committed);
                log::info!("Committed {name} for {kind} {id}");
                Ok(response)
            }
            Err(err) => {
                let restored = self.cache.restore(applied.snapshots());
                trail.advance(MutationPhase::RolledBack);
                log::warn!(
                    "Rolled back {name} for {kind} {id} ({restored} entries restored): {err}"
                );
                Err(MutationError::Backend(err))
            }
        };

        for pattern in &invalidate {
            self.cache.invalidate_queries(pattern);
        }

        SettledMutation {
            request,
            trail,
            outcome,
        }
    }
}

fn validate(request: &MutationRequest) -> Result<Option<StatusUpdate>, MutationError> {
    let kind = request.kind;
    let require = |expected: EntityKind| {
        if kind == expected {
            Ok(())
        } else {
            Err(MutationError::from(LifecycleError::UnsupportedOperation {
                kind,
                operation: request.mutation.name(),
            }))
        }
    };

    match &request.mutation {
        EntityMutation::AddNote { .. } | EntityMutation::LogCall { .. } => Ok(None),
        EntityMutation::UpdateStatus {
            status,
            reason,
            notes,
        } => {
            let rule = validate_transition(kind, status)?;
            Ok(Some(StatusUpdate {
                status: rule.target,
                reason: reason.as_ref().map(|r| r.as_str().to_string()),
                notes: notes.as_ref().map(|n| n.as_str().to_string()),
            }))
        }
        EntityMutation::AdvanceStage { .. } | EntityMutation::SetStage { .. } => {
            require(EntityKind::Case).map(|_| None)
        }
        EntityMutation::ConvertLead { .. } => require(EntityKind::Lead).map(|_| None),
        EntityMutation::UpdateFields { fields } => {
            if fields.is_empty() {
                return Err(MutationError::Validation("no fields to update".to_string()));
            }
            let status_field = kind.profile().status_field;
            if let Some(field) = fields
                .keys()
                .find(|field| *field == "id" || *field == status_field)
            {
                return Err(MutationError::Validation(format!(
                    "field '{field}' cannot be updated directly"
                )));
            }
            Ok(None)
        }
    }
}

async fn dispatch<B>(backend: &B, pending: &PendingMutation) -> BackendResult<MutationResponse>
where
    B: EntityWriter,
{
    let request = &pending.request;
    let kind = request.kind;
    let id = request.entity_id;
    let text = |value: &Option<crate::domain::types::NonEmptyString>| {
        value.as_ref().map(|v| v.as_str().to_string())
    };

    match &request.mutation {
        EntityMutation::AddNote { content } => backend
            .add_note(kind, id, content)
            .await
            .map(MutationResponse::Note),
        EntityMutation::LogCall { outcome, notes } => backend
            .log_call(kind, id, *outcome, text(notes))
            .await
            .map(MutationResponse::CallLog),
        EntityMutation::UpdateStatus { .. } => match &pending.status_update {
            Some(update) => backend
                .update_status(kind, id, update)
                .await
                .map(MutationResponse::Entity),
            None => Err(crate::backend::BackendError::Unexpected(
                "status update dispatched without a validated target".to_string(),
            )),
        },
        EntityMutation::AdvanceStage { notes } => backend
            .advance_stage(id, text(notes))
            .await
            .map(MutationResponse::Entity),
        EntityMutation::SetStage { stage, notes } => backend
            .set_stage(id, *stage, text(notes))
            .await
            .map(MutationResponse::Entity),
        EntityMutation::ConvertLead { notes } => backend
            .convert_lead(id, text(notes))
            .await
            .map(MutationResponse::Conversion),
        EntityMutation::UpdateFields { fields } => backend
            .update_fields(kind, id, fields)
            .await
            .map(MutationResponse::Entity),
    }
}
