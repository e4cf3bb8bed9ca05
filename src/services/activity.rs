//! Services for logging operator activity against an entity.

use crate::backend::EntityWriter;
use crate::coordinator::{EntityMutation, MutationCoordinator, MutationRequest, MutationResponse};
use crate::domain::entity::{CallLog, EntityKind, Note};
use crate::domain::types::EntityId;
use crate::forms::activity::{AddNoteForm, LogCallForm};
use crate::services::{ServiceError, ServiceResult};

/// Attaches a note, showing it immediately at the head of the detail view.
pub async fn add_note<B>(
    coordinator: &MutationCoordinator,
    backend: &B,
    kind: EntityKind,
    entity_id: i64,
    form: AddNoteForm,
) -> ServiceResult<Note>
where
    B: EntityWriter,
{
    let entity_id = EntityId::new(entity_id)?;
    let mutation = EntityMutation::try_from(form)?;

    let response = coordinator
        .execute(backend, MutationRequest::new(kind, entity_id, mutation))
        .await
        .map_err(|err| {
            log::error!("Failed to add note to {kind} {entity_id}: {err}");
            err
        })?;

    match response {
        MutationResponse::Note(note) => Ok(note),
        other => Err(ServiceError::Unexpected(format!(
            "unexpected add note response: {other:?}"
        ))),
    }
}

/// Logs a call outcome with optional notes.
pub async fn log_call<B>(
    coordinator: &MutationCoordinator,
    backend: &B,
    kind: EntityKind,
    entity_id: i64,
    form: LogCallForm,
) -> ServiceResult<CallLog>
where
    B: EntityWriter,
{
    let entity_id = EntityId::new(entity_id)?;
    let mutation = EntityMutation::try_from(form)?;

    let response = coordinator
        .execute(backend, MutationRequest::new(kind, entity_id, mutation))
        .await
        .map_err(|err| {
            log::error!("Failed to log call for {kind} {entity_id}: {err}");
            err
        })?;

    match response {
        MutationResponse::CallLog(call) => Ok(call),
        other => Err(ServiceError::Unexpected(format!(
            "unexpected log call response: {other:?}"
        ))),
    }
}
