//! Services moving entities through their lifecycle.

use serde_json::{Map, Value};

use crate::backend::EntityWriter;
use crate::coordinator::{EntityMutation, MutationCoordinator, MutationRequest, MutationResponse};
use crate::domain::entity::{EntityKind, LeadConversion};
use crate::domain::types::EntityId;
use crate::forms::lifecycle::{StageForm, TransitionNotesForm, UpdateStatusForm};
use crate::services::{ServiceError, ServiceResult};

async fn run<B>(
    coordinator: &MutationCoordinator,
    backend: &B,
    request: MutationRequest,
) -> ServiceResult<MutationResponse>
where
    B: EntityWriter,
{
    let name = request.mutation.name();
    let kind = request.kind;
    let id = request.entity_id;
    coordinator
        .execute(backend, request)
        .await
        .map_err(|err| {
            log::error!("Failed to {name} for {kind} {id}: {err}");
            ServiceError::from(err)
        })
}

fn into_entity(response: MutationResponse) -> ServiceResult<Value> {
    match response {
        MutationResponse::Entity(value) => Ok(value),
        other => Err(ServiceError::Unexpected(format!(
            "expected an entity response, got {other:?}"
        ))),
    }
}

/// Moves an entity to one of its terminal statuses.
pub async fn update_status<B>(
    coordinator: &MutationCoordinator,
    backend: &B,
    kind: EntityKind,
    entity_id: i64,
    form: UpdateStatusForm,
) -> ServiceResult<Value>
where
    B: EntityWriter,
{
    let entity_id = EntityId::new(entity_id)?;
    let mutation = form.into_mutation(kind)?;
    let response = run(
        coordinator,
        backend,
        MutationRequest::new(kind, entity_id, mutation),
    )
    .await?;
    into_entity(response)
}

/// Advances a case to the next stage of the pipeline.
pub async fn advance_stage<B>(
    coordinator: &MutationCoordinator,
    backend: &B,
    case_id: i64,
    form: TransitionNotesForm,
) -> ServiceResult<Value>
where
    B: EntityWriter,
{
    let case_id = EntityId::new(case_id)?;
    let notes = form.into_notes()?;
    let response = run(
        coordinator,
        backend,
        MutationRequest::new(
            EntityKind::Case,
            case_id,
            EntityMutation::AdvanceStage { notes },
        ),
    )
    .await?;
    into_entity(response)
}

/// Sets a case stage directly, as when dropped on a pipeline column.
pub async fn set_stage<B>(
    coordinator: &MutationCoordinator,
    backend: &B,
    case_id: i64,
    form: StageForm,
) -> ServiceResult<Value>
where
    B: EntityWriter,
{
    let case_id = EntityId::new(case_id)?;
    let mutation = EntityMutation::try_from(form)?;
    let response = run(
        coordinator,
        backend,
        MutationRequest::new(EntityKind::Case, case_id, mutation),
    )
    .await?;
    into_entity(response)
}

/// Converts a lead into a client.
pub async fn convert_lead<B>(
    coordinator: &MutationCoordinator,
    backend: &B,
    lead_id: i64,
    form: TransitionNotesForm,
) -> ServiceResult<LeadConversion>
where
    B: EntityWriter,
{
    let lead_id = EntityId::new(lead_id)?;
    let notes = form.into_notes()?;
    let response = run(
        coordinator,
        backend,
        MutationRequest::new(
            EntityKind::Lead,
            lead_id,
            EntityMutation::ConvertLead { notes },
        ),
    )
    .await?;

    match response {
        MutationResponse::Conversion(conversion) => {
            log::info!("Lead {lead_id} converted to client {}", conversion.client_id);
            Ok(conversion)
        }
        other => Err(ServiceError::Unexpected(format!(
            "unexpected conversion response: {other:?}"
        ))),
    }
}

/// Updates plain attributes of an entity.
pub async fn update_fields<B>(
    coordinator: &MutationCoordinator,
    backend: &B,
    kind: EntityKind,
    entity_id: i64,
    fields: Map<String, Value>,
) -> ServiceResult<Value>
where
    B: EntityWriter,
{
    let entity_id = EntityId::new(entity_id)?;
    let response = run(
        coordinator,
        backend,
        MutationRequest::new(kind, entity_id, EntityMutation::UpdateFields { fields }),
    )
    .await?;
    into_entity(response)
}
