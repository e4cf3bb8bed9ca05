//! Contract with the brokerage REST backend.
//!
//! Reads and writes are split into two traits the same way services depend
//! on them: the read path only needs [`EntityReader`], the mutation
//! coordinator only [`EntityWriter`].

use serde_json::{Map, Value};

use crate::domain::entity::{CallLog, CallOutcome, EntityKind, LeadConversion, Note};
use crate::domain::lifecycle::{CaseStage, EntityStatus};
use crate::domain::types::{EntityId, NoteContent};
use crate::pagination::ListQuery;

pub mod errors;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "test-mocks")]
pub mod mock;

pub use errors::{BackendError, BackendResult};

/// Payload of a terminal status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: EntityStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait EntityReader {
    async fn fetch_detail(&self, kind: EntityKind, id: EntityId) -> BackendResult<Value>;
    /// Returns the raw list body: a bare array or a paginated envelope.
    async fn fetch_list(&self, kind: EntityKind, query: &ListQuery) -> BackendResult<Value>;
}

#[allow(async_fn_in_trait)]
pub trait EntityWriter {
    async fn add_note(
        &self,
        kind: EntityKind,
        id: EntityId,
        content: &NoteContent,
    ) -> BackendResult<Note>;
    async fn log_call(
        &self,
        kind: EntityKind,
        id: EntityId,
        outcome: CallOutcome,
        notes: Option<String>,
    ) -> BackendResult<CallLog>;
    async fn update_status(
        &self,
        kind: EntityKind,
        id: EntityId,
        update: &StatusUpdate,
    ) -> BackendResult<Value>;
    async fn advance_stage(&self, id: EntityId, notes: Option<String>) -> BackendResult<Value>;
    async fn set_stage(
        &self,
        id: EntityId,
        stage: CaseStage,
        notes: Option<String>,
    ) -> BackendResult<Value>;
    async fn convert_lead(&self, id: EntityId, notes: Option<String>)
    -> BackendResult<LeadConversion>;
    async fn update_fields(
        &self,
        kind: EntityKind,
        id: EntityId,
        fields: &Map<String, Value>,
    ) -> BackendResult<Value>;
}
