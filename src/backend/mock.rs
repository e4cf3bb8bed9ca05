//! Mock backend for isolating services in tests.

use mockall::mock;
use serde_json::{Map, Value};

use crate::backend::{BackendResult, EntityReader, EntityWriter, StatusUpdate};
use crate::domain::entity::{CallLog, CallOutcome, EntityKind, LeadConversion, Note};
use crate::domain::lifecycle::CaseStage;
use crate::domain::types::{EntityId, NoteContent};
use crate::pagination::ListQuery;

mock! {
    pub Backend {}

    impl EntityReader for Backend {
        async fn fetch_detail(&self, kind: EntityKind, id: EntityId) -> BackendResult<Value>;
        async fn fetch_list(&self, kind: EntityKind, query: &ListQuery) -> BackendResult<Value>;
    }

    impl EntityWriter for Backend {
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
        async fn convert_lead(
            &self,
            id: EntityId,
            notes: Option<String>,
        ) -> BackendResult<LeadConversion>;
        async fn update_fields(
            &self,
            kind: EntityKind,
            id: EntityId,
            fields: &Map<String, Value>,
        ) -> BackendResult<Value>;
    }
}
