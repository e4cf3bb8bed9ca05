#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use brokerage_console::backend::{
    BackendError, BackendResult, EntityReader, EntityWriter, StatusUpdate,
};
use brokerage_console::domain::entity::{CallLog, CallOutcome, EntityKind, LeadConversion, Note};
use brokerage_console::domain::lifecycle::CaseStage;
use brokerage_console::domain::types::{ActivityId, EntityId, NoteContent};
use brokerage_console::pagination::ListQuery;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn id(value: i64) -> EntityId {
    EntityId::new(value).expect("valid id")
}

/// Holds a write call open until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// In-memory backend holding the authoritative entity state.
#[derive(Default)]
pub struct ScriptedBackend {
    records: Mutex<HashMap<(EntityKind, i64), Value>>,
    fail_with: Mutex<Option<BackendError>>,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Gate>>>,
    next_id: AtomicI64,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    pub fn with_record(self, kind: EntityKind, record: Value) -> Self {
        let id = record["id"].as_i64().expect("record id");
        self.records.lock().insert((kind, id), record);
        self
    }

    /// Makes every following write fail with `err`.
    pub fn fail_writes(&self, err: BackendError) {
        *self.fail_with.lock() = Some(err);
    }

    pub fn gate_writes(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn record(&self, kind: EntityKind, id: i64) -> Option<Value> {
        self.records.lock().get(&(kind, id)).cloned()
    }

    fn next_activity_id(&self) -> ActivityId {
        ActivityId::new(self.next_id.fetch_add(1, Ordering::Relaxed)).expect("positive id")
    }

    async fn write(&self, call: String) -> BackendResult<()> {
        self.calls.lock().push(call);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        match self.fail_with.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn modify<F>(&self, kind: EntityKind, id: EntityId, edit: F) -> BackendResult<Value>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut records = self.records.lock();
        let record = records
            .get_mut(&(kind, id.get()))
            .ok_or(BackendError::NotFound)?;
        let fields = record
            .as_object_mut()
            .ok_or_else(|| BackendError::Unexpected("record is not an object".into()))?;
        edit(fields);
        Ok(record.clone())
    }

    fn push(fields: &mut Map<String, Value>, field: &str, item: Value) {
        let items = fields.entry(field.to_string()).or_insert_with(|| json!([]));
        if let Some(items) = items.as_array_mut() {
            items.insert(0, item);
        }
    }
}

impl EntityReader for ScriptedBackend {
    async fn fetch_detail(&self, kind: EntityKind, id: EntityId) -> BackendResult<Value> {
        self.calls.lock().push(format!("fetch_detail {kind} {id}"));
        self.record(kind, id.get()).ok_or(BackendError::NotFound)
    }

    async fn fetch_list(&self, kind: EntityKind, _query: &ListQuery) -> BackendResult<Value> {
        self.calls.lock().push(format!("fetch_list {kind}"));
        let mut rows: Vec<(i64, Value)> = self
            .records
            .lock()
            .iter()
            .filter(|((record_kind, _), _)| *record_kind == kind)
            .map(|((_, id), record)| (*id, record.clone()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        Ok(Value::Array(rows.into_iter().map(|(_, row)| row).collect()))
    }
}

impl EntityWriter for ScriptedBackend {
    async fn add_note(
        &self,
        kind: EntityKind,
        id: EntityId,
        content: &NoteContent,
    ) -> BackendResult<Note> {
        self.write(format!("add_note {kind} {id}")).await?;
        let note = Note {
            id: self.next_activity_id(),
            content: content.as_str().to_string(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&note)?;
        self.modify(kind, id, |fields| Self::push(fields, "notes", value))?;
        Ok(note)
    }

    async fn log_call(
        &self,
        kind: EntityKind,
        id: EntityId,
        outcome: CallOutcome,
        notes: Option<String>,
    ) -> BackendResult<CallLog> {
        self.write(format!("log_call {kind} {id}")).await?;
        let call = CallLog {
            id: self.next_activity_id(),
            outcome,
            notes,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&call)?;
        self.modify(kind, id, |fields| Self::push(fields, "callLogs", value))?;
        Ok(call)
    }

    async fn update_status(
        &self,
        kind: EntityKind,
        id: EntityId,
        update: &StatusUpdate,
    ) -> BackendResult<Value> {
        self.write(format!("update_status {kind} {id} {}", update.status))
            .await?;
        let profile = kind.profile();
        self.modify(kind, id, |fields| {
            fields.insert(profile.status_field.into(), json!(update.status.as_str()));
            if let (Some(field), Some(reason)) = (profile.status_reason_field, &update.reason) {
                fields.insert(field.into(), json!(reason));
            }
        })
    }

    async fn advance_stage(&self, id: EntityId, _notes: Option<String>) -> BackendResult<Value> {
        self.write(format!("advance_stage {id}")).await?;
        self.modify(EntityKind::Case, id, |fields| {
            let next = fields
                .get("stage")
                .and_then(Value::as_str)
                .and_then(|stage| stage.parse::<CaseStage>().ok())
                .and_then(CaseStage::next);
            if let Some(next) = next {
                fields.insert("stage".into(), json!(next.as_str()));
            }
        })
    }

    async fn set_stage(
        &self,
        id: EntityId,
        stage: CaseStage,
        _notes: Option<String>,
    ) -> BackendResult<Value> {
        self.write(format!("set_stage {id} {stage}")).await?;
        self.modify(EntityKind::Case, id, |fields| {
            fields.insert("stage".into(), json!(stage.as_str()));
        })
    }

    async fn convert_lead(
        &self,
        id: EntityId,
        _notes: Option<String>,
    ) -> BackendResult<LeadConversion> {
        self.write(format!("convert_lead {id}")).await?;
        let client_id = EntityId::new(self.next_id.fetch_add(1, Ordering::Relaxed))?;
        let lead = self.modify(EntityKind::Lead, id, |fields| {
            fields.insert("status".into(), json!("converted"));
            fields.insert("convertedClientId".into(), json!(client_id.get()));
        })?;
        Ok(LeadConversion { lead, client_id })
    }

    async fn update_fields(
        &self,
        kind: EntityKind,
        id: EntityId,
        fields: &Map<String, Value>,
    ) -> BackendResult<Value> {
        self.write(format!("update_fields {kind} {id}")).await?;
        self.modify(kind, id, |record| record.extend(fields.clone()))
    }
}
