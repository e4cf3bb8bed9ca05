//! Optimistic cache patches, one builder per mutation.

use serde_json::{Map, Value, json};

use crate::backend::StatusUpdate;
use crate::cache::CachePatch;
use crate::cache::keys::{detail_key, list_pattern};
use crate::coordinator::mutation::{EntityMutation, MutationRequest};
use crate::domain::entity::{CALL_LOGS_FIELD, EntityKind, NOTES_FIELD};
use crate::domain::lifecycle::{CaseStage, LeadStatus};
use crate::domain::types::ActivityId;

/// Locally generated values stamped on new activity entries.
#[derive(Clone, Debug)]
pub(crate) struct Stamp {
    pub id: ActivityId,
    pub timestamp: String,
}

/// Builds a JSON object leaving out absent values.
fn entry(pairs: Vec<(&str, Option<Value>)>) -> Value {
    Value::Object(
        pairs
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect(),
    )
}

/// Prepends `item` to the array under `field`, creating it if needed.
fn prepend(fields: &mut Map<String, Value>, field: &str, item: Value) {
    let mut items = match fields.remove(field) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    items.insert(0, item);
    fields.insert(field.to_string(), Value::Array(items));
}

fn patch_object<F>(old: &Value, edit: F) -> Option<Value>
where
    F: FnOnce(&mut Map<String, Value>),
{
    let mut fields = old.as_object()?.clone();
    edit(&mut fields);
    Some(Value::Object(fields))
}

fn current_stage(fields: &Map<String, Value>) -> Option<CaseStage> {
    fields.get("stage")?.as_str()?.parse().ok()
}

/// Builds the patch a request writes before dispatch.
pub(crate) fn build_patch(
    request: &MutationRequest,
    status_update: Option<&StatusUpdate>,
    stamp: Stamp,
) -> CachePatch {
    let kind = request.kind;
    let id = request.entity_id;
    let key = detail_key(kind, id);
    let profile = kind.profile();
    let Stamp {
        id: temp_id,
        timestamp,
    } = stamp;

    match &request.mutation {
        EntityMutation::AddNote { content } => {
            let note = entry(vec![
                ("id", Some(json!(temp_id))),
                ("content", Some(json!(content.as_str()))),
                ("timestamp", Some(json!(timestamp))),
            ]);
            CachePatch::new().detail(key, move |old| {
                patch_object(old, |fields| prepend(fields, NOTES_FIELD, note))
            })
        }

        EntityMutation::LogCall { outcome, notes } => {
            let call = entry(vec![
                ("id", Some(json!(temp_id))),
                ("outcome", Some(json!(outcome.as_str()))),
                ("notes", notes.as_ref().map(|n| json!(n.as_str()))),
                ("timestamp", Some(json!(timestamp))),
            ]);
            CachePatch::new().detail(key, move |old| {
                patch_object(old, |fields| prepend(fields, CALL_LOGS_FIELD, call))
            })
        }

        EntityMutation::UpdateStatus { .. } => {
            let Some(update) = status_update.cloned() else {
                return CachePatch::new();
            };
            let target = update.status.as_str();
            let status_field = profile.status_field;
            let reason_field = profile.status_reason_field;
            let is_case = kind == EntityKind::Case;

            let detail = move |old: &Value| {
                patch_object(old, |fields| {
                    let from_stage = fields.get(status_field).cloned().filter(|_| is_case);
                    let change = entry(vec![
                        ("id", Some(json!(temp_id))),
                        ("type", Some(json!(target))),
                        ("fromStage", from_stage),
                        ("toStage", is_case.then(|| json!(target))),
                        ("reason", update.reason.as_ref().map(|r| json!(r))),
                        ("notes", update.notes.as_ref().map(|n| json!(n))),
                        ("timestamp", Some(json!(timestamp))),
                    ]);
                    fields.insert(status_field.to_string(), json!(target));
                    if let (Some(field), Some(reason)) = (reason_field, &update.reason) {
                        fields.insert(field.to_string(), json!(reason));
                    }
                    prepend(fields, profile.status_changes_field, change);
                })
            };

            CachePatch::new()
                .detail(key, detail)
                .sweep(list_pattern(kind), id, move |row| {
                    let mut row = row.clone();
                    row.insert(status_field.to_string(), json!(target));
                    row
                })
        }

        EntityMutation::AdvanceStage { notes } => {
            let notes = notes.as_ref().map(|n| n.as_str().to_string());
            let detail = move |old: &Value| {
                let fields = old.as_object()?;
                let from = current_stage(fields)?;
                let to = from.next()?;
                patch_object(old, |fields| {
                    let change = entry(vec![
                        ("id", Some(json!(temp_id))),
                        ("fromStage", Some(json!(from.as_str()))),
                        ("toStage", Some(json!(to.as_str()))),
                        ("notes", notes.map(|n| json!(n))),
                        ("timestamp", Some(json!(timestamp))),
                    ]);
                    fields.insert("stage".to_string(), json!(to.as_str()));
                    prepend(fields, profile.status_changes_field, change);
                })
            };

            CachePatch::new()
                .detail(key, detail)
                .sweep(list_pattern(kind), id, |row| {
                    let mut row = row.clone();
                    if let Some(next) = current_stage(&row).and_then(CaseStage::next) {
                        row.insert("stage".to_string(), json!(next.as_str()));
                    }
                    row
                })
        }

        EntityMutation::SetStage { stage, notes } => {
            let to = *stage;
            let notes = notes.as_ref().map(|n| n.as_str().to_string());
            let detail = move |old: &Value| {
                let from = old.get("stage").cloned();
                if from.as_ref().and_then(Value::as_str) == Some(to.as_str()) {
                    return None;
                }
                patch_object(old, |fields| {
                    let change = entry(vec![
                        ("id", Some(json!(temp_id))),
                        ("fromStage", from),
                        ("toStage", Some(json!(to.as_str()))),
                        ("notes", notes.map(|n| json!(n))),
                        ("timestamp", Some(json!(timestamp))),
                    ]);
                    fields.insert("stage".to_string(), json!(to.as_str()));
                    prepend(fields, profile.status_changes_field, change);
                })
            };

            CachePatch::new()
                .detail(key, detail)
                .sweep(list_pattern(kind), id, move |row| {
                    let mut row = row.clone();
                    row.insert("stage".to_string(), json!(to.as_str()));
                    row
                })
        }

        EntityMutation::ConvertLead { notes } => {
            let converted = LeadStatus::Converted.as_str();
            let change = entry(vec![
                ("id", Some(json!(temp_id))),
                ("type", Some(json!("converted_to_client"))),
                ("notes", notes.as_ref().map(|n| json!(n.as_str()))),
                ("timestamp", Some(json!(timestamp))),
            ]);
            let row_change = change.clone();

            CachePatch::new()
                .detail(key, move |old| {
                    patch_object(old, |fields| {
                        fields.insert("status".to_string(), json!(converted));
                        prepend(fields, profile.status_changes_field, change);
                    })
                })
                .sweep(list_pattern(kind), id, move |row| {
                    let mut row = row.clone();
                    row.insert("status".to_string(), json!(converted));
                    prepend(&mut row, profile.status_changes_field, row_change.clone());
                    row
                })
        }

        EntityMutation::UpdateFields { fields: updates } => {
            let row_updates = updates.clone();
            let updates = updates.clone();
            CachePatch::new()
                .detail(key, move |old| {
                    patch_object(old, |fields| fields.extend(updates))
                })
                .sweep(list_pattern(kind), id, move |row| {
                    let mut row = row.clone();
                    row.extend(row_updates.clone());
                    row
                })
        }
    }
}
