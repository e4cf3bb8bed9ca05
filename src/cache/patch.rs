//! Logical cache patches.
//!
//! A [`CachePatch`] bundles the detail update and the list sweep produced by
//! one mutation so the store can apply both under a single lock.

use serde_json::{Map, Value};

use crate::cache::keys::{KeyPattern, QueryKey};
use crate::domain::types::EntityId;

/// Computes the new detail value; `None` leaves the entry untouched.
pub type DetailUpdate = Box<dyn FnOnce(&Value) -> Option<Value> + Send>;

/// Computes the new version of a list row matching the patched entity.
pub type RowUpdate = Box<dyn Fn(&Map<String, Value>) -> Map<String, Value> + Send>;

pub struct DetailPatch {
    pub key: QueryKey,
    pub update: DetailUpdate,
}

pub struct ListSweep {
    pub pattern: KeyPattern,
    pub row_id: EntityId,
    pub update: RowUpdate,
}

impl ListSweep {
    /// Patches the rows of a cached list value.
    ///
    /// Handles bare arrays and paginated `{ results: [...] }` envelopes.
    /// Returns `None` for non-list data or when no row carries `row_id`.
    pub fn sweep(&self, data: &Value) -> Option<Value> {
        match data {
            Value::Array(rows) => self.sweep_rows(rows).map(Value::Array),
            Value::Object(envelope) => {
                let Some(Value::Array(rows)) = envelope.get("results") else {
                    return None;
                };
                let rows = self.sweep_rows(rows)?;
                let mut envelope = envelope.clone();
                envelope.insert("results".to_string(), Value::Array(rows));
                Some(Value::Object(envelope))
            }
            _ => None,
        }
    }

    fn sweep_rows(&self, rows: &[Value]) -> Option<Vec<Value>> {
        let mut touched = false;
        let patched = rows
            .iter()
            .map(|row| match row {
                Value::Object(fields) if row_matches(fields, self.row_id) => {
                    touched = true;
                    Value::Object((self.update)(fields))
                }
                other => other.clone(),
            })
            .collect();
        touched.then_some(patched)
    }
}

fn row_matches(fields: &Map<String, Value>, id: EntityId) -> bool {
    fields.get("id").and_then(Value::as_i64) == Some(id.get())
}

/// One logical cache change: an optional detail update plus an optional
/// sweep over every list matching a pattern.
#[derive(Default)]
pub struct CachePatch {
    pub detail: Option<DetailPatch>,
    pub list_sweep: Option<ListSweep>,
}

impl CachePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detail<F>(mut self, key: QueryKey, update: F) -> Self
    where
        F: FnOnce(&Value) -> Option<Value> + Send + 'static,
    {
        self.detail = Some(DetailPatch {
            key,
            update: Box::new(update),
        });
        self
    }

    pub fn sweep<F>(mut self, pattern: KeyPattern, row_id: EntityId, update: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Map<String, Value> + Send + 'static,
    {
        self.list_sweep = Some(ListSweep {
            pattern,
            row_id,
            update: Box::new(update),
        });
        self
    }
}
