//! Read path: detail and list queries served through the cache.
//!
//! Fresh cached values are returned as is. Stale or missing entries are
//! fetched, retried `retry` times on failure, and written back unless the
//! fetch was cancelled in the meantime by a mutation or an invalidation.

use std::future::Future;

use serde_json::Value;

use crate::backend::{BackendResult, EntityReader};
use crate::cache::QueryCache;
use crate::cache::keys::{QueryKey, detail_key, list_key};
use crate::domain::actions::{ActionContext, ActionSet, available_actions};
use crate::domain::entity::EntityKind;
use crate::domain::types::EntityId;
use crate::pagination::ListQuery;
use crate::services::{ServiceError, ServiceResult};

async fn fetch_through_cache<F, Fut>(
    cache: &QueryCache,
    key: QueryKey,
    retry: u32,
    fetch: F,
) -> ServiceResult<Value>
where
    F: Fn() -> Fut,
    Fut: Future<Output = BackendResult<Value>>,
{
    if !cache.is_stale(&key) {
        if let Some(data) = cache.get_query_data(&key) {
            return Ok(data);
        }
    }

    let ticket = cache.begin_fetch(&key);
    let mut attempt = 0;
    let data = loop {
        match fetch().await {
            Ok(data) => break data,
            Err(err) if attempt < retry => {
                attempt += 1;
                log::warn!("Fetching {key} failed, retrying ({attempt}/{retry}): {err}");
            }
            Err(err) => {
                cache.fail_fetch(&ticket);
                log::error!("Fetching {key} failed: {err}");
                return Err(ServiceError::from(err));
            }
        }
    };

    if cache.complete_fetch(&ticket, data.clone()) {
        Ok(data)
    } else {
        Ok(cache.get_query_data(&key).unwrap_or(data))
    }
}

/// Returns the detail projection of an entity.
pub async fn fetch_detail<R>(
    cache: &QueryCache,
    backend: &R,
    retry: u32,
    kind: EntityKind,
    entity_id: i64,
) -> ServiceResult<Value>
where
    R: EntityReader,
{
    let entity_id = EntityId::new(entity_id)?;
    fetch_through_cache(cache, detail_key(kind, entity_id), retry, move || {
        backend.fetch_detail(kind, entity_id)
    })
    .await
}

/// Returns one list result set: a bare array or a paginated envelope.
pub async fn fetch_list<R>(
    cache: &QueryCache,
    backend: &R,
    retry: u32,
    kind: EntityKind,
    query: &ListQuery,
) -> ServiceResult<Value>
where
    R: EntityReader,
{
    fetch_through_cache(cache, list_key(kind, query.params()), retry, move || {
        backend.fetch_list(kind, query)
    })
    .await
}

/// Actions for an entity as shown in its detail panel header.
pub fn detail_actions(
    cache: &QueryCache,
    kind: EntityKind,
    entity_id: i64,
    view_only: bool,
) -> ServiceResult<ActionSet> {
    let entity_id = EntityId::new(entity_id)?;
    let record = cache
        .get_query_data(&detail_key(kind, entity_id))
        .ok_or(ServiceError::NotFound)?;
    row_actions(kind, &record, view_only)
}

/// Actions for a list row or any other cached projection.
pub fn row_actions(kind: EntityKind, record: &Value, view_only: bool) -> ServiceResult<ActionSet> {
    let ctx = ActionContext::from_record(kind, record, view_only)?;
    Ok(available_actions(&ctx))
}
