//! REST adapter for the brokerage backend.
//!
//! Uses reqwest with `Token` authorization. Every path is relative to the
//! configured API base URL, e.g. `{base}/clients/42/log_call/`.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::backend::{BackendError, BackendResult, EntityReader, EntityWriter, StatusUpdate};
use crate::domain::entity::{CallLog, CallOutcome, EntityKind, LeadConversion, Note};
use crate::domain::lifecycle::{CaseStage, ClientStatus, EntityStatus, LeadStatus};
use crate::domain::types::{EntityId, NoteContent};
use crate::models::config::ConsoleConfig;
use crate::pagination::ListQuery;

/// Endpoint and body of a terminal status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRoute {
    pub action: &'static str,
    pub body: Value,
}

/// Builds a JSON object leaving out absent values.
fn body(pairs: &[(&str, Option<&str>)]) -> Value {
    let fields: Map<String, Value> = pairs
        .iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), json!(v))))
        .collect();
    Value::Object(fields)
}

/// Resolves the backend action for a terminal transition.
///
/// Lead and client endpoints take free text as `notes` only, so a reason
/// given without notes is sent in its place.
pub fn status_route(update: &StatusUpdate) -> BackendResult<StatusRoute> {
    let notes = update.notes.as_deref();
    let notes_or_reason = notes.or(update.reason.as_deref());
    let reason = update.reason.as_deref();

    let (action, body) = match update.status {
        EntityStatus::Lead(LeadStatus::Dropped) => ("drop", body(&[("notes", notes_or_reason)])),
        EntityStatus::Client(ClientStatus::NotEligible) => (
            "mark_not_eligible",
            body(&[("notes", notes_or_reason)]),
        ),
        EntityStatus::Client(ClientStatus::NotProceeding) => (
            "mark_not_proceeding",
            body(&[("notes", notes_or_reason)]),
        ),
        EntityStatus::Case(CaseStage::Declined) => {
            ("decline", body(&[("reason", reason), ("notes", notes)]))
        }
        EntityStatus::Case(CaseStage::Withdrawn) => {
            ("withdraw", body(&[("reason", reason), ("notes", notes)]))
        }
        other => {
            return Err(BackendError::Unexpected(format!(
                "unsupported status update '{other}' for {}",
                other.kind()
            )));
        }
    };
    Ok(StatusRoute { action, body })
}

/// Path of an entity or one of its actions.
pub fn entity_path(kind: EntityKind, id: EntityId, action: Option<&str>) -> String {
    let resource = kind.profile().resource;
    match action {
        Some(action) => format!("{resource}/{id}/{action}/"),
        None => format!("{resource}/{id}/"),
    }
}

#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &ConsoleConfig) -> BackendResult<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;
        Ok(Self::new(
            client,
            config.api_base_url.clone(),
            config.auth_token.clone(),
        ))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> BackendResult<T> {
        let request = match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Token {token}")),
            None => request,
        };

        let response = request.send().await.map_err(|err| {
            log::error!("Backend request failed: {err}");
            BackendError::from(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::warn!("Backend returned {status}: {text}");
            return Err(BackendError::from_status(status.as_u16(), text));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| {
            log::error!("Failed to decode backend response: {err}");
            BackendError::from(err)
        })
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> BackendResult<T> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }
}

impl EntityReader for HttpBackend {
    async fn fetch_detail(&self, kind: EntityKind, id: EntityId) -> BackendResult<Value> {
        self.send(self.client.get(self.url(&entity_path(kind, id, None))))
            .await
    }

    async fn fetch_list(&self, kind: EntityKind, query: &ListQuery) -> BackendResult<Value> {
        let path = format!("{}/", kind.profile().resource);
        self.send(self.client.get(self.url(&path)).query(&query.params()))
            .await
    }
}

impl EntityWriter for HttpBackend {
    async fn add_note(
        &self,
        kind: EntityKind,
        id: EntityId,
        content: &NoteContent,
    ) -> BackendResult<Note> {
        let body = body(&[("content", Some(content.as_str()))]);
        self.post(&entity_path(kind, id, Some("add_note")), &body)
            .await
    }

    async fn log_call(
        &self,
        kind: EntityKind,
        id: EntityId,
        outcome: CallOutcome,
        notes: Option<String>,
    ) -> BackendResult<CallLog> {
        let body = body(&[("outcome", Some(outcome.as_str())), ("notes", notes.as_deref())]);
        self.post(&entity_path(kind, id, Some("log_call")), &body)
            .await
    }

    async fn update_status(
        &self,
        kind: EntityKind,
        id: EntityId,
        update: &StatusUpdate,
    ) -> BackendResult<Value> {
        let route = status_route(update)?;
        self.post(&entity_path(kind, id, Some(route.action)), &route.body)
            .await
    }

    async fn advance_stage(&self, id: EntityId, notes: Option<String>) -> BackendResult<Value> {
        let body = body(&[("notes", notes.as_deref())]);
        self.post(&entity_path(EntityKind::Case, id, Some("advance_stage")), &body)
            .await
    }

    async fn set_stage(
        &self,
        id: EntityId,
        stage: CaseStage,
        notes: Option<String>,
    ) -> BackendResult<Value> {
        let body = body(&[("stage", Some(stage.as_str())), ("notes", notes.as_deref())]);
        self.post(&entity_path(EntityKind::Case, id, Some("set_stage")), &body)
            .await
    }

    async fn convert_lead(
        &self,
        id: EntityId,
        notes: Option<String>,
    ) -> BackendResult<LeadConversion> {
        let body = body(&[("notes", notes.as_deref())]);
        self.post(&entity_path(EntityKind::Lead, id, Some("convert")), &body)
            .await
    }

    async fn update_fields(
        &self,
        kind: EntityKind,
        id: EntityId,
        fields: &Map<String, Value>,
    ) -> BackendResult<Value> {
        let request = self
            .client
            .patch(self.url(&entity_path(kind, id, None)))
            .json(fields);
        self.send(request).await
    }
}
