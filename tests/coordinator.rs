use brokerage_console::backend::BackendError;
use brokerage_console::cache::QueryCache;
use brokerage_console::cache::keys::{detail_key, list_key};
use brokerage_console::coordinator::{
    EntityMutation, MutationCoordinator, MutationError, MutationPhase, MutationRequest,
    MutationResponse,
};
use brokerage_console::domain::entity::{CallOutcome, EntityKind};
use brokerage_console::domain::lifecycle::LifecycleError;
use brokerage_console::domain::types::NoteContent;
use brokerage_console::forms::activity::{AddNoteForm, LogCallForm};
use brokerage_console::forms::lifecycle::{StageForm, TransitionNotesForm, UpdateStatusForm};
use brokerage_console::pagination::ListQuery;
use brokerage_console::services::queries::{detail_actions, fetch_detail, fetch_list, row_actions};
use brokerage_console::services::{ServiceError, activity, lifecycle};
use serde_json::{Map, Value, json};

use common::{ScriptedBackend, id, init_logging};

mod common;

fn case_seven() -> Value {
    json!({
        "id": 7,
        "caseId": "RV-00007",
        "stage": "submitted",
        "clientId": 42,
        "bankName": "Emirates NBD",
        "stageChanges": [],
        "notes": [],
        "callLogs": [],
    })
}

fn row<'a>(list: &'a Value, entity_id: i64) -> &'a Value {
    list.as_array()
        .or_else(|| list["results"].as_array())
        .and_then(|rows| rows.iter().find(|row| row["id"] == entity_id))
        .expect("row present")
}

#[tokio::test]
async fn call_log_is_visible_before_backend_replies() {
    init_logging();
    let backend = ScriptedBackend::new().with_record(
        EntityKind::Client,
        json!({"id": 42, "status": "active", "callLogs": []}),
    );
    let cache = QueryCache::new();
    let coordinator = MutationCoordinator::new(cache.clone());
    let key = detail_key(EntityKind::Client, id(42));
    fetch_detail(&cache, &backend, 1, EntityKind::Client, 42)
        .await
        .expect("detail loaded");

    let gate = backend.gate_writes();
    let observe = async {
        gate.entered.notified().await;
        let in_flight = cache.get_query_data(&key).expect("detail cached");
        gate.release.notify_one();
        in_flight
    };
    let (result, in_flight) = tokio::join!(
        activity::log_call(
            &coordinator,
            &backend,
            EntityKind::Client,
            42,
            LogCallForm {
                outcome: CallOutcome::NoAnswer,
                notes: Some("left voicemail".to_string()),
            },
        ),
        observe
    );

    let logs = in_flight["callLogs"].as_array().expect("call logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["outcome"], "noAnswer");
    assert_eq!(logs[0]["notes"], "left voicemail");
    let temp_id = logs[0]["id"].as_i64().expect("temp id");

    let call = result.expect("call logged");
    assert_ne!(call.id.get(), temp_id);
    assert!(cache.is_stale(&key));

    let refreshed = fetch_detail(&cache, &backend, 1, EntityKind::Client, 42)
        .await
        .expect("refetched");
    assert_eq!(refreshed["callLogs"][0]["id"], call.id.get());
}

#[tokio::test]
async fn failed_note_restores_exact_pre_mutation_state() {
    init_logging();
    let lead = json!({
        "id": 3,
        "status": "new",
        "notes": [{"id": 1, "content": "first contact", "timestamp": "2024-05-01T09:00:00Z"}],
    });
    let backend = ScriptedBackend::new().with_record(EntityKind::Lead, lead.clone());
    backend.fail_writes(BackendError::Rejected("lead is locked".into()));
    let cache = QueryCache::new();
    let coordinator = MutationCoordinator::new(cache.clone());

    let detail = fetch_detail(&cache, &backend, 1, EntityKind::Lead, 3)
        .await
        .expect("detail loaded");
    let list = fetch_list(&cache, &backend, 1, EntityKind::Lead, &ListQuery::new())
        .await
        .expect("list loaded");
    let list_key = list_key(EntityKind::Lead, ListQuery::new().params());

    let result = activity::add_note(
        &coordinator,
        &backend,
        EntityKind::Lead,
        3,
        AddNoteForm {
            content: "asked for salary certificate".to_string(),
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(ServiceError::Mutation(MutationError::Backend(BackendError::Rejected(_))))
    ));
    assert_eq!(
        cache.get_query_data(&detail_key(EntityKind::Lead, id(3))),
        Some(detail)
    );
    assert_eq!(cache.get_query_data(&list_key), Some(list));
    assert_eq!(backend.record(EntityKind::Lead, 3), Some(lead));
}

#[tokio::test]
async fn withdrawal_keeps_list_and_detail_in_agreement() {
    init_logging();
    let backend = ScriptedBackend::new()
        .with_record(EntityKind::Case, case_seven())
        .with_record(
            EntityKind::Case,
            json!({"id": 8, "stage": "valuation", "clientId": 43}),
        );
    let cache = QueryCache::new();
    let coordinator = MutationCoordinator::new(cache.clone());
    let query = ListQuery::new();
    let list_key = list_key(EntityKind::Case, query.params());
    let detail_key = detail_key(EntityKind::Case, id(7));
    fetch_detail(&cache, &backend, 1, EntityKind::Case, 7)
        .await
        .expect("detail loaded");
    fetch_list(&cache, &backend, 1, EntityKind::Case, &query)
        .await
        .expect("list loaded");

    let gate = backend.gate_writes();
    let observe = async {
        gate.entered.notified().await;
        let detail = cache.get_query_data(&detail_key).expect("detail cached");
        let list = cache.get_query_data(&list_key).expect("list cached");
        gate.release.notify_one();
        (detail, list)
    };
    let (result, (detail, list)) = tokio::join!(
        lifecycle::update_status(
            &coordinator,
            &backend,
            EntityKind::Case,
            7,
            UpdateStatusForm {
                status: "withdrawn".to_string(),
                reason: Some("client moved abroad".to_string()),
                notes: None,
            },
        ),
        observe
    );

    assert_eq!(detail["stage"], "withdrawn");
    assert_eq!(detail["stageReason"], "client moved abroad");
    let change = &detail["stageChanges"][0];
    assert_eq!(change["fromStage"], "submitted");
    assert_eq!(change["toStage"], "withdrawn");
    assert_eq!(change["reason"], "client moved abroad");
    assert_eq!(row(&list, 7)["stage"], "withdrawn");
    assert_eq!(row(&list, 8)["stage"], "valuation");
    assert_eq!(
        row_actions(EntityKind::Case, row(&list, 7), false).expect("row actions"),
        row_actions(EntityKind::Case, &detail, false).expect("detail actions"),
    );

    result.expect("withdrawn");
    assert!(cache.is_stale(&detail_key));
    assert!(cache.is_stale(&list_key));

    let detail = fetch_detail(&cache, &backend, 1, EntityKind::Case, 7)
        .await
        .expect("refetched detail");
    let list = fetch_list(&cache, &backend, 1, EntityKind::Case, &query)
        .await
        .expect("refetched list");
    assert_eq!(detail["stage"], row(&list, 7)["stage"]);
    assert_eq!(
        detail_actions(&cache, EntityKind::Case, 7, false).expect("detail actions"),
        row_actions(EntityKind::Case, row(&list, 7), false).expect("row actions"),
    );
}

/// Backend and cache holding case 7 (`submitted`) and case 8 (`valuation`)
/// in both the detail and the default list.
async fn loaded_cases() -> (ScriptedBackend, QueryCache) {
    let backend = ScriptedBackend::new()
        .with_record(EntityKind::Case, case_seven())
        .with_record(
            EntityKind::Case,
            json!({"id": 8, "stage": "valuation", "clientId": 43}),
        );
    let cache = QueryCache::new();
    fetch_detail(&cache, &backend, 1, EntityKind::Case, 7)
        .await
        .expect("detail loaded");
    fetch_list(&cache, &backend, 1, EntityKind::Case, &ListQuery::new())
        .await
        .expect("list loaded");
    (backend, cache)
}

#[tokio::test]
async fn advance_stage_moves_detail_and_row_to_next_stage() {
    init_logging();
    let (backend, cache) = loaded_cases().await;
    let coordinator = MutationCoordinator::new(cache.clone());
    let detail_key = detail_key(EntityKind::Case, id(7));
    let list_key = list_key(EntityKind::Case, ListQuery::new().params());

    let gate = backend.gate_writes();
    let observe = async {
        gate.entered.notified().await;
        let detail = cache.get_query_data(&detail_key).expect("detail cached");
        let list = cache.get_query_data(&list_key).expect("list cached");
        gate.release.notify_one();
        (detail, list)
    };
    let (result, (detail, list)) = tokio::join!(
        lifecycle::advance_stage(
            &coordinator,
            &backend,
            7,
            TransitionNotesForm {
                notes: Some("all documents received".to_string()),
            },
        ),
        observe
    );

    assert_eq!(detail["stage"], "underReview");
    let change = &detail["stageChanges"][0];
    assert_eq!(change["fromStage"], "submitted");
    assert_eq!(change["toStage"], "underReview");
    assert_eq!(change["notes"], "all documents received");
    assert_eq!(row(&list, 7)["stage"], "underReview");
    assert_eq!(row(&list, 8)["stage"], "valuation");

    result.expect("advanced");
    assert!(backend.calls().contains(&"advance_stage 7".to_string()));
    let detail = fetch_detail(&cache, &backend, 1, EntityKind::Case, 7)
        .await
        .expect("refetched detail");
    let list = fetch_list(&cache, &backend, 1, EntityKind::Case, &ListQuery::new())
        .await
        .expect("refetched list");
    assert_eq!(detail["stage"], "underReview");
    assert_eq!(row(&list, 7)["stage"], "underReview");
}

#[tokio::test]
async fn failed_advance_restores_detail_and_list() {
    init_logging();
    let (backend, cache) = loaded_cases().await;
    backend.fail_writes(BackendError::Rejected("missing valuation report".into()));
    let coordinator = MutationCoordinator::new(cache.clone());
    let detail_key = detail_key(EntityKind::Case, id(7));
    let list_key = list_key(EntityKind::Case, ListQuery::new().params());
    let detail = cache.get_query_data(&detail_key);
    let list = cache.get_query_data(&list_key);

    let result =
        lifecycle::advance_stage(&coordinator, &backend, 7, TransitionNotesForm::default()).await;

    assert!(matches!(
        result,
        Err(ServiceError::Mutation(MutationError::Backend(BackendError::Rejected(_))))
    ));
    assert_eq!(cache.get_query_data(&detail_key), detail);
    assert_eq!(cache.get_query_data(&list_key), list);
    assert_eq!(
        backend.record(EntityKind::Case, 7).expect("case")["stage"],
        "submitted"
    );
}

#[tokio::test]
async fn dropped_stage_is_shown_before_backend_replies() {
    init_logging();
    let (backend, cache) = loaded_cases().await;
    let coordinator = MutationCoordinator::new(cache.clone());
    let detail_key = detail_key(EntityKind::Case, id(7));
    let list_key = list_key(EntityKind::Case, ListQuery::new().params());

    let gate = backend.gate_writes();
    let observe = async {
        gate.entered.notified().await;
        let detail = cache.get_query_data(&detail_key).expect("detail cached");
        let list = cache.get_query_data(&list_key).expect("list cached");
        gate.release.notify_one();
        (detail, list)
    };
    let (result, (detail, list)) = tokio::join!(
        lifecycle::set_stage(
            &coordinator,
            &backend,
            7,
            StageForm {
                stage: "folReceived".to_string(),
                notes: None,
            },
        ),
        observe
    );

    assert_eq!(detail["stage"], "folReceived");
    assert_eq!(detail["stageChanges"][0]["fromStage"], "submitted");
    assert_eq!(detail["stageChanges"][0]["toStage"], "folReceived");
    assert_eq!(row(&list, 7)["stage"], "folReceived");
    assert_eq!(row(&list, 8)["stage"], "valuation");

    let entity = result.expect("stage set");
    assert_eq!(entity["stage"], "folReceived");
    assert!(cache.is_stale(&list_key));
}

#[tokio::test]
async fn failed_stage_drop_restores_detail_and_list() {
    init_logging();
    let (backend, cache) = loaded_cases().await;
    backend.fail_writes(BackendError::Transport("connection reset".into()));
    let coordinator = MutationCoordinator::new(cache.clone());
    let detail_key = detail_key(EntityKind::Case, id(7));
    let list_key = list_key(EntityKind::Case, ListQuery::new().params());
    let detail = cache.get_query_data(&detail_key);
    let list = cache.get_query_data(&list_key);

    let result = lifecycle::set_stage(
        &coordinator,
        &backend,
        7,
        StageForm {
            stage: "preApproved".to_string(),
            notes: Some("bank pre-approval letter".to_string()),
        },
    )
    .await;

    assert!(matches!(result, Err(ServiceError::Mutation(_))));
    assert_eq!(cache.get_query_data(&detail_key), detail);
    assert_eq!(cache.get_query_data(&list_key), list);
}

#[tokio::test]
async fn non_terminal_targets_are_rejected_locally() {
    init_logging();
    let backend = ScriptedBackend::new()
        .with_record(EntityKind::Lead, json!({"id": 3, "status": "new"}))
        .with_record(EntityKind::Case, case_seven());
    let cache = QueryCache::new();
    let coordinator = MutationCoordinator::new(cache.clone());
    fetch_detail(&cache, &backend, 1, EntityKind::Lead, 3)
        .await
        .expect("lead loaded");
    let version = cache.version(&detail_key(EntityKind::Lead, id(3)));

    for (kind, entity_id, target) in [
        (EntityKind::Lead, 3, "converted"),
        (EntityKind::Case, 7, "disbursed"),
        (EntityKind::Client, 42, "active"),
    ] {
        let err = coordinator
            .execute(
                &backend,
                MutationRequest::new(
                    kind,
                    id(entity_id),
                    EntityMutation::UpdateStatus {
                        status: target.to_string(),
                        reason: None,
                        notes: None,
                    },
                ),
            )
            .await
            .expect_err("not a terminal target");
        assert!(matches!(
            err,
            MutationError::InvalidTransition(LifecycleError::NotTerminal { .. })
        ));
        assert_eq!(err.phase(), MutationPhase::Rejected);
    }

    assert_eq!(cache.version(&detail_key(EntityKind::Lead, id(3))), version);
    assert!(!backend.calls().iter().any(|call| call.starts_with("update_status")));

    lifecycle::update_status(
        &coordinator,
        &backend,
        EntityKind::Lead,
        3,
        UpdateStatusForm {
            status: "dropped".to_string(),
            reason: Some("not interested".to_string()),
            notes: None,
        },
    )
    .await
    .expect("dropped");
    assert!(backend.calls().contains(&"update_status lead 3 dropped".to_string()));
    assert_eq!(
        backend
            .record(EntityKind::Lead, 3)
            .expect("lead")["status"],
        "dropped"
    );
}

#[tokio::test]
async fn unknown_status_is_rejected_before_any_write() {
    let cache = QueryCache::new();
    let coordinator = MutationCoordinator::new(cache.clone());

    let err = coordinator
        .prepare(MutationRequest::new(
            EntityKind::Client,
            id(42),
            EntityMutation::UpdateStatus {
                status: "archived".to_string(),
                reason: None,
                notes: None,
            },
        ))
        .expect_err("unknown status");

    assert!(matches!(
        err,
        MutationError::InvalidTransition(LifecycleError::UnknownStatus { .. })
    ));
}

fn bank_update(bank: &str) -> EntityMutation {
    let mut fields = Map::new();
    fields.insert("bankName".to_string(), json!(bank));
    EntityMutation::UpdateFields { fields }
}

fn offline() -> Result<MutationResponse, BackendError> {
    Err(BackendError::Transport("connection reset".into()))
}

#[test]
fn stacked_failed_writes_restore_server_state() {
    init_logging();
    let cache = QueryCache::new();
    let key = detail_key(EntityKind::Case, id(7));
    cache.set_query_data(&key, case_seven());
    let coordinator = MutationCoordinator::new(cache.clone());

    let first = coordinator
        .prepare(MutationRequest::new(EntityKind::Case, id(7), bank_update("Mashreq")))
        .expect("first prepared");
    let second = coordinator
        .prepare(MutationRequest::new(EntityKind::Case, id(7), bank_update("ADCB")))
        .expect("second prepared");
    assert_eq!(first.phase(), MutationPhase::OptimisticallyApplied);

    let settled = coordinator.settle(first, offline());
    assert_eq!(settled.phase(), MutationPhase::RolledBack);
    assert_eq!(
        cache.get_query_data(&key).expect("cached")["bankName"],
        "ADCB"
    );

    let err = coordinator
        .settle(second, offline())
        .into_result()
        .expect_err("second fails");
    assert!(matches!(err, MutationError::Backend(_)));
    assert_eq!(cache.get_query_data(&key), Some(case_seven()));
}

#[test]
fn failed_status_under_failed_note_leaves_no_trace() {
    init_logging();
    let cache = QueryCache::new();
    let detail = detail_key(EntityKind::Case, id(7));
    let list = list_key(EntityKind::Case, ListQuery::new().params());
    let rows = json!([{"id": 7, "stage": "submitted", "clientId": 42}]);
    cache.set_query_data(&detail, case_seven());
    cache.set_query_data(&list, rows.clone());
    let coordinator = MutationCoordinator::new(cache.clone());

    let withdraw = coordinator
        .prepare(MutationRequest::new(
            EntityKind::Case,
            id(7),
            EntityMutation::UpdateStatus {
                status: "withdrawn".to_string(),
                reason: None,
                notes: None,
            },
        ))
        .expect("withdraw prepared");
    let note = coordinator
        .prepare(MutationRequest::new(
            EntityKind::Case,
            id(7),
            EntityMutation::AddNote {
                content: NoteContent::new("bank asked for payslips").expect("content"),
            },
        ))
        .expect("note prepared");

    coordinator.settle(withdraw, offline());
    coordinator.settle(note, offline());

    let restored = cache.get_query_data(&detail).expect("detail cached");
    assert_eq!(restored["stage"], "submitted");
    assert_eq!(restored["stageChanges"], json!([]));
    assert_eq!(restored, case_seven());
    assert_eq!(cache.get_query_data(&list), Some(rows));
}

#[test]
fn rollback_keeps_a_later_committed_write() {
    init_logging();
    let cache = QueryCache::new();
    let key = detail_key(EntityKind::Case, id(7));
    cache.set_query_data(&key, case_seven());
    let coordinator = MutationCoordinator::new(cache.clone());

    let first = coordinator
        .prepare(MutationRequest::new(EntityKind::Case, id(7), bank_update("Mashreq")))
        .expect("first prepared");
    let second = coordinator
        .prepare(MutationRequest::new(EntityKind::Case, id(7), bank_update("ADCB")))
        .expect("second prepared");

    let committed = coordinator.settle(
        second,
        Ok(MutationResponse::Entity(json!({"id": 7, "bankName": "ADCB"}))),
    );
    assert_eq!(committed.phase(), MutationPhase::Committed);
    coordinator.settle(first, offline());

    assert_eq!(
        cache.get_query_data(&key).expect("cached")["bankName"],
        "ADCB"
    );
    assert!(cache.is_stale(&key));
}

#[test]
fn paginated_client_lists_are_swept() {
    init_logging();
    let cache = QueryCache::new();
    let coordinator = MutationCoordinator::new(cache.clone());
    let page_one = list_key(
        EntityKind::Client,
        ListQuery::new().paginate(1, 25).params(),
    );
    let searched = list_key(
        EntityKind::Client,
        ListQuery::new().search("noor").params(),
    );
    cache.set_query_data(
        &page_one,
        json!({
            "count": 2,
            "next": null,
            "previous": null,
            "results": [
                {"id": 41, "status": "active"},
                {"id": 42, "status": "active"},
            ],
        }),
    );
    cache.set_query_data(&searched, json!([{"id": 42, "status": "active"}]));

    let pending = coordinator
        .prepare(MutationRequest::new(
            EntityKind::Client,
            id(42),
            EntityMutation::UpdateStatus {
                status: "notEligible".to_string(),
                reason: None,
                notes: None,
            },
        ))
        .expect("prepared");

    let paged = cache.get_query_data(&page_one).expect("page cached");
    assert_eq!(paged["count"], 2);
    assert_eq!(row(&paged, 41)["status"], "active");
    assert_eq!(row(&paged, 42)["status"], "notEligible");
    let found = cache.get_query_data(&searched).expect("search cached");
    assert_eq!(row(&found, 42)["status"], "notEligible");

    let response = coordinator
        .settle(
            pending,
            Ok(MutationResponse::Entity(
                json!({"id": 42, "status": "notEligible"}),
            )),
        )
        .into_result()
        .expect("committed");
    assert!(matches!(response, MutationResponse::Entity(_)));
    assert!(cache.is_stale(&page_one));
    assert!(cache.is_stale(&searched));
}

#[tokio::test]
async fn note_content_reaches_backend_trimmed() {
    let backend = ScriptedBackend::new().with_record(
        EntityKind::Case,
        case_seven(),
    );
    let coordinator = MutationCoordinator::new(QueryCache::new());

    let response = coordinator
        .execute(
            &backend,
            MutationRequest::new(
                EntityKind::Case,
                id(7),
                EntityMutation::AddNote {
                    content: NoteContent::new("  valuation booked  ").expect("content"),
                },
            ),
        )
        .await
        .expect("note added");

    let MutationResponse::Note(note) = response else {
        panic!("expected a note");
    };
    assert_eq!(note.content, "valuation booked");
    assert_eq!(
        backend.record(EntityKind::Case, 7).expect("case")["notes"][0]["content"],
        "valuation booked"
    );
}
