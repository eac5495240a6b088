//! End-to-end scenarios for kidsbus-core
//!
//! These tests drive `Console` over the in-memory gateway the way the admin
//! UI does, and check both the cache and the stored documents afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kidsbus_core::api::Operation;
use kidsbus_core::location::StoreDocumentProvider;
use kidsbus_core::models::{
    Bus, Collection, Coordinates, Location, LocationSource, Parent, ParentChange, ParentSelection, Student,
    StudentChanges, StudentDraft,
};
use kidsbus_core::{
    ApiError, Console, ConsoleSettings, Error, LocationChain, LocationProvider, MemoryGateway, RemoteStore,
};
use serde_json::{json, Value};

fn parent(id: &str, name: &str, children: Vec<Value>) -> Value {
    json!({
        "id": id,
        "name": name,
        "email": format!("{}@example.com", id.to_lowercase()),
        "phone": "0501234567",
        "children": children
    })
}

fn student(id: &str, name: &str, parent_id: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "grade": "G2",
        "schoolName": "X",
        "busRoute": "Route1",
        "parentId": parent_id,
        "parentName": "Huda",
        "parentPhone": "0501234567",
        "qrCode": format!("STUDENT_{}", id),
        "currentStatus": "home"
    })
}

fn summary(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "grade": "G2",
        "schoolName": "X",
        "busRoute": "Route1",
        "qrCode": format!("STUDENT_{}", id),
        "currentStatus": "home"
    })
}

fn ali() -> StudentDraft {
    StudentDraft {
        name: "Ali".to_string(),
        grade: "G3".to_string(),
        school_name: "X".to_string(),
        bus_route: "Route1".to_string(),
        parent: ParentSelection::Existing("P1".to_string()),
        ..Default::default()
    }
}

async fn console_over(gateway: Arc<MemoryGateway>, chain: LocationChain) -> Console {
    let mut console = Console::new(RemoteStore::new(gateway), ConsoleSettings::default(), chain);
    console.init().await.unwrap();
    console
}

async fn console(gateway: Arc<MemoryGateway>) -> Console {
    console_over(gateway, LocationChain::new()).await
}

/// Fails every lookup, like an unreachable location service.
struct BrokenService {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LocationProvider for BrokenService {
    fn name(&self) -> &str {
        "primary"
    }

    async fn locate(&self, _bus_id: &str) -> Result<Option<Location>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ApiError::ServerError("location service down".to_string()))
    }
}

// ============================================================================
// Parent / child summaries
// ============================================================================

#[tokio::test]
async fn create_student_appears_in_parent_children() {
    let gateway = Arc::new(MemoryGateway::new().with_documents(Collection::Parents, vec![parent("P1", "Huda", vec![])]));
    let mut console = console(gateway.clone()).await;

    let created = console.create_student(ali()).await.unwrap().value;

    let p1 = console.cache().require::<Parent>("P1").unwrap();
    assert_eq!(p1.children.len(), 1);
    assert_eq!(p1.children[0].id, created.id);
    assert_eq!(p1.children[0], created.summary());

    let stored = gateway.document(Collection::Parents, "P1").await.unwrap();
    assert_eq!(stored["children"].as_array().unwrap().len(), 1);
    assert_eq!(stored["children"][0]["id"], created.id.as_str());
}

#[tokio::test]
async fn delete_student_leaves_siblings_and_other_parents() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_documents(
                Collection::Parents,
                vec![
                    parent("P2", "Huda", vec![summary("s", "Sara"), summary("other", "Omar")]),
                    parent("P3", "Layla", vec![summary("x", "Yusuf")]),
                ],
            )
            .with_documents(
                Collection::Students,
                vec![student("s", "Sara", "P2"), student("other", "Omar", "P2"), student("x", "Yusuf", "P3")],
            ),
    );
    let mut console = console(gateway.clone()).await;
    let before_p3 = console.cache().require::<Parent>("P3").unwrap().clone();

    console.delete_student("s").await.unwrap();

    let p2 = console.cache().require::<Parent>("P2").unwrap();
    let ids: Vec<_> = p2.children.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["other"]);
    assert_eq!(console.cache().require::<Parent>("P3").unwrap(), &before_p3);
    assert!(console.cache().find::<Student>("s").is_none());
}

#[tokio::test]
async fn reassigning_parent_moves_exactly_one_summary() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_documents(
                Collection::Parents,
                vec![parent("A", "Huda", vec![summary("s", "Sara")]), parent("B", "Omar", vec![])],
            )
            .with_documents(Collection::Students, vec![student("s", "Sara", "A")]),
    );
    let mut console = console(gateway.clone()).await;

    let changes = StudentChanges {
        parent: ParentChange::Attach("B".to_string()),
        ..Default::default()
    };
    console.update_student("s", changes).await.unwrap();

    let a = console.cache().require::<Parent>("A").unwrap();
    let b = console.cache().require::<Parent>("B").unwrap();
    assert!(a.child("s").is_none());
    assert_eq!(b.children.iter().filter(|c| c.id == "s").count(), 1);
    assert!(console.audit().is_empty());
}

#[tokio::test]
async fn student_without_parent_syncs_nothing() {
    let gateway = Arc::new(MemoryGateway::new().with_documents(Collection::Parents, vec![parent("P1", "Huda", vec![])]));
    let mut console = console(gateway.clone()).await;

    let draft = StudentDraft {
        parent: ParentSelection::None,
        parent_phone: Some("0551112222".to_string()),
        ..ali()
    };
    let synced = console.create_student(draft).await.unwrap();
    assert!(synced.is_clean());
    assert!(!synced.value.has_parent());
    assert_eq!(gateway.write_count().await, 1);
    assert!(console.cache().require::<Parent>("P1").unwrap().children.is_empty());
}

#[tokio::test]
async fn mixed_edits_keep_summaries_consistent() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_documents(Collection::Parents, vec![parent("P1", "Huda", vec![]), parent("P2", "Omar", vec![])]),
    );
    let mut console = console(gateway.clone()).await;

    let first = console.create_student(ali()).await.unwrap().value;
    let second = console
        .create_student(StudentDraft {
            name: "Mona".to_string(),
            ..ali()
        })
        .await
        .unwrap()
        .value;
    console
        .update_student(
            &first.id,
            StudentChanges {
                name: Some("Ali Hassan".to_string()),
                grade: Some("G4".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    console.add_child_to_parent("P2", &second.id).await.unwrap();
    console.remove_child_from_parent("P1", &first.id).await.unwrap();
    console
        .update_student(
            &first.id,
            StudentChanges {
                parent: ParentChange::Attach("P2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(console.audit().is_empty(), "drift: {:?}", console.audit());
    assert!(console.cache().require::<Parent>("P1").unwrap().children.is_empty());
    assert_eq!(console.cache().require::<Parent>("P2").unwrap().children.len(), 2);

    // The store agrees with the cache after a full reload.
    console.init().await.unwrap();
    assert!(console.audit().is_empty());
}

#[tokio::test]
async fn failed_cascade_is_reported_and_found_by_audit() {
    let gateway = Arc::new(MemoryGateway::new().with_documents(Collection::Parents, vec![parent("P1", "Huda", vec![])]));
    let mut console = console(gateway.clone()).await;
    gateway.fail_next(Collection::Parents, Operation::Update, "deadline exceeded").await;

    let synced = console.create_student(ali()).await.unwrap();
    assert!(!synced.is_clean());
    assert!(gateway.document(Collection::Students, &synced.value.id).await.is_some());

    match console.ensure_consistent() {
        Err(Error::RelationshipDrift { count: 1, .. }) => {}
        other => panic!("expected drift, got {:?}", other),
    }

    // Re-attaching from the parent side repairs it.
    console.add_child_to_parent("P1", &synced.value.id).await.unwrap();
    assert!(console.ensure_consistent().is_ok());
}

// ============================================================================
// Documents written by other clients
// ============================================================================

#[tokio::test]
async fn server_stamped_student_still_blocks_parent_delete() {
    let mut stamped = student("s1", "Sara", "P1");
    stamped["createdAt"] = json!({"_seconds": 1_700_000_000, "_nanoseconds": 0});
    stamped["currentStatus"] = json!("boarding");
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_documents(Collection::Parents, vec![parent("P1", "Huda", vec![summary("s1", "Sara")])])
            .with_documents(Collection::Students, vec![stamped]),
    );
    let mut console = console(gateway.clone()).await;
    assert_eq!(console.cache().all::<Student>().len(), 1);

    let err = console.delete_parent("P1").await.unwrap_err();
    assert!(matches!(err, Error::ReferencesExist { count: 1, .. }));
    assert!(gateway.document(Collection::Parents, "P1").await.is_some());
}

#[tokio::test]
async fn string_counts_still_guard_capacity() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_documents(
                Collection::Buses,
                vec![json!({"id": "bus_1", "plateNumber": "ABC 123", "capacity": "2", "studentsCount": "2"})],
            )
            .with_documents(Collection::Students, vec![student("new", "Ali", "")]),
    );
    let mut console = console(gateway.clone()).await;

    assert!(matches!(
        console.assign_student_to_bus("new", "bus_1").await,
        Err(Error::CapacityExceeded { .. })
    ));
}

// ============================================================================
// Capacity
// ============================================================================

#[tokio::test]
async fn full_bus_rejects_assignment() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_documents(
                Collection::Buses,
                vec![json!({"id": "bus_1", "plateNumber": "ABC 123", "capacity": 30, "studentsCount": 30})],
            )
            .with_documents(Collection::Students, vec![student("new", "Ali", "")]),
    );
    let mut console = console(gateway.clone()).await;

    let err = console.assign_student_to_bus("new", "bus_1").await.unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { .. }));
    assert_eq!(console.cache().require::<Bus>("bus_1").unwrap().students_count, 30);
    let stored = gateway.document(Collection::Buses, "bus_1").await.unwrap();
    assert_eq!(stored["studentsCount"], 30);
}

#[tokio::test]
async fn two_sessions_cannot_both_take_the_last_seat() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_documents(
                Collection::Buses,
                vec![json!({"id": "bus_1", "plateNumber": "ABC 123", "capacity": 3, "studentsCount": 2})],
            )
            .with_documents(Collection::Students, vec![student("a", "Ali", ""), student("b", "Mona", "")]),
    );
    let mut first = console(gateway.clone()).await;
    let mut second = console(gateway.clone()).await;

    // Both sessions pass the cache check.
    assert!(first.can_assign("bus_1", 1).is_ok());
    assert!(second.can_assign("bus_1", 1).is_ok());

    first.assign_student_to_bus("a", "bus_1").await.unwrap();
    let err = second.assign_student_to_bus("b", "bus_1").await.unwrap_err();
    match err {
        Error::RemoteWrite(api) => assert!(api.is_conflict()),
        other => panic!("expected conflict, got {:?}", other),
    }

    let stored = gateway.document(Collection::Buses, "bus_1").await.unwrap();
    assert_eq!(stored["studentsCount"], 3);
    assert!(second.cache().require::<Student>("b").unwrap().bus_id.is_none());

    // After a reload the second session sees the bus as full.
    second.reload(Collection::Buses).await.unwrap();
    assert!(matches!(
        second.assign_student_to_bus("b", "bus_1").await,
        Err(Error::CapacityExceeded { .. })
    ));
}

// ============================================================================
// Location
// ============================================================================

#[tokio::test]
async fn broken_primary_falls_back_to_store_document() {
    let gateway = Arc::new(MemoryGateway::new().with_documents(
        Collection::Buses,
        vec![json!({"id": "bus_1", "plateNumber": "ABC 123", "lat": 24.7, "lng": 46.7})],
    ));
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = LocationChain::new()
        .with(BrokenService { calls: calls.clone() })
        .with(StoreDocumentProvider::new(RemoteStore::new(gateway.clone())));
    let console = console_over(gateway.clone(), chain).await;

    let location = console.resolve_location("bus_1").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(location.source, LocationSource::StoreDocument);
    assert_eq!(location.coordinates, Some(Coordinates::new(24.7, 46.7)));
    assert!(location.is_available());
}

#[tokio::test]
async fn every_provider_failing_yields_fallback() {
    let gateway = Arc::new(MemoryGateway::new().with_documents(
        Collection::Buses,
        vec![json!({"id": "bus_1", "plateNumber": "ABC 123"})],
    ));
    let chain = LocationChain::new()
        .with(BrokenService {
            calls: Arc::new(AtomicUsize::new(0)),
        })
        .with(StoreDocumentProvider::new(RemoteStore::new(gateway.clone())));
    let console = console_over(gateway.clone(), chain).await;

    let location = console.resolve_location("bus_1").await.unwrap();
    assert_eq!(location, Location::unavailable("bus_1"));
}

#[tokio::test(start_paused = true)]
async fn restarting_tracking_keeps_one_timer() {
    let gateway = Arc::new(MemoryGateway::new().with_documents(
        Collection::Buses,
        vec![json!({"id": "bus_1", "plateNumber": "ABC 123", "lat": 24.7, "lng": 46.7})],
    ));
    let chain = LocationChain::new().with(StoreDocumentProvider::new(RemoteStore::new(gateway.clone())));
    let console = console_over(gateway.clone(), chain).await;

    let updates = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let seen = updates.clone();
        console
            .start_tracking("bus_1", move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    assert_eq!(console.tracker().active_sessions(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    // One timer: ticks at 0s, 30s and 60s.
    assert_eq!(updates.load(Ordering::SeqCst), 3);

    assert!(console.stop_tracking("bus_1"));
    assert!(!console.stop_tracking("bus_1"));
}
