use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use super::store::{AppointmentQuery, BlockQuery, BookingItemQuery};
use super::*;

const H: Ms = 3_600_000; // 1 hour in ms
const M: Ms = 60_000; // 1 minute in ms

/// 2026-03-01T00:00:00Z
const DAY: Ms = 1_772_323_200_000;

fn at(hours: Ms) -> Ms {
    DAY + hours * H
}

fn appointment(id: &str, staff: Option<&str>, resource: Option<&str>, start: Ms, minutes: Option<i64>) -> Appointment {
    Appointment {
        id: id.into(),
        store_id: "store-1".into(),
        staff_id: staff.map(str::to_string),
        resource_id: resource.map(str::to_string),
        scheduled_at: start,
        duration_minutes: minutes,
        status: Status::Confirmed,
    }
}

fn block(id: &str, staff: Option<&str>, resource: Option<&str>, start: Ms, end: Ms, reason: Option<&str>) -> Block {
    Block {
        id: id.into(),
        store_id: "store-1".into(),
        staff_id: staff.map(str::to_string),
        resource_id: resource.map(str::to_string),
        span: Span::new(start, end),
        reason: reason.map(str::to_string),
    }
}

fn item(id: &str, parent: &str, staff: Option<&str>, resource: Option<&str>, start: Ms, end: Ms) -> BookingItem {
    BookingItem {
        id: id.into(),
        store_id: "store-1".into(),
        appointment_id: parent.into(),
        staff_id: staff.map(str::to_string),
        resource_id: resource.map(str::to_string),
        span: Span::new(start, end),
        status: Status::Confirmed,
    }
}

fn window(start: Ms, end: Ms) -> ConflictQuery {
    ConflictQuery::new("store-1", Span::new(start, end))
}

fn kinds(report: &ConflictReport) -> HashSet<(ConflictKind, String)> {
    report
        .conflicts
        .iter()
        .map(|c| (c.kind, c.id.clone()))
        .collect()
}

// ── Instrumented stores ──────────────────────────────────

/// Wraps an `InMemoryStore` and counts every fetch.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryStore,
    fetches: AtomicUsize,
}

#[async_trait]
impl IntervalStore for CountingStore {
    async fn appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.appointments(query).await
    }

    async fn blocks(&self, query: &BlockQuery) -> Result<Vec<Block>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.blocks(query).await
    }

    async fn booking_items(&self, query: &BookingItemQuery) -> Result<Vec<BookingItem>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.booking_items(query).await
    }
}

/// Returns fixed rows, and fails the block fetch. Ignores all filters.
struct BrokenBlocksStore {
    appointments: Vec<Appointment>,
    items: Vec<BookingItem>,
}

#[async_trait]
impl IntervalStore for BrokenBlocksStore {
    async fn appointments(&self, _query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.appointments.clone())
    }

    async fn blocks(&self, _query: &BlockQuery) -> Result<Vec<Block>, StoreError> {
        Err(StoreError::Unavailable("connection reset".into()))
    }

    async fn booking_items(&self, _query: &BookingItemQuery) -> Result<Vec<BookingItem>, StoreError> {
        Ok(self.items.clone())
    }
}

// ── Conflict detection ───────────────────────────────────

#[tokio::test]
async fn no_subject_is_a_noop_without_queries() {
    let store = CountingStore::default();
    let report = assert_ok!(check_conflicts(&store, &window(at(10), at(11)), FailurePolicy::Strict).await);
    assert!(!report.has_conflict);
    assert!(report.conflicts.is_empty());
    assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn each_subject_issues_three_fetches() {
    let store = CountingStore::default();
    check_conflicts(&store, &window(at(10), at(11)).staff("alice"), FailurePolicy::Strict)
        .await
        .unwrap();
    assert_eq!(store.fetches.load(Ordering::SeqCst), 3);

    check_conflicts(
        &store,
        &window(at(10), at(11)).staff("alice").resource("room-1"),
        FailurePolicy::Strict,
    )
    .await
    .unwrap();
    assert_eq!(store.fetches.load(Ordering::SeqCst), 3 + 6);
}

#[tokio::test]
async fn appointment_ending_at_window_start_does_not_conflict() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("a1", Some("alice"), None, at(9), Some(60)))
        .await
        .unwrap();

    let report = engine
        .check_conflicts(&window(at(10), at(11)).staff("alice"))
        .await
        .unwrap();
    assert!(!report.has_conflict);
}

#[tokio::test]
async fn null_duration_defaults_to_sixty_minutes() {
    let engine = Engine::default();
    let start = parse_timestamp("2026-03-01T10:00:00Z").unwrap();
    engine
        .insert_appointment(appointment("a1", Some("alice"), None, start, None))
        .await
        .unwrap();

    let report = engine
        .check_conflicts(&window(start, start + H).staff("alice"))
        .await
        .unwrap();
    assert!(report.has_conflict);
    assert_eq!(report.conflicts.len(), 1);
    let entry = &report.conflicts[0];
    assert_eq!(entry.kind, ConflictKind::Appointment);
    assert_eq!(format_timestamp(entry.end_at).unwrap(), "2026-03-01T11:00:00Z");
}

#[tokio::test]
async fn one_of_each_kind_aggregates() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("a1", Some("alice"), None, at(10), Some(30)))
        .await
        .unwrap();
    engine
        .insert_block(block("b1", Some("alice"), None, at(10) + 30 * M, at(11), Some("Lunch")))
        .await
        .unwrap();
    engine
        .insert_booking_item(item("i1", "other", Some("alice"), None, at(10) + 15 * M, at(10) + 45 * M))
        .await
        .unwrap();

    let report = engine
        .check_conflicts(&window(at(10), at(11)).staff("alice"))
        .await
        .unwrap();
    assert_eq!(report.conflicts.len(), 3);
    let expected: HashSet<_> = [
        (ConflictKind::Appointment, "a1".to_string()),
        (ConflictKind::Block, "b1".to_string()),
        (ConflictKind::BookingItem, "i1".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(kinds(&report), expected);
    let lunch = report
        .conflicts
        .iter()
        .find(|c| c.kind == ConflictKind::Block)
        .unwrap();
    assert_eq!(lunch.reason.as_deref(), Some("Lunch"));
}

#[tokio::test]
async fn editing_an_appointment_skips_itself_and_its_items() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("a1", Some("alice"), None, at(10), Some(60)))
        .await
        .unwrap();
    engine
        .insert_booking_item(item("i1", "a1", Some("alice"), None, at(10), at(11)))
        .await
        .unwrap();
    engine
        .insert_block(block("a1", Some("alice"), None, at(10), at(11), None))
        .await
        .unwrap();

    let report = engine
        .check_conflicts(&window(at(10), at(11)).staff("alice").excluding("a1"))
        .await
        .unwrap();
    // only the block survives, even though it shares the id
    assert_eq!(
        kinds(&report),
        [(ConflictKind::Block, "a1".to_string())].into_iter().collect()
    );
}

#[tokio::test]
async fn staff_and_resource_are_checked_independently() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("with-alice", Some("alice"), None, at(10), Some(60)))
        .await
        .unwrap();
    engine
        .insert_appointment(appointment("in-room", Some("bob"), Some("room-1"), at(10) + 30 * M, Some(60)))
        .await
        .unwrap();

    let report = engine
        .check_conflicts(&window(at(10), at(11)).staff("alice").resource("room-1"))
        .await
        .unwrap();
    assert_eq!(report.conflicts.len(), 2);
    assert_eq!(
        kinds(&report),
        [
            (ConflictKind::Appointment, "with-alice".to_string()),
            (ConflictKind::Appointment, "in-room".to_string()),
        ]
        .into_iter()
        .collect()
    );
}

#[tokio::test]
async fn record_matching_both_subjects_is_reported_per_subject() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("a1", Some("alice"), Some("room-1"), at(10), Some(60)))
        .await
        .unwrap();

    let report = engine
        .check_conflicts(&window(at(10), at(11)).staff("alice").resource("room-1"))
        .await
        .unwrap();
    assert_eq!(report.conflicts.len(), 2);
    assert!(report.conflicts.iter().all(|c| c.id == "a1"));
}

#[tokio::test]
async fn null_reason_is_absent_not_the_string_null() {
    let engine = Engine::default();
    engine
        .insert_block(block("b1", None, Some("room-1"), at(10), at(12), None))
        .await
        .unwrap();

    let report = engine
        .check_conflicts(&window(at(11), at(13)).resource("room-1"))
        .await
        .unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].reason, None);
    let json = serde_json::to_string(&report).unwrap();
    assert!(!json.contains("reason"));
    assert!(!json.contains("null"));
}

#[tokio::test]
async fn repeated_checks_are_identical() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("a1", Some("alice"), None, at(10), None))
        .await
        .unwrap();
    engine
        .insert_block(block("b1", Some("alice"), None, at(10), at(11), Some("Training")))
        .await
        .unwrap();

    let q = window(at(10), at(11)).staff("alice");
    let first = engine.check_conflicts(&q).await.unwrap();
    let second = engine.check_conflicts(&q).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn cancelled_and_no_show_appointments_free_the_slot() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("a1", Some("alice"), None, at(10), None))
        .await
        .unwrap();
    engine
        .insert_appointment(appointment("a2", Some("alice"), None, at(10), None))
        .await
        .unwrap();
    let q = window(at(10), at(11)).staff("alice");
    assert_eq!(engine.check_conflicts(&q).await.unwrap().conflicts.len(), 2);

    engine.set_appointment_status("a1", Status::Cancelled).await.unwrap();
    engine.set_appointment_status("a2", Status::NoShow).await.unwrap();
    assert!(!engine.check_conflicts(&q).await.unwrap().has_conflict);
}

#[tokio::test]
async fn only_cancellation_frees_a_booking_item() {
    let engine = Engine::default();
    engine
        .insert_booking_item(item("i1", "p", None, Some("chair-2"), at(10), at(11)))
        .await
        .unwrap();
    let q = window(at(10), at(11)).resource("chair-2");

    engine.set_booking_item_status("i1", Status::NoShow).await.unwrap();
    assert!(engine.check_conflicts(&q).await.unwrap().has_conflict);

    engine.set_booking_item_status("i1", Status::Cancelled).await.unwrap();
    assert!(!engine.check_conflicts(&q).await.unwrap().has_conflict);
}

#[tokio::test]
async fn other_stores_are_invisible() {
    let engine = Engine::default();
    let mut elsewhere = appointment("a1", Some("alice"), None, at(10), None);
    elsewhere.store_id = "store-2".into();
    engine.insert_appointment(elsewhere).await.unwrap();

    let report = engine
        .check_conflicts(&window(at(10), at(11)).staff("alice"))
        .await
        .unwrap();
    assert!(!report.has_conflict);
}

#[tokio::test]
async fn deleted_records_stop_conflicting() {
    let engine = Engine::default();
    engine
        .insert_block(block("b1", Some("alice"), None, at(10), at(11), None))
        .await
        .unwrap();
    let q = window(at(10), at(11)).staff("alice");
    assert!(engine.check_conflicts(&q).await.unwrap().has_conflict);

    let store_id = engine.delete_record(ConflictKind::Block, "b1").await.unwrap();
    assert_eq!(store_id, "store-1");
    assert!(!engine.check_conflicts(&q).await.unwrap().has_conflict);

    let err = assert_err!(engine.delete_record(ConflictKind::Block, "b1").await);
    assert!(matches!(err, EngineError::NotFound(_)));
}

// ── Fetch failure policy ─────────────────────────────────

fn broken_store() -> BrokenBlocksStore {
    BrokenBlocksStore {
        appointments: vec![appointment("a1", Some("alice"), None, at(10), None)],
        items: vec![item("i1", "p", Some("alice"), None, at(10), at(11))],
    }
}

#[tokio::test]
async fn strict_policy_propagates_store_failure() {
    let store = broken_store();
    let err = assert_err!(
        check_conflicts(&store, &window(at(10), at(11)).staff("alice"), FailurePolicy::Strict).await
    );
    assert!(matches!(err, EngineError::Store(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn lenient_policy_keeps_other_kinds() {
    let store = broken_store();
    let report = assert_ok!(
        check_conflicts(&store, &window(at(10), at(11)).staff("alice"), FailurePolicy::Lenient).await
    );
    assert_eq!(
        kinds(&report),
        [
            (ConflictKind::Appointment, "a1".to_string()),
            (ConflictKind::BookingItem, "i1".to_string()),
        ]
        .into_iter()
        .collect()
    );
}

#[tokio::test]
async fn detector_refilters_unfiltered_adapter_rows() {
    let mut cancelled = appointment("gone", Some("alice"), None, at(10), None);
    cancelled.status = Status::Cancelled;
    let store = BrokenBlocksStore {
        appointments: vec![
            cancelled,
            appointment("self", Some("alice"), None, at(10), None),
            appointment("earlier", Some("alice"), None, at(8), Some(120)),
        ],
        items: vec![item("own", "self", Some("alice"), None, at(10), at(11))],
    };
    let report = check_conflicts(
        &store,
        &window(at(10), at(11)).staff("alice").excluding("self"),
        FailurePolicy::Lenient,
    )
    .await
    .unwrap();
    assert!(!report.has_conflict);
}

// ── Engine validation ────────────────────────────────────

#[tokio::test]
async fn duplicate_ids_rejected_per_kind() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("x", Some("alice"), None, at(10), None))
        .await
        .unwrap();
    let err = assert_err!(
        engine
            .insert_appointment(appointment("x", Some("bob"), None, at(12), None))
            .await
    );
    assert!(matches!(err, EngineError::AlreadyExists(_)));

    // same id, different kind is fine
    assert_ok!(
        engine
            .insert_block(block("x", Some("alice"), None, at(13), at(14), None))
            .await
    );
}

#[tokio::test]
async fn invalid_records_rejected() {
    let engine = Engine::default();

    let err = assert_err!(
        engine
            .insert_appointment(appointment("a", Some("alice"), None, at(10), Some(0)))
            .await
    );
    assert!(matches!(err, EngineError::Invalid(_)));

    let err = assert_err!(
        engine
            .insert_appointment(appointment("", Some("alice"), None, at(10), None))
            .await
    );
    assert!(matches!(err, EngineError::Invalid(_)));

    let err = assert_err!(
        engine
            .insert_block(block("b", None, None, at(10), at(11), None))
            .await
    );
    assert!(matches!(err, EngineError::Invalid(_)));

    let mut backwards = item("i", "p", Some("alice"), None, at(10), at(11));
    backwards.span = Span { start: at(11), end: at(10) };
    let err = assert_err!(engine.insert_booking_item(backwards).await);
    assert!(matches!(err, EngineError::InvalidSpan { .. }));

    let err = assert_err!(
        engine
            .insert_block(block("old", Some("alice"), None, 0, H, None))
            .await
    );
    assert!(matches!(err, EngineError::LimitExceeded(_)));
}

#[tokio::test]
async fn booking_item_must_share_parent_store() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("a1", Some("alice"), None, at(10), None))
        .await
        .unwrap();
    let mut stray = item("i1", "a1", Some("alice"), None, at(10), at(11));
    stray.store_id = "store-2".into();
    let err = assert_err!(engine.insert_booking_item(stray).await);
    assert!(matches!(err, EngineError::Invalid(_)));
}

#[tokio::test]
async fn check_rejects_bad_windows() {
    let engine = Engine::default();
    let backwards = ConflictQuery {
        window: Span { start: at(11), end: at(10) },
        ..window(at(10), at(11)).staff("alice")
    };
    assert!(matches!(
        engine.check_conflicts(&backwards).await,
        Err(EngineError::InvalidSpan { .. })
    ));

    let huge = window(at(0), at(0) + crate::limits::MAX_QUERY_WINDOW_MS + 1).staff("alice");
    assert!(matches!(
        engine.check_conflicts(&huge).await,
        Err(EngineError::LimitExceeded(_))
    ));

    let no_store = ConflictQuery::new("", Span::new(at(10), at(11))).staff("alice");
    assert!(matches!(
        engine.check_conflicts(&no_store).await,
        Err(EngineError::Invalid(_))
    ));
}

#[tokio::test]
async fn no_subject_skips_window_checks() {
    let engine = Engine::default();
    let backwards = ConflictQuery {
        window: Span { start: at(11), end: at(10) },
        ..window(at(10), at(11))
    };
    let report = assert_ok!(engine.check_conflicts(&backwards).await);
    assert!(!report.has_conflict);
    assert!(report.conflicts.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_id_in_two_stores_is_claimed_once() {
    let engine = Arc::new(Engine::default());
    for round in 0..50 {
        let id = format!("b{round}");
        let tasks = ["store-1", "store-2"].map(|store| {
            let engine = engine.clone();
            let mut b = block(&id, Some("alice"), None, at(10), at(11), None);
            b.store_id = store.into();
            tokio::spawn(async move { engine.insert_block(b).await })
        });
        let mut won = Vec::new();
        for (store, task) in ["store-1", "store-2"].into_iter().zip(tasks) {
            match task.await.unwrap() {
                Ok(()) => won.push(store),
                Err(e) => assert!(matches!(e, EngineError::AlreadyExists(_))),
            }
        }
        assert_eq!(won.len(), 1, "round {round}");
        assert_eq!(
            engine.store().store_for_record(ConflictKind::Block, &id).as_deref(),
            Some(won[0])
        );
        let listed = engine.list_blocks("store-1").await.len() + engine.list_blocks("store-2").await.len();
        assert_eq!(listed, round + 1);
    }
}

// ── Listings ─────────────────────────────────────────────

#[tokio::test]
async fn listings_are_sorted_by_start() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("late", Some("alice"), None, at(15), None))
        .await
        .unwrap();
    engine
        .insert_appointment(appointment("early", Some("alice"), None, at(9), None))
        .await
        .unwrap();
    engine
        .insert_booking_item(item("i2", "early", None, Some("room-1"), at(9) + 30 * M, at(10)))
        .await
        .unwrap();
    engine
        .insert_booking_item(item("i1", "early", Some("alice"), None, at(9), at(9) + 30 * M))
        .await
        .unwrap();

    let ids: Vec<_> = engine
        .list_appointments("store-1")
        .await
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec!["early", "late"]);

    let items: Vec<_> = engine
        .booking_items_of("early")
        .await
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(items, vec!["i1", "i2"]);

    // items stay listed under their parent id after the parent is gone
    engine
        .insert_booking_item(item("orphan", "never-booked", None, Some("room-2"), at(12), at(13)))
        .await
        .unwrap();
    assert_ok!(engine.delete_record(ConflictKind::Appointment, "early").await);
    assert_eq!(engine.booking_items_of("early").await.len(), 2);
    let orphans = engine.booking_items_of("never-booked").await;
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].id, "orphan");

    assert_ok!(engine.delete_record(ConflictKind::BookingItem, "i1").await);
    let items: Vec<_> = engine
        .booking_items_of("early")
        .await
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(items, vec!["i2"]);

    assert!(engine.list_blocks("nowhere").await.is_empty());
    assert_eq!(
        engine.get_appointment("late").await.map(|a| a.scheduled_at),
        Some(at(15))
    );
}

// ── Vertical scenarios ───────────────────────────────────

#[tokio::test]
async fn vertical_salon_multi_service_booking() {
    // A colour + cut booking: stylist for the whole visit, basin chair for the
    // first 40 minutes. Rescheduling it by 30 minutes must not trip over itself.
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("visit", Some("stylist-1"), None, at(14), Some(90)))
        .await
        .unwrap();
    engine
        .insert_booking_item(item("colour", "visit", Some("stylist-1"), Some("basin-1"), at(14), at(14) + 40 * M))
        .await
        .unwrap();
    engine
        .insert_booking_item(item("cut", "visit", Some("stylist-1"), None, at(14) + 40 * M, at(15) + 30 * M))
        .await
        .unwrap();
    engine
        .insert_block(block("break", Some("stylist-1"), None, at(16), at(16) + 30 * M, Some("Break")))
        .await
        .unwrap();

    let moved = window(at(14) + 30 * M, at(16)).staff("stylist-1").resource("basin-1").excluding("visit");
    let report = engine.check_conflicts(&moved).await.unwrap();
    assert!(!report.has_conflict);

    // a new customer wanting the basin at 14:20 collides with the colour item only
    let newcomer = window(at(14) + 20 * M, at(14) + 50 * M).resource("basin-1");
    let report = engine.check_conflicts(&newcomer).await.unwrap();
    assert_eq!(
        kinds(&report),
        [(ConflictKind::BookingItem, "colour".to_string())].into_iter().collect()
    );

    // running late into the break
    let overrun = window(at(15) + 30 * M, at(16) + 15 * M).staff("stylist-1");
    let report = engine.check_conflicts(&overrun).await.unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].reason.as_deref(), Some("Break"));
}

#[tokio::test]
async fn vertical_restaurant_table_back_to_back() {
    let engine = Engine::default();
    engine
        .insert_appointment(appointment("dinner-1", None, Some("table-4"), at(18), Some(90)))
        .await
        .unwrap();

    // exactly when the first party leaves
    let next = window(at(19) + 30 * M, at(21)).resource("table-4");
    assert!(!engine.check_conflicts(&next).await.unwrap().has_conflict);

    // one minute early
    let early = window(at(19) + 29 * M, at(21)).resource("table-4");
    assert!(engine.check_conflicts(&early).await.unwrap().has_conflict);
}
