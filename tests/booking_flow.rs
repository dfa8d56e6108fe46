use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use ulid::Ulid;

use salon_booking::access::{Caller, Role, StaticAccessGuard};
use salon_booking::db::Database;
use salon_booking::engine::*;
use salon_booking::model::*;

// ── Test infrastructure ──────────────────────────────────────

fn data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("salon_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn engine_at(wal: PathBuf, guard: Arc<StaticAccessGuard>) -> Engine {
    Engine::new(Arc::new(Database::open(wal).unwrap()), guard)
}

fn tomorrow() -> NaiveDate {
    Local::now().date_naive() + Days::new(1)
}

struct Ids {
    store: Ulid,
    stylist: Ulid,
    customer: Ulid,
    manager: Ulid,
    cut: Ulid,
    wash: Ulid,
}

async fn seed(engine: &Engine, guard: &StaticAccessGuard) -> Ids {
    let ids = Ids {
        store: Ulid::new(),
        stylist: Ulid::new(),
        customer: Ulid::new(),
        manager: Ulid::new(),
        cut: Ulid::new(),
        wash: Ulid::new(),
    };
    guard.grant(ids.manager, ids.store);
    guard.grant(ids.stylist, ids.store);

    engine
        .register_store(Store {
            id: ids.store,
            name: "Harbor".into(),
            is_active: true,
        })
        .await
        .unwrap();
    engine
        .register_stylist(Stylist {
            id: ids.stylist,
            store_id: ids.store,
            name: "Yuna".into(),
        })
        .await
        .unwrap();
    engine
        .register_customer(Customer {
            id: ids.customer,
            name: "Dae".into(),
        })
        .await
        .unwrap();
    for (id, name, minutes, price, is_addon) in [
        (ids.cut, "Cut", 30, 4000, false),
        (ids.wash, "Wash", 10, 800, true),
    ] {
        engine
            .register_service(Service {
                id,
                name: name.into(),
                duration_minutes: minutes,
                price,
                is_addon,
                is_active: true,
            })
            .await
            .unwrap();
    }
    ids
}

// ── Tests ────────────────────────────────────────────────────

/// A stylist publishes a day from a JSON payload, a customer books, moves and
/// cancels, and the whole history replays from the WAL.
#[tokio::test]
async fn salon_day_round_trip() {
    let dir = data_dir();
    let wal = dir.join("salon.wal");
    let guard = Arc::new(StaticAccessGuard::new());
    let engine = engine_at(wal.clone(), guard.clone());
    let ids = seed(&engine, &guard).await;

    let day = tomorrow();
    let payload = format!(
        r#"{{
            "store_id": "{store}",
            "stylist_id": "{stylist}",
            "days": [{{
                "work_date": "{day}",
                "time_slots": [
                    {{"start": "10:00", "end": "10:45"}},
                    {{"start": "09:00", "end": "09:30"}},
                    {{"start": "09:30", "end": "10:00"}}
                ],
                "note": "half day"
            }}]
        }}"#,
        store = ids.store,
        stylist = ids.stylist,
        day = day.format("%Y-%m-%d"),
    );
    let req: CreateSchedulesRequest = serde_json::from_str(&payload).unwrap();
    let stylist = Caller::staff(ids.stylist, Role::Stylist);
    let created = engine.create_schedules_bulk(&stylist, req).await.unwrap();
    assert_eq!(created.len(), 1);
    let slots: Vec<Ulid> = created[0].time_slots.iter().map(|t| t.id).collect();
    assert_eq!(slots.len(), 3);

    let me = Caller::customer(ids.customer);
    let booking = engine
        .create_booking(
            &me,
            CreateBookingRequest {
                store_id: ids.store,
                customer_id: ids.customer,
                time_slot_id: slots[0],
                main_service_id: ids.cut,
                sub_service_ids: vec![],
                chat_enabled: true,
                note: None,
            },
        )
        .await
        .unwrap();

    let update: BookingUpdate = serde_json::from_str(&format!(
        r#"{{"time_slot_id":"{}","main_service_id":"{}","sub_service_ids":["{}"],"note":null}}"#,
        slots[2], ids.cut, ids.wash
    ))
    .unwrap();
    let moved = engine.update_booking(&me, booking.id, update).await.unwrap();
    assert_eq!(moved.time_slot_id, slots[2]);
    assert_eq!(moved.total_duration_minutes, 40);
    assert!(moved.chat_enabled);

    let open = engine
        .available_slots(ids.store, day, None, None)
        .await
        .unwrap();
    assert_eq!(
        open.iter().map(|o| o.time_slot_id).collect::<Vec<_>>(),
        vec![slots[0], slots[1]]
    );

    let manager = Caller::staff(ids.manager, Role::Manager);
    let done = engine.complete_booking(&manager, booking.id).await.unwrap();
    assert_eq!(done.status, BookingStatus::Completed);
    engine
        .mark_completed(
            &manager,
            booking.id,
            CompletionUpdate {
                actual_duration_minutes: Update::Set(Some(50)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let second = engine
        .create_booking(
            &me,
            CreateBookingRequest {
                store_id: ids.store,
                customer_id: ids.customer,
                time_slot_id: slots[0],
                main_service_id: ids.cut,
                sub_service_ids: vec![],
                chat_enabled: false,
                note: Some("window seat".into()),
            },
        )
        .await
        .unwrap();
    engine
        .cancel_booking(&me, second.id, CancelTarget::Cancelled, Some("travel".into()))
        .await
        .unwrap();

    let before = engine.database().counts().await;
    let history = engine.list_bookings(&me, &BookingFilter::new()).await.unwrap();
    drop(engine);

    let replayed = engine_at(wal, guard);
    assert_eq!(replayed.database().counts().await, before);
    assert_eq!(
        replayed.list_bookings(&me, &BookingFilter::new()).await.unwrap(),
        history
    );
    let open = replayed
        .available_slots(ids.store, day, None, None)
        .await
        .unwrap();
    assert_eq!(open.len(), 2);

    let finished = replayed.get_booking(&me, booking.id).await.unwrap();
    assert_eq!(finished.status, BookingStatus::Completed);
    assert_eq!(finished.actual_duration_minutes, Some(50));

    std::fs::remove_dir_all(dir).ok();
}

/// Failed operations leave nothing behind in memory or on disk.
#[tokio::test]
async fn rejected_operations_leave_no_trace() {
    let dir = data_dir();
    let wal = dir.join("salon.wal");
    let guard = Arc::new(StaticAccessGuard::new());
    let engine = engine_at(wal.clone(), guard.clone());
    let ids = seed(&engine, &guard).await;
    let manager = Caller::staff(ids.manager, Role::Manager);

    let day = tomorrow();
    let created = engine
        .create_schedules_bulk(
            &manager,
            CreateSchedulesRequest {
                store_id: ids.store,
                stylist_id: ids.stylist,
                days: vec![ScheduleDayInput {
                    work_date: day.format("%Y-%m-%d").to_string(),
                    time_slots: vec![TimeWindowInput::new("09:00", "09:30")],
                    note: None,
                }],
            },
        )
        .await
        .unwrap();
    let slot = created[0].time_slots[0].id;
    let before = engine.database().counts().await;

    let err = engine
        .create_booking(
            &Caller::customer(ids.customer),
            CreateBookingRequest {
                store_id: ids.store,
                customer_id: ids.customer,
                time_slot_id: slot,
                main_service_id: ids.cut,
                sub_service_ids: vec![ids.wash],
                chat_enabled: false,
                note: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(engine.database().counts().await, before);

    let err = engine
        .create_schedules_bulk(
            &manager,
            CreateSchedulesRequest {
                store_id: ids.store,
                stylist_id: ids.stylist,
                days: vec![
                    ScheduleDayInput {
                        work_date: (day + Days::new(1)).format("%Y-%m-%d").to_string(),
                        time_slots: vec![TimeWindowInput::new("09:00", "09:30")],
                        note: None,
                    },
                    ScheduleDayInput {
                        work_date: day.format("%Y-%m-%d").to_string(),
                        time_slots: vec![TimeWindowInput::new("13:00", "14:00")],
                        note: None,
                    },
                ],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(engine.database().counts().await, before);
    drop(engine);

    let replayed = engine_at(wal, guard);
    assert_eq!(replayed.database().counts().await, before);
    std::fs::remove_dir_all(dir).ok();
}
