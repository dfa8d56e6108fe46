use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, Local, NaiveDate, NaiveTime};
use ulid::Ulid;

use salon_booking::access::{Caller, Role, StaticAccessGuard};
use salon_booking::db::Database;
use salon_booking::engine::*;
use salon_booking::model::*;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().map_or(0.0, |d| d.as_secs_f64() * 1000.0),
    );
}

struct Fixture {
    engine: Arc<Engine>,
    store: Ulid,
    stylist: Ulid,
    manager: Caller,
    customers: Vec<Ulid>,
    cut: Ulid,
}

impl Fixture {
    fn booking_req(&self, customer: Ulid, slot: Ulid) -> CreateBookingRequest {
        CreateBookingRequest {
            store_id: self.store,
            customer_id: customer,
            time_slot_id: slot,
            main_service_id: self.cut,
            sub_service_ids: vec![],
            chat_enabled: false,
            note: None,
        }
    }
}

async fn setup() -> Fixture {
    let dir = std::env::temp_dir().join(format!("salon_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let db = Arc::new(Database::open(dir.join("salon.wal")).unwrap());
    let guard = Arc::new(StaticAccessGuard::new());
    let engine = Engine::new(db, guard.clone());

    let store = Ulid::new();
    let stylist = Ulid::new();
    let manager = Ulid::new();
    guard.grant(manager, store);

    engine
        .register_store(Store {
            id: store,
            name: "bench".into(),
            is_active: true,
        })
        .await
        .unwrap();
    engine
        .register_stylist(Stylist {
            id: stylist,
            store_id: store,
            name: "bench stylist".into(),
        })
        .await
        .unwrap();
    let cut = Service {
        id: Ulid::new(),
        name: "cut".into(),
        duration_minutes: 15,
        price: 2500,
        is_addon: false,
        is_active: true,
    };
    engine.register_service(cut.clone()).await.unwrap();

    let mut customers = Vec::new();
    for i in 0..64 {
        let id = Ulid::new();
        engine
            .register_customer(Customer {
                id,
                name: format!("customer {i}"),
            })
            .await
            .unwrap();
        customers.push(id);
    }
    println!("  created store, stylist, {} customers", customers.len());

    Fixture {
        engine: Arc::new(engine),
        store,
        stylist,
        manager: Caller::staff(manager, Role::Manager),
        customers,
        cut: cut.id,
    }
}

/// 15-minute windows from 08:00 to 20:00.
fn day_windows() -> Vec<TimeWindowInput> {
    let open = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
    (0..48)
        .map(|k| {
            let start = open + chrono::Duration::minutes(15 * k);
            let end = start + chrono::Duration::minutes(15);
            TimeWindowInput::new(
                &start.format("%H:%M").to_string(),
                &end.format("%H:%M").to_string(),
            )
        })
        .collect()
}

async fn phase1_bulk_generation(f: &Fixture, first_day: NaiveDate) -> Vec<Ulid> {
    let days: Vec<ScheduleDayInput> = (0..90)
        .map(|i| ScheduleDayInput {
            work_date: (first_day + Days::new(i)).format("%Y-%m-%d").to_string(),
            time_slots: day_windows(),
            note: None,
        })
        .collect();

    let start = Instant::now();
    let created = f
        .engine
        .create_schedules_bulk(
            &f.manager,
            CreateSchedulesRequest {
                store_id: f.store,
                stylist_id: f.stylist,
                days,
            },
        )
        .await
        .unwrap();
    let elapsed = start.elapsed();

    let slots: Vec<Ulid> = created
        .iter()
        .flat_map(|s| s.time_slots.iter().map(|t| t.id))
        .collect();
    println!(
        "  {} schedules / {} time slots in {:.2}ms",
        created.len(),
        slots.len(),
        elapsed.as_secs_f64() * 1000.0
    );
    slots
}

async fn phase2_sequential(f: &Fixture, slots: &[Ulid]) {
    let n = 1000.min(slots.len());
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for (i, slot) in slots.iter().take(n).enumerate() {
        let customer = f.customers[i % f.customers.len()];
        let t = Instant::now();
        f.engine
            .create_booking(&Caller::customer(customer), f.booking_req(customer, *slot))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("booking latency", &mut latencies);
}

/// Every customer races for the same slots; each slot must end with one winner.
async fn phase3_contended(f: &Fixture, slots: &[Ulid]) {
    let rounds = 100.min(slots.len());
    let mut wins = 0usize;
    let mut conflicts = 0usize;
    let start = Instant::now();

    for slot in slots.iter().take(rounds) {
        let handles: Vec<_> = f
            .customers
            .iter()
            .map(|&customer| {
                let engine = f.engine.clone();
                let req = f.booking_req(customer, *slot);
                tokio::spawn(async move {
                    engine.create_booking(&Caller::customer(customer), req).await
                })
            })
            .collect();
        let mut round_wins = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => round_wins += 1,
                Err(e) if e.kind() == ErrorKind::Conflict => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(round_wins, 1, "slot {slot} had {round_wins} winners");
        wins += round_wins;
    }

    let elapsed = start.elapsed();
    println!(
        "  {rounds} slots x {} customers: {wins} wins, {conflicts} conflicts in {:.2}s",
        f.customers.len(),
        elapsed.as_secs_f64()
    );
}

async fn phase4_reads_under_load(f: &Fixture, day: NaiveDate, slots: &[Ulid]) {
    let writer = {
        let engine = f.engine.clone();
        let reqs: Vec<_> = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let customer = f.customers[i % f.customers.len()];
                (customer, f.booking_req(customer, *slot))
            })
            .collect();
        tokio::spawn(async move {
            for (customer, req) in reqs {
                let _ = engine.create_booking(&Caller::customer(customer), req).await;
            }
        })
    };

    let mut latencies = Vec::new();
    while !writer.is_finished() {
        let t = Instant::now();
        let open = f
            .engine
            .available_slots(f.store, day, None, None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
        std::hint::black_box(open);
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    print_latency("available_slots latency", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== salon booking stress benchmark ===\n");

    println!("[setup]");
    let f = setup().await;
    let first_day = Local::now().date_naive() + Days::new(1);

    println!("\n[phase 1] bulk schedule generation");
    let slots = phase1_bulk_generation(&f, first_day).await;

    println!("\n[phase 2] sequential booking throughput");
    phase2_sequential(&f, &slots[..1000]).await;

    println!("\n[phase 3] contended bookings");
    phase3_contended(&f, &slots[1000..1100]).await;

    println!("\n[phase 4] availability reads under write load");
    let last_day = first_day + Days::new(89);
    let tail = &slots[slots.len() - 48..];
    phase4_reads_under_load(&f, last_day, tail).await;

    let counts = f.engine.database().counts().await;
    println!(
        "\n  final: {} schedules, {} time slots, {} bookings",
        counts.schedules, counts.time_slots, counts.bookings
    );
    println!("\n=== benchmark complete ===");
}
