use tracing::info;

use salon_booking::config::Config;
use salon_booking::db::Database;

/// Maintenance entry point: replay the WAL, report what it holds, and compact
/// it when enough transactions have piled up since the last compaction.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    salon_booking::observability::init(config.metrics_port);

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let wal_path = config.wal_path();
    let db = Database::open_with_queue(wal_path.clone(), config.wal_queue)?;
    let counts = db.counts().await;

    info!("salond opened {}", wal_path.display());
    info!("  stores: {}  stylists: {}  customers: {}  services: {}",
        counts.stores, counts.stylists, counts.customers, counts.services);
    info!("  schedules: {}  time_slots: {}", counts.schedules, counts.time_slots);
    info!("  bookings: {}  booking_details: {}", counts.bookings, counts.booking_details);

    // A freshly compacted log holds one record per chunk of rows.
    let pending = db.replayed_records() as u64 + db.appends_since_compact().await;
    if pending >= config.compact_threshold {
        info!("compacting WAL ({pending} records)");
        db.compact().await?;
        info!("compaction done");
    } else {
        info!(
            "no compaction needed ({pending} < {} records)",
            config.compact_threshold
        );
    }

    info!("salond stopped");
    Ok(())
}
