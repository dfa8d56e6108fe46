mod tables;

pub use tables::{TableCounts, Tables};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, OwnedMutexGuard, mpsc, oneshot};
use tracing::debug;
use ulid::Ulid;

use crate::limits::BATCH_INSERT_CHUNK;
use crate::model::*;
use crate::wal::Wal;

use tables::Undo;

const DEFAULT_WAL_QUEUE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("WAL error: {0}")]
    Wal(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        record: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        records: Vec<Vec<Event>>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Group-commit writer. Owns the WAL; appends already queued behind the first
/// one share its fsync, and control commands run between batches.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { record, response } => vec![(record, response)],
            other => {
                run_command(&mut wal, other);
                continue;
            }
        };
        let mut control = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { record, response } => batch.push((record, response)),
                other => {
                    control = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, batch);
        if let Some(cmd) = control {
            run_command(&mut wal, cmd);
        }
    }
}

/// Write every record of the batch, fsync once, and acknowledge each sender
/// with the shared outcome.
fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let written = batch
        .iter()
        .try_for_each(|(record, _)| wal.append_buffered(record));
    // Flush after a failed write too, so no bytes of this batch stay buffered.
    let flushed = wal.flush_sync();
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    let outcome = written.and(flushed);
    for (_, ack) in batch {
        let reply = match &outcome {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = ack.send(reply);
    }
}

fn run_command(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Append { record, response } => commit_batch(wal, vec![(record, response)]),
        WalCommand::Compact { records, response } => {
            let result = Wal::write_compact_file(wal.path(), &records)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
    }
}

/// The relational store: tables in memory, every committed transaction in the WAL.
///
/// Transactions are serializable: `begin` takes the exclusive write guard and
/// holds it until commit or rollback.
pub struct Database {
    tables: Arc<Mutex<Tables>>,
    wal_tx: mpsc::Sender<WalCommand>,
    replayed: usize,
}

impl Database {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        Self::open_with_queue(wal_path, DEFAULT_WAL_QUEUE)
    }

    pub fn open_with_queue(wal_path: PathBuf, queue: usize) -> io::Result<Self> {
        let records = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(queue.max(1));
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut tables = Tables::new();
        for record in &records {
            for event in record {
                tables.apply(event);
            }
        }
        debug!("replayed {} WAL records from {}", records.len(), wal_path.display());

        Ok(Self {
            tables: Arc::new(Mutex::new(tables)),
            wal_tx,
            replayed: records.len(),
        })
    }

    /// Begin a transaction. Waits for any in-flight transaction to finish.
    pub async fn begin(&self) -> Transaction {
        Transaction {
            tables: self.tables.clone().lock_owned().await,
            wal_tx: self.wal_tx.clone(),
            pending: Vec::new(),
            undo: Vec::new(),
        }
    }

    /// Run a read against a consistent view of all tables.
    pub async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let guard = self.tables.lock().await;
        f(&guard)
    }

    pub async fn counts(&self) -> TableCounts {
        self.read(Tables::counts).await
    }

    /// Rewrite the WAL with only the records needed to recreate the current state.
    pub async fn compact(&self) -> Result<(), DbError> {
        // Holding the guard keeps commits out until the swap is done.
        let guard = self.tables.lock().await;
        let records = guard.snapshot_records();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { records, response: tx })
            .await
            .map_err(|_| DbError::Wal("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| DbError::Wal("WAL writer dropped response".into()))?;
        drop(guard);
        result.map_err(DbError::from)
    }

    /// WAL records found on disk at open.
    pub fn replayed_records(&self) -> usize {
        self.replayed
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// An open transaction.
///
/// Writes apply immediately to the guarded tables, so later reads in the same
/// transaction see them. `commit` makes them durable as one WAL record;
/// dropping the transaction uncommitted restores every touched row before the
/// guard is released.
pub struct Transaction {
    tables: OwnedMutexGuard<Tables>,
    wal_tx: mpsc::Sender<WalCommand>,
    pending: Vec<Event>,
    undo: Vec<Undo>,
}

impl Transaction {
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    fn write(&mut self, event: Event) {
        let undo = self.tables.apply(&event);
        self.undo.extend(undo);
        self.pending.push(event);
    }

    pub fn save_store(&mut self, row: Store) {
        self.write(Event::StoreSaved(row));
    }

    pub fn save_stylist(&mut self, row: Stylist) {
        self.write(Event::StylistSaved(row));
    }

    pub fn save_customer(&mut self, row: Customer) {
        self.write(Event::CustomerSaved(row));
    }

    pub fn save_service(&mut self, row: Service) {
        self.write(Event::ServiceSaved(row));
    }

    /// Batch insert, chunked to `BATCH_INSERT_CHUNK` rows per statement.
    pub fn insert_schedules(&mut self, rows: &[Schedule]) {
        for chunk in rows.chunks(BATCH_INSERT_CHUNK) {
            self.write(Event::SchedulesInserted(chunk.to_vec()));
        }
    }

    pub fn update_schedule(&mut self, row: Schedule) {
        self.write(Event::ScheduleUpdated(row));
    }

    pub fn delete_schedule(&mut self, id: Ulid) {
        self.write(Event::ScheduleDeleted { id });
    }

    /// Batch insert, chunked to `BATCH_INSERT_CHUNK` rows per statement.
    pub fn insert_time_slots(&mut self, rows: &[TimeSlot]) {
        for chunk in rows.chunks(BATCH_INSERT_CHUNK) {
            self.write(Event::TimeSlotsInserted(chunk.to_vec()));
        }
    }

    pub fn update_time_slot(&mut self, row: TimeSlot) {
        self.write(Event::TimeSlotUpdated(row));
    }

    pub fn delete_time_slot(&mut self, id: Ulid) {
        self.write(Event::TimeSlotDeleted { id });
    }

    /// `UPDATE time_slots SET is_available = $new WHERE id = $id AND is_available = $expected`.
    /// Returns the number of rows affected.
    pub fn set_slot_availability(&mut self, id: Ulid, expected: bool, new: bool) -> usize {
        match self.tables.time_slot(&id) {
            Some(slot) if slot.is_available == expected => {
                self.write(Event::SlotAvailabilityChanged { id, is_available: new });
                1
            }
            _ => 0,
        }
    }

    pub fn insert_booking(&mut self, row: Booking) {
        self.write(Event::BookingInserted(row));
    }

    pub fn update_booking(&mut self, row: Booking) {
        self.write(Event::BookingUpdated(row));
    }

    /// Delete all line items of a booking and insert `details` in their place.
    pub fn replace_booking_details(&mut self, booking_id: Ulid, details: Vec<BookingDetail>) {
        self.write(Event::BookingDetailsReplaced { booking_id, details });
    }

    /// Make the transaction durable. On error every write is rolled back.
    pub async fn commit(mut self) -> Result<(), DbError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let record = std::mem::take(&mut self.pending);
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { record, response: tx })
            .await
            .map_err(|_| DbError::Wal("WAL writer shut down".into()))?;

        // The record is queued. Settle it on a separate task so the guard is
        // held until the writer answers even if the caller is cancelled.
        let mut txn = self;
        let settle = tokio::spawn(async move {
            let result = match rx.await {
                Ok(r) => r.map_err(DbError::from),
                Err(_) => Err(DbError::Wal("WAL writer dropped response".into())),
            };
            if result.is_ok() {
                txn.undo.clear();
            }
            drop(txn);
            result
        });
        settle
            .await
            .map_err(|e| DbError::Wal(format!("commit task failed: {e}")))?
    }

    /// Discard every write of this transaction.
    pub fn rollback(self) {}
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        debug!("rolling back transaction ({} row images)", self.undo.len());
        while let Some(undo) = self.undo.pop() {
            self.tables.revert(undo);
        }
    }
}
