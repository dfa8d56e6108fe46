mod bookings;
mod catalog;
mod error;
mod overlap;
mod queries;
pub mod requests;
mod schedules;
pub mod services;
pub mod slots;

pub use error::{ConflictReason, EngineError, Entity, ErrorKind, ServiceError};
pub use queries::{BookingFilter, BookingPredicate, ScheduleFilter, SchedulePredicate};
pub use requests::*;
pub use services::ResolvedServices;

use std::sync::Arc;
use std::time::Instant;

use crate::access::{AccessGuard, Capabilities, Caller};
use crate::db::Database;
use crate::ids::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// The booking and schedule core. Every operation runs on the caller's task;
/// mutual exclusion comes from the database transaction, not from locks here.
pub struct Engine {
    db: Arc<Database>,
    caps: Capabilities,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(db: Arc<Database>, guard: Arc<dyn AccessGuard>) -> Self {
        Self {
            db,
            caps: Capabilities::new(guard),
            ids: Arc::new(UlidGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn next_id(&self) -> ulid::Ulid {
        self.ids.next_id()
    }

    async fn require_store_access(&self, caller: &Caller, store_id: ulid::Ulid) -> Result<(), EngineError> {
        if self.caps.can_act_on_store(caller, store_id).await {
            Ok(())
        } else {
            Err(EngineError::denied(format!("no access to store {store_id}")))
        }
    }
}

/// Record outcome and latency of one core operation.
pub(crate) fn observe<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => crate::observability::kind_label(e.kind()),
    };
    metrics::counter!(crate::observability::OPERATIONS_TOTAL, "op" => op, "status" => status)
        .increment(1);
    metrics::histogram!(crate::observability::OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
