//! Time-slot store primitives. Both run inside the caller's transaction and
//! are never committed on their own.

use tracing::warn;
use ulid::Ulid;

use crate::db::Transaction;

use super::{ConflictReason, EngineError};

/// Flip a slot from available to reserved. Zero rows affected means another
/// transaction got there first (or the slot was removed).
pub fn reserve(tx: &mut Transaction, slot_id: Ulid) -> Result<(), EngineError> {
    if tx.set_slot_availability(slot_id, true, false) == 1 {
        return Ok(());
    }
    warn!("reserve lost on time slot {slot_id}");
    metrics::counter!(crate::observability::SLOT_CONFLICTS_TOTAL).increment(1);
    Err(ConflictReason::TimeSlotUnavailable(slot_id).into())
}

/// Flip a slot back to available.
pub fn release(tx: &mut Transaction, slot_id: Ulid) -> Result<(), EngineError> {
    if tx.set_slot_availability(slot_id, false, true) == 1 {
        return Ok(());
    }
    // A held booking whose slot is already free means the tables disagree.
    Err(EngineError::System(format!(
        "time slot {slot_id} was not reserved at release"
    )))
}
