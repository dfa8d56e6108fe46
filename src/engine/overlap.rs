use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::*;

use super::requests::TimeWindowInput;
use super::{ConflictReason, EngineError};

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::validation(format!("invalid date {s:?}, expected YYYY-MM-DD")))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub(crate) fn parse_time(s: &str) -> Result<NaiveTime, EngineError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| EngineError::validation(format!("invalid time {s:?}, expected HH:MM")))
}

pub(crate) fn parse_window(input: &TimeWindowInput) -> Result<Window, EngineError> {
    let start = parse_time(&input.start)?;
    let end = parse_time(&input.end)?;
    Window::try_new(start, end).ok_or_else(|| {
        EngineError::validation(format!(
            "time slot end {} must be after start {}",
            input.end, input.start
        ))
    })
}

fn label(w: &Window) -> String {
    format!("{}-{}", w.start.format("%H:%M"), w.end.format("%H:%M"))
}

/// Sort windows by start and reject any pair that overlaps.
/// After sorting, checking each window against its successor is enough.
pub(crate) fn sort_and_check_disjoint(windows: &mut [Window]) -> Result<(), EngineError> {
    windows.sort_by_key(|w| w.start);
    for pair in windows.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(ConflictReason::TimeSlotOverlap(label(&pair[1])).into());
        }
    }
    Ok(())
}

/// Reject `candidate` if it overlaps any sibling slot other than `exclude`.
pub(crate) fn check_against_siblings(
    siblings: &[&TimeSlot],
    candidate: &Window,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let clash = siblings
        .iter()
        .filter(|s| Some(s.id) != exclude)
        .any(|s| s.window.overlaps(candidate));
    if clash {
        return Err(ConflictReason::TimeSlotOverlap(label(candidate)).into());
    }
    Ok(())
}

pub(crate) fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max => Err(EngineError::validation(format!(
            "{field} longer than {max} bytes"
        ))),
        _ => Ok(()),
    }
}
