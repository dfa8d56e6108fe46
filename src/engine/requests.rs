use serde::Deserialize;
use ulid::Ulid;

use crate::model::{BookingStatus, Minutes, Update};

use super::EngineError;

// ── Schedules ────────────────────────────────────────────────────

/// `"HH:MM"` bounds of one bookable window.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeWindowInput {
    pub start: String,
    pub end: String,
}

impl TimeWindowInput {
    pub fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleDayInput {
    /// `"YYYY-MM-DD"`
    pub work_date: String,
    pub time_slots: Vec<TimeWindowInput>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateSchedulesRequest {
    pub store_id: Ulid,
    pub stylist_id: Ulid,
    pub days: Vec<ScheduleDayInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeleteSchedulesRequest {
    pub store_id: Ulid,
    pub schedule_ids: Vec<Ulid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScheduleUpdate {
    #[serde(default)]
    pub work_date: Update<String>,
    #[serde(default)]
    pub note: Update<Option<String>>,
}

impl ScheduleUpdate {
    pub fn has_updates(&self) -> bool {
        self.work_date.is_set() || self.note.is_set()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TimeSlotUpdate {
    #[serde(default)]
    pub start: Update<String>,
    #[serde(default)]
    pub end: Update<String>,
}

impl TimeSlotUpdate {
    pub fn has_updates(&self) -> bool {
        self.start.is_set() || self.end.is_set()
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateBookingRequest {
    pub store_id: Ulid,
    pub customer_id: Ulid,
    pub time_slot_id: Ulid,
    pub main_service_id: Ulid,
    #[serde(default)]
    pub sub_service_ids: Vec<Ulid>,
    #[serde(default)]
    pub chat_enabled: bool,
    #[serde(default)]
    pub note: Option<String>,
}

/// New slot and the full service set that must come with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotChange {
    pub time_slot_id: Ulid,
    pub main_service_id: Ulid,
    pub sub_service_ids: Vec<Ulid>,
}

/// Validated change set shared by the customer and staff update paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingChanges {
    pub slot: Option<SlotChange>,
    pub chat_enabled: Update<bool>,
    pub note: Update<Option<String>>,
}

/// Slot, main service and sub-services change together or not at all.
fn slot_group(
    time_slot_id: &Update<Ulid>,
    main_service_id: &Update<Ulid>,
    sub_service_ids: &Update<Vec<Ulid>>,
) -> Result<Option<SlotChange>, EngineError> {
    match (time_slot_id, main_service_id, sub_service_ids) {
        (Update::Keep, Update::Keep, Update::Keep) => Ok(None),
        (Update::Set(slot), Update::Set(main), Update::Set(subs)) => Ok(Some(SlotChange {
            time_slot_id: *slot,
            main_service_id: *main,
            sub_service_ids: subs.clone(),
        })),
        _ => Err(EngineError::validation(
            "time slot, main service and sub-services must be updated together",
        )),
    }
}

/// Customer-side booking change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookingUpdate {
    #[serde(default)]
    pub time_slot_id: Update<Ulid>,
    #[serde(default)]
    pub main_service_id: Update<Ulid>,
    #[serde(default)]
    pub sub_service_ids: Update<Vec<Ulid>>,
    #[serde(default)]
    pub chat_enabled: Update<bool>,
    #[serde(default)]
    pub note: Update<Option<String>>,
}

impl BookingUpdate {
    pub fn has_updates(&self) -> bool {
        self.time_slot_id.is_set()
            || self.main_service_id.is_set()
            || self.sub_service_ids.is_set()
            || self.chat_enabled.is_set()
            || self.note.is_set()
    }

    pub fn is_time_slot_update_complete(&self) -> bool {
        slot_group(&self.time_slot_id, &self.main_service_id, &self.sub_service_ids).is_ok()
    }

    pub fn validate(self) -> Result<BookingChanges, EngineError> {
        if !self.has_updates() {
            return Err(EngineError::validation("no fields to update"));
        }
        Ok(BookingChanges {
            slot: slot_group(&self.time_slot_id, &self.main_service_id, &self.sub_service_ids)?,
            chat_enabled: self.chat_enabled,
            note: self.note,
        })
    }
}

/// Staff-side booking change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StaffBookingUpdate {
    #[serde(default)]
    pub time_slot_id: Update<Ulid>,
    #[serde(default)]
    pub service_id: Update<Ulid>,
    #[serde(default)]
    pub addon_service_ids: Update<Vec<Ulid>>,
    #[serde(default)]
    pub chat_enabled: Update<bool>,
    #[serde(default)]
    pub note: Update<Option<String>>,
}

impl StaffBookingUpdate {
    pub fn has_updates(&self) -> bool {
        self.time_slot_id.is_set()
            || self.service_id.is_set()
            || self.addon_service_ids.is_set()
            || self.chat_enabled.is_set()
            || self.note.is_set()
    }

    pub fn is_time_slot_update_complete(&self) -> bool {
        slot_group(&self.time_slot_id, &self.service_id, &self.addon_service_ids).is_ok()
    }

    pub fn validate(self) -> Result<BookingChanges, EngineError> {
        if !self.has_updates() {
            return Err(EngineError::validation("no fields to update"));
        }
        Ok(BookingChanges {
            slot: slot_group(&self.time_slot_id, &self.service_id, &self.addon_service_ids)?,
            chat_enabled: self.chat_enabled,
            note: self.note,
        })
    }
}

/// Terminal status a scheduled booking can be cancelled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelTarget {
    Cancelled,
    NoShow,
}

impl From<CancelTarget> for BookingStatus {
    fn from(t: CancelTarget) -> Self {
        match t {
            CancelTarget::Cancelled => BookingStatus::Cancelled,
            CancelTarget::NoShow => BookingStatus::NoShow,
        }
    }
}

/// Post-completion metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompletionUpdate {
    #[serde(default)]
    pub actual_duration_minutes: Update<Option<Minutes>>,
    #[serde(default)]
    pub extras: Update<Option<String>>,
}

impl CompletionUpdate {
    pub fn has_updates(&self) -> bool {
        self.actual_duration_minutes.is_set() || self.extras.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ErrorKind;

    #[test]
    fn empty_update_rejected() {
        let err = BookingUpdate::default().validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn partial_slot_group_rejected() {
        let update = BookingUpdate {
            time_slot_id: Update::Set(Ulid::new()),
            main_service_id: Update::Set(Ulid::new()),
            ..Default::default()
        };
        assert!(!update.is_time_slot_update_complete());
        assert_eq!(update.validate().unwrap_err().kind(), ErrorKind::Validation);

        let staff = StaffBookingUpdate {
            addon_service_ids: Update::Set(vec![]),
            ..Default::default()
        };
        assert!(!staff.is_time_slot_update_complete());
        assert!(staff.validate().is_err());
    }

    #[test]
    fn scalar_only_update_has_no_slot_change() {
        let changes = BookingUpdate {
            note: Update::Set(Some("running late".into())),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(changes.slot.is_none());
        assert!(changes.chat_enabled.is_keep());
    }

    #[test]
    fn staff_update_from_json() {
        let slot = Ulid::new();
        let main = Ulid::new();
        let json = format!(
            r#"{{"time_slot_id":"{slot}","service_id":"{main}","addon_service_ids":[],"chat_enabled":false}}"#
        );
        let update: StaffBookingUpdate = serde_json::from_str(&json).unwrap();
        let changes = update.validate().unwrap();
        assert_eq!(
            changes.slot,
            Some(SlotChange {
                time_slot_id: slot,
                main_service_id: main,
                sub_service_ids: vec![],
            })
        );
        assert_eq!(changes.chat_enabled, Update::Set(false));
        assert!(changes.note.is_keep());
    }
}
