use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Whole minutes, the only duration unit.
pub type Minutes = u32;

/// Money in minor units.
pub type Cents = i64;

/// Half-open time-of-day window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Window {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    /// Returns `None` unless `start < end`.
    pub fn try_new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> Minutes {
        (self.end - self.start).num_minutes().max(0) as Minutes
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Catalog rows (owned by external CRUD, read by the core) ─────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: Ulid,
    pub name: String,
    pub is_active: bool,
}

/// A stylist is a staff member; `id` is their staff id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stylist {
    pub id: Ulid,
    pub store_id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    pub duration_minutes: Minutes,
    pub price: Cents,
    pub is_addon: bool,
    pub is_active: bool,
}

// ── Scheduling rows ──────────────────────────────────────────────

/// One stylist's working day at one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Ulid,
    pub store_id: Ulid,
    pub stylist_id: Ulid,
    pub work_date: NaiveDate,
    pub note: Option<String>,
}

/// A bookable window owned by exactly one schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Ulid,
    pub schedule_id: Ulid,
    pub window: Window,
    pub is_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Scheduled,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "SCHEDULED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::NoShow => "NO_SHOW",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub store_id: Ulid,
    pub customer_id: Ulid,
    pub stylist_id: Ulid,
    pub time_slot_id: Ulid,
    pub chat_enabled: bool,
    pub note: Option<String>,
    pub status: BookingStatus,
    pub cancel_reason: Option<String>,
    pub actual_duration_minutes: Option<Minutes>,
    pub extras: Option<String>,
}

/// Line item with the service price captured at booking time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetail {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub service_id: Ulid,
    pub price: Cents,
    pub is_addon: bool,
}

// ── Partial updates ──────────────────────────────────────────────

/// Tagged field update: either leave the attribute alone or set it.
///
/// Deserializes from a present field as `Set`; pair with `#[serde(default)]`
/// so an absent field becomes `Keep`. For nullable attributes use
/// `Update<Option<T>>`, where `null` means `Set(None)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<T> {
    Keep,
    Set(T),
}

impl<T> Default for Update<T> {
    fn default() -> Self {
        Update::Keep
    }
}

impl<T> Update<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Update::Keep)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Update::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Update::Keep => None,
            Update::Set(v) => Some(v),
        }
    }

    pub fn into_set(self) -> Option<T> {
        match self {
            Update::Keep => None,
            Update::Set(v) => Some(v),
        }
    }

    /// Overwrite `target` if this update carries a value.
    pub fn apply_to(self, target: &mut T) {
        if let Update::Set(v) = self {
            *target = v;
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Update<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Update::Set)
    }
}

impl<T: Serialize> Serialize for Update<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Update::Keep => serializer.serialize_none(),
            Update::Set(v) => v.serialize(serializer),
        }
    }
}

/// Row mutations — flat, no nesting. One WAL record holds the events of one
/// committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    StoreSaved(Store),
    StylistSaved(Stylist),
    CustomerSaved(Customer),
    ServiceSaved(Service),
    SchedulesInserted(Vec<Schedule>),
    ScheduleUpdated(Schedule),
    ScheduleDeleted { id: Ulid },
    TimeSlotsInserted(Vec<TimeSlot>),
    TimeSlotUpdated(TimeSlot),
    TimeSlotDeleted { id: Ulid },
    SlotAvailabilityChanged { id: Ulid, is_available: bool },
    BookingInserted(Booking),
    BookingUpdated(Booking),
    BookingDetailsReplaced {
        booking_id: Ulid,
        details: Vec<BookingDetail>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleInfo {
    pub id: Ulid,
    pub store_id: Ulid,
    pub stylist_id: Ulid,
    pub work_date: NaiveDate,
    pub note: Option<String>,
    /// Sorted by start.
    pub time_slots: Vec<TimeSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceLine {
    pub service_id: Ulid,
    pub name: String,
    pub price: Cents,
    pub duration_minutes: Minutes,
    pub is_addon: bool,
}

/// Booking assembled for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    pub id: Ulid,
    pub status: BookingStatus,
    pub store_id: Ulid,
    pub store_name: String,
    pub customer_id: Ulid,
    pub customer_name: String,
    pub stylist_id: Ulid,
    pub stylist_name: String,
    pub time_slot_id: Ulid,
    /// `None` once a released slot has been deleted.
    pub work_date: Option<NaiveDate>,
    pub window: Option<Window>,
    pub chat_enabled: bool,
    pub note: Option<String>,
    pub cancel_reason: Option<String>,
    pub actual_duration_minutes: Option<Minutes>,
    pub extras: Option<String>,
    /// Main service first, then add-ons.
    pub services: Vec<ServiceLine>,
    pub total_price: Cents,
    pub total_duration_minutes: Minutes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableSlot {
    pub time_slot_id: Ulid,
    pub schedule_id: Ulid,
    pub stylist_id: Ulid,
    pub stylist_name: String,
    pub work_date: NaiveDate,
    pub window: Window,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_basics() {
        let w = Window::new(t(9, 0), t(9, 30));
        assert_eq!(w.duration_minutes(), 30);
        assert!(Window::try_new(t(10, 0), t(10, 0)).is_none());
        assert!(Window::try_new(t(10, 0), t(9, 0)).is_none());
    }

    #[test]
    fn window_overlap() {
        let a = Window::new(t(9, 0), t(9, 30));
        let b = Window::new(t(9, 15), t(9, 45));
        let c = Window::new(t(9, 30), t(10, 0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default)]
        note: Update<Option<String>>,
        #[serde(default)]
        chat_enabled: Update<bool>,
    }

    #[test]
    fn update_from_json_distinguishes_absent_and_null() {
        let p: Patch = serde_json::from_str(r#"{"note": null}"#).unwrap();
        assert_eq!(p.note, Update::Set(None));
        assert!(p.chat_enabled.is_keep());

        let p: Patch = serde_json::from_str(r#"{"chat_enabled": true}"#).unwrap();
        assert!(p.note.is_keep());
        assert_eq!(p.chat_enabled, Update::Set(true));
    }

    #[test]
    fn update_apply_to() {
        let mut v = 1;
        Update::Keep.apply_to(&mut v);
        assert_eq!(v, 1);
        Update::Set(7).apply_to(&mut v);
        assert_eq!(v, 7);
    }

    #[test]
    fn status_labels() {
        assert_eq!(BookingStatus::NoShow.to_string(), "NO_SHOW");
        let s: BookingStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(s, BookingStatus::Cancelled);
    }
}
