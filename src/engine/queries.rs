use std::collections::HashMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::access::Caller;
use crate::db::Tables;
use crate::model::*;

use super::{Engine, EngineError, Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePredicate {
    Store(Ulid),
    Stylist(Ulid),
    /// Inclusive.
    From(NaiveDate),
    /// Inclusive.
    To(NaiveDate),
}

/// Conjunction of schedule predicates. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleFilter {
    predicates: Vec<SchedulePredicate>,
}

impl ScheduleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the optional keys of a listing request.
    pub fn from_keys(
        store_id: Option<Ulid>,
        stylist_id: Option<Ulid>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Self {
        let predicates = [
            store_id.map(SchedulePredicate::Store),
            stylist_id.map(SchedulePredicate::Stylist),
            from.map(SchedulePredicate::From),
            to.map(SchedulePredicate::To),
        ]
        .into_iter()
        .flatten()
        .collect();
        Self { predicates }
    }

    pub fn with(mut self, p: SchedulePredicate) -> Self {
        self.predicates.push(p);
        self
    }

    pub fn predicates(&self) -> &[SchedulePredicate] {
        &self.predicates
    }

    pub fn matches(&self, s: &Schedule) -> bool {
        self.predicates.iter().all(|p| match *p {
            SchedulePredicate::Store(id) => s.store_id == id,
            SchedulePredicate::Stylist(id) => s.stylist_id == id,
            SchedulePredicate::From(d) => s.work_date >= d,
            SchedulePredicate::To(d) => s.work_date <= d,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingPredicate {
    Store(Ulid),
    Customer(Ulid),
    Stylist(Ulid),
    Status(BookingStatus),
    /// Work date of the booked slot.
    On(NaiveDate),
}

/// Conjunction of booking predicates. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    predicates: Vec<BookingPredicate>,
}

impl BookingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(
        store_id: Option<Ulid>,
        customer_id: Option<Ulid>,
        stylist_id: Option<Ulid>,
        status: Option<BookingStatus>,
        work_date: Option<NaiveDate>,
    ) -> Self {
        let predicates = [
            store_id.map(BookingPredicate::Store),
            customer_id.map(BookingPredicate::Customer),
            stylist_id.map(BookingPredicate::Stylist),
            status.map(BookingPredicate::Status),
            work_date.map(BookingPredicate::On),
        ]
        .into_iter()
        .flatten()
        .collect();
        Self { predicates }
    }

    pub fn with(mut self, p: BookingPredicate) -> Self {
        self.predicates.push(p);
        self
    }

    pub fn predicates(&self) -> &[BookingPredicate] {
        &self.predicates
    }

    pub fn matches(&self, tables: &Tables, b: &Booking) -> bool {
        self.predicates.iter().all(|p| match *p {
            BookingPredicate::Store(id) => b.store_id == id,
            BookingPredicate::Customer(id) => b.customer_id == id,
            BookingPredicate::Stylist(id) => b.stylist_id == id,
            BookingPredicate::Status(st) => b.status == st,
            BookingPredicate::On(d) => slot_date(tables, &b.time_slot_id) == Some(d),
        })
    }
}

fn slot_date(tables: &Tables, slot_id: &Ulid) -> Option<NaiveDate> {
    let slot = tables.time_slot(slot_id)?;
    tables.schedule(&slot.schedule_id).map(|s| s.work_date)
}

pub(crate) fn schedule_info(tables: &Tables, s: &Schedule) -> ScheduleInfo {
    ScheduleInfo {
        id: s.id,
        store_id: s.store_id,
        stylist_id: s.stylist_id,
        work_date: s.work_date,
        note: s.note.clone(),
        time_slots: tables.slots_of(&s.id).into_iter().cloned().collect(),
    }
}

/// Join a booking with its store, people, slot and captured line items.
pub(crate) fn booking_view(tables: &Tables, b: &Booking) -> Result<BookingView, EngineError> {
    let dangling = |what: &str, id: Ulid| {
        EngineError::System(format!("booking {} references missing {what} {id}", b.id))
    };
    let store = tables
        .store(&b.store_id)
        .ok_or_else(|| dangling("store", b.store_id))?;
    let customer = tables
        .customer(&b.customer_id)
        .ok_or_else(|| dangling("customer", b.customer_id))?;
    let stylist = tables
        .stylist(&b.stylist_id)
        .ok_or_else(|| dangling("stylist", b.stylist_id))?;

    let slot = tables.time_slot(&b.time_slot_id);
    let work_date = slot
        .and_then(|s| tables.schedule(&s.schedule_id))
        .map(|s| s.work_date);

    let mut services = Vec::new();
    for d in tables.booking_details(&b.id) {
        let svc = tables
            .service(&d.service_id)
            .ok_or_else(|| dangling("service", d.service_id))?;
        services.push(ServiceLine {
            service_id: d.service_id,
            name: svc.name.clone(),
            price: d.price,
            duration_minutes: svc.duration_minutes,
            is_addon: d.is_addon,
        });
    }
    // Main service first, add-ons keep their stored order.
    services.sort_by_key(|l| l.is_addon);

    Ok(BookingView {
        id: b.id,
        status: b.status,
        store_id: store.id,
        store_name: store.name.clone(),
        customer_id: customer.id,
        customer_name: customer.name.clone(),
        stylist_id: stylist.id,
        stylist_name: stylist.name.clone(),
        time_slot_id: b.time_slot_id,
        work_date,
        window: slot.map(|s| s.window),
        chat_enabled: b.chat_enabled,
        note: b.note.clone(),
        cancel_reason: b.cancel_reason.clone(),
        actual_duration_minutes: b.actual_duration_minutes,
        extras: b.extras.clone(),
        total_price: services.iter().map(|l| l.price).sum(),
        total_duration_minutes: services.iter().map(|l| l.duration_minutes).sum(),
        services,
    })
}

impl Engine {
    /// Schedules with nested time slots, ordered by date then first slot start.
    pub async fn list_schedules(&self, filter: &ScheduleFilter) -> Vec<ScheduleInfo> {
        let mut out: Vec<ScheduleInfo> = self
            .db
            .read(|t| {
                t.schedules()
                    .filter(|s| filter.matches(s))
                    .map(|s| schedule_info(t, s))
                    .collect()
            })
            .await;
        out.sort_by_key(|s| (s.work_date, s.time_slots.first().map(|t| t.window.start), s.id));
        out
    }

    pub async fn get_schedule(&self, id: Ulid) -> Result<ScheduleInfo, EngineError> {
        self.db
            .read(|t| t.schedule(&id).map(|s| schedule_info(t, s)))
            .await
            .ok_or(EngineError::not_found(Entity::Schedule, id))
    }

    /// Bookings matching `filter` that the caller may see. Customers only ever
    /// see their own; staff see stores on their access list.
    pub async fn list_bookings(
        &self,
        caller: &Caller,
        filter: &BookingFilter,
    ) -> Result<Vec<BookingView>, EngineError> {
        let filter = match caller {
            Caller::Customer { id } => filter.clone().with(BookingPredicate::Customer(*id)),
            Caller::Staff { .. } => filter.clone(),
        };
        let mut views = self
            .db
            .read(|t| {
                t.bookings()
                    .filter(|b| filter.matches(t, b))
                    .map(|b| booking_view(t, b))
                    .collect::<Result<Vec<_>, _>>()
            })
            .await?;

        if caller.is_staff() {
            let mut allowed: HashMap<Ulid, bool> = HashMap::new();
            for v in &views {
                if !allowed.contains_key(&v.store_id) {
                    let ok = self.caps.can_act_on_store(caller, v.store_id).await;
                    allowed.insert(v.store_id, ok);
                }
            }
            views.retain(|v| allowed.get(&v.store_id).copied().unwrap_or(false));
        }

        views.sort_by_key(|v| (v.work_date, v.window.map(|w| w.start), v.id));
        Ok(views)
    }

    pub async fn get_booking(&self, caller: &Caller, id: Ulid) -> Result<BookingView, EngineError> {
        let (booking, view) = self
            .db
            .read(|t| -> Result<_, EngineError> {
                let b = t
                    .booking(&id)
                    .ok_or(EngineError::not_found(Entity::Booking, id))?;
                Ok((b.clone(), booking_view(t, b)?))
            })
            .await?;
        if !self.caps.can_act_on_booking(caller, &booking).await {
            return Err(EngineError::denied(format!("booking {id} is not visible")));
        }
        Ok(view)
    }

    /// Bookable slots on `date` at an active store, optionally for one stylist
    /// and at least `min_duration` minutes long. Ordered by start.
    pub async fn available_slots(
        &self,
        store_id: Ulid,
        date: NaiveDate,
        stylist_id: Option<Ulid>,
        min_duration: Option<Minutes>,
    ) -> Result<Vec<AvailableSlot>, EngineError> {
        self.db
            .read(|t| -> Result<Vec<AvailableSlot>, EngineError> {
                let store = t
                    .store(&store_id)
                    .ok_or(EngineError::not_found(Entity::Store, store_id))?;
                if !store.is_active {
                    return Ok(vec![]);
                }
                let mut out = Vec::new();
                let schedules = t
                    .schedules()
                    .filter(|s| s.store_id == store_id && s.work_date == date)
                    .filter(|s| stylist_id.is_none_or(|id| s.stylist_id == id));
                for s in schedules {
                    let stylist_name = t
                        .stylist(&s.stylist_id)
                        .map(|st| st.name.clone())
                        .unwrap_or_default();
                    for slot in t.slots_of(&s.id) {
                        if !slot.is_available {
                            continue;
                        }
                        if min_duration.is_some_and(|m| slot.window.duration_minutes() < m) {
                            continue;
                        }
                        out.push(AvailableSlot {
                            time_slot_id: slot.id,
                            schedule_id: s.id,
                            stylist_id: s.stylist_id,
                            stylist_name: stylist_name.clone(),
                            work_date: s.work_date,
                            window: slot.window,
                        });
                    }
                }
                out.sort_by(|a, b| {
                    a.window
                        .start
                        .cmp(&b.window.start)
                        .then_with(|| a.stylist_name.cmp(&b.stylist_name))
                });
                Ok(out)
            })
            .await
    }
}
