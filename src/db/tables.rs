use std::collections::HashMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::BATCH_INSERT_CHUNK;
use crate::model::*;

/// Previous row image, restored when a transaction rolls back.
#[derive(Debug)]
pub(super) enum Undo {
    Store(Ulid, Option<Store>),
    Stylist(Ulid, Option<Stylist>),
    Customer(Ulid, Option<Customer>),
    Service(Ulid, Option<Service>),
    Schedule(Ulid, Option<Schedule>),
    TimeSlot(Ulid, Option<TimeSlot>),
    Booking(Ulid, Option<Booking>),
    Details(Ulid, Vec<BookingDetail>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub stores: usize,
    pub stylists: usize,
    pub customers: usize,
    pub services: usize,
    pub schedules: usize,
    pub time_slots: usize,
    pub bookings: usize,
    pub booking_details: usize,
}

/// In-memory relational tables plus the secondary indexes the core queries by.
#[derive(Debug, Default)]
pub struct Tables {
    stores: HashMap<Ulid, Store>,
    stylists: HashMap<Ulid, Stylist>,
    customers: HashMap<Ulid, Customer>,
    services: HashMap<Ulid, Service>,
    schedules: HashMap<Ulid, Schedule>,
    time_slots: HashMap<Ulid, TimeSlot>,
    bookings: HashMap<Ulid, Booking>,
    booking_details: HashMap<Ulid, Vec<BookingDetail>>,
    /// schedule id → its time slot ids
    slots_by_schedule: HashMap<Ulid, Vec<Ulid>>,
    /// (store, stylist, work_date) → schedule id; enforces one schedule per day
    schedule_by_day: HashMap<(Ulid, Ulid, NaiveDate), Ulid>,
    /// time slot id → bookings that ever referenced it
    bookings_by_slot: HashMap<Ulid, Vec<Ulid>>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Reads ────────────────────────────────────────────────

    pub fn store(&self, id: &Ulid) -> Option<&Store> {
        self.stores.get(id)
    }

    pub fn stylist(&self, id: &Ulid) -> Option<&Stylist> {
        self.stylists.get(id)
    }

    pub fn customer(&self, id: &Ulid) -> Option<&Customer> {
        self.customers.get(id)
    }

    pub fn service(&self, id: &Ulid) -> Option<&Service> {
        self.services.get(id)
    }

    pub fn schedule(&self, id: &Ulid) -> Option<&Schedule> {
        self.schedules.get(id)
    }

    pub fn schedules(&self) -> impl Iterator<Item = &Schedule> {
        self.schedules.values()
    }

    pub fn schedule_for_day(
        &self,
        store_id: Ulid,
        stylist_id: Ulid,
        work_date: NaiveDate,
    ) -> Option<&Schedule> {
        self.schedule_by_day
            .get(&(store_id, stylist_id, work_date))
            .and_then(|id| self.schedules.get(id))
    }

    pub fn time_slot(&self, id: &Ulid) -> Option<&TimeSlot> {
        self.time_slots.get(id)
    }

    /// Time slots of a schedule, sorted by start.
    pub fn slots_of(&self, schedule_id: &Ulid) -> Vec<&TimeSlot> {
        let mut slots: Vec<&TimeSlot> = self
            .slots_by_schedule
            .get(schedule_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.time_slots.get(id))
            .collect();
        slots.sort_by_key(|s| s.window.start);
        slots
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.get(id)
    }

    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.values()
    }

    pub fn bookings_for_slot(&self, slot_id: &Ulid) -> impl Iterator<Item = &Booking> {
        self.bookings_by_slot
            .get(slot_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bookings.get(id))
    }

    pub fn booking_details(&self, booking_id: &Ulid) -> &[BookingDetail] {
        self.booking_details
            .get(booking_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn counts(&self) -> TableCounts {
        TableCounts {
            stores: self.stores.len(),
            stylists: self.stylists.len(),
            customers: self.customers.len(),
            services: self.services.len(),
            schedules: self.schedules.len(),
            time_slots: self.time_slots.len(),
            bookings: self.bookings.len(),
            booking_details: self.booking_details.values().map(Vec::len).sum(),
        }
    }

    // ── Row writes (index maintenance lives here) ────────────

    fn put_schedule(&mut self, id: Ulid, row: Option<Schedule>) -> Option<Schedule> {
        let prev = self.schedules.remove(&id);
        if let Some(p) = &prev {
            self.schedule_by_day
                .remove(&(p.store_id, p.stylist_id, p.work_date));
        }
        if let Some(s) = row {
            self.schedule_by_day
                .insert((s.store_id, s.stylist_id, s.work_date), id);
            self.schedules.insert(id, s);
        }
        prev
    }

    fn put_time_slot(&mut self, id: Ulid, row: Option<TimeSlot>) -> Option<TimeSlot> {
        let prev = self.time_slots.remove(&id);
        if let Some(p) = &prev
            && let Some(ids) = self.slots_by_schedule.get_mut(&p.schedule_id)
        {
            ids.retain(|s| s != &id);
            if ids.is_empty() {
                self.slots_by_schedule.remove(&p.schedule_id);
            }
        }
        if let Some(s) = row {
            self.slots_by_schedule.entry(s.schedule_id).or_default().push(id);
            self.time_slots.insert(id, s);
        }
        prev
    }

    fn put_booking(&mut self, id: Ulid, row: Option<Booking>) -> Option<Booking> {
        let prev = self.bookings.remove(&id);
        if let Some(p) = &prev
            && let Some(ids) = self.bookings_by_slot.get_mut(&p.time_slot_id)
        {
            ids.retain(|b| b != &id);
            if ids.is_empty() {
                self.bookings_by_slot.remove(&p.time_slot_id);
            }
        }
        if let Some(b) = row {
            self.bookings_by_slot.entry(b.time_slot_id).or_default().push(id);
            self.bookings.insert(id, b);
        }
        prev
    }

    fn put_details(&mut self, booking_id: Ulid, rows: Vec<BookingDetail>) -> Vec<BookingDetail> {
        let prev = if rows.is_empty() {
            self.booking_details.remove(&booking_id)
        } else {
            self.booking_details.insert(booking_id, rows)
        };
        prev.unwrap_or_default()
    }

    fn put_row<T>(map: &mut HashMap<Ulid, T>, id: Ulid, row: Option<T>) -> Option<T> {
        match row {
            Some(r) => map.insert(id, r),
            None => map.remove(&id),
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply a committed or in-flight event, returning the undo entries that
    /// restore the previous row images.
    pub(super) fn apply(&mut self, event: &Event) -> Vec<Undo> {
        match event {
            Event::StoreSaved(s) => {
                let prev = Self::put_row(&mut self.stores, s.id, Some(s.clone()));
                vec![Undo::Store(s.id, prev)]
            }
            Event::StylistSaved(s) => {
                let prev = Self::put_row(&mut self.stylists, s.id, Some(s.clone()));
                vec![Undo::Stylist(s.id, prev)]
            }
            Event::CustomerSaved(c) => {
                let prev = Self::put_row(&mut self.customers, c.id, Some(c.clone()));
                vec![Undo::Customer(c.id, prev)]
            }
            Event::ServiceSaved(s) => {
                let prev = Self::put_row(&mut self.services, s.id, Some(s.clone()));
                vec![Undo::Service(s.id, prev)]
            }
            Event::SchedulesInserted(rows) => rows
                .iter()
                .map(|s| Undo::Schedule(s.id, self.put_schedule(s.id, Some(s.clone()))))
                .collect(),
            Event::ScheduleUpdated(s) => {
                vec![Undo::Schedule(s.id, self.put_schedule(s.id, Some(s.clone())))]
            }
            Event::ScheduleDeleted { id } => vec![Undo::Schedule(*id, self.put_schedule(*id, None))],
            Event::TimeSlotsInserted(rows) => rows
                .iter()
                .map(|s| Undo::TimeSlot(s.id, self.put_time_slot(s.id, Some(s.clone()))))
                .collect(),
            Event::TimeSlotUpdated(s) => {
                vec![Undo::TimeSlot(s.id, self.put_time_slot(s.id, Some(s.clone())))]
            }
            Event::TimeSlotDeleted { id } => {
                vec![Undo::TimeSlot(*id, self.put_time_slot(*id, None))]
            }
            Event::SlotAvailabilityChanged { id, is_available } => match self.time_slots.get_mut(id) {
                Some(slot) => {
                    let prev = slot.clone();
                    slot.is_available = *is_available;
                    vec![Undo::TimeSlot(*id, Some(prev))]
                }
                None => Vec::new(),
            },
            Event::BookingInserted(b) | Event::BookingUpdated(b) => {
                vec![Undo::Booking(b.id, self.put_booking(b.id, Some(b.clone())))]
            }
            Event::BookingDetailsReplaced { booking_id, details } => {
                let prev = self.put_details(*booking_id, details.clone());
                vec![Undo::Details(*booking_id, prev)]
            }
        }
    }

    pub(super) fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Store(id, prev) => {
                Self::put_row(&mut self.stores, id, prev);
            }
            Undo::Stylist(id, prev) => {
                Self::put_row(&mut self.stylists, id, prev);
            }
            Undo::Customer(id, prev) => {
                Self::put_row(&mut self.customers, id, prev);
            }
            Undo::Service(id, prev) => {
                Self::put_row(&mut self.services, id, prev);
            }
            Undo::Schedule(id, prev) => {
                self.put_schedule(id, prev);
            }
            Undo::TimeSlot(id, prev) => {
                self.put_time_slot(id, prev);
            }
            Undo::Booking(id, prev) => {
                self.put_booking(id, prev);
            }
            Undo::Details(id, prev) => {
                self.put_details(id, prev);
            }
        }
    }

    /// Minimal records that recreate the current state, parents before children.
    pub(super) fn snapshot_records(&self) -> Vec<Vec<Event>> {
        let mut catalog: Vec<Event> = Vec::new();
        catalog.extend(self.stores.values().cloned().map(Event::StoreSaved));
        catalog.extend(self.stylists.values().cloned().map(Event::StylistSaved));
        catalog.extend(self.customers.values().cloned().map(Event::CustomerSaved));
        catalog.extend(self.services.values().cloned().map(Event::ServiceSaved));

        let mut records: Vec<Vec<Event>> = catalog
            .chunks(BATCH_INSERT_CHUNK)
            .map(<[Event]>::to_vec)
            .collect();

        let schedules: Vec<Schedule> = self.schedules.values().cloned().collect();
        records.extend(
            schedules
                .chunks(BATCH_INSERT_CHUNK)
                .map(|c| vec![Event::SchedulesInserted(c.to_vec())]),
        );
        let slots: Vec<TimeSlot> = self.time_slots.values().cloned().collect();
        records.extend(
            slots
                .chunks(BATCH_INSERT_CHUNK)
                .map(|c| vec![Event::TimeSlotsInserted(c.to_vec())]),
        );

        let mut bookings: Vec<Event> = Vec::new();
        for b in self.bookings.values() {
            bookings.push(Event::BookingInserted(b.clone()));
            let details = self.booking_details(&b.id);
            if !details.is_empty() {
                bookings.push(Event::BookingDetailsReplaced {
                    booking_id: b.id,
                    details: details.to_vec(),
                });
            }
        }
        records.extend(bookings.chunks(BATCH_INSERT_CHUNK).map(<[Event]>::to_vec));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn schedule(work_date: NaiveDate) -> Schedule {
        Schedule {
            id: Ulid::new(),
            store_id: Ulid::new(),
            stylist_id: Ulid::new(),
            work_date,
            note: None,
        }
    }

    #[test]
    fn day_index_follows_date_change() {
        let mut tables = Tables::new();
        let d1 = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2030, 1, 2).unwrap();
        let s = schedule(d1);
        tables.apply(&Event::SchedulesInserted(vec![s.clone()]));
        assert!(tables.schedule_for_day(s.store_id, s.stylist_id, d1).is_some());

        let moved = Schedule { work_date: d2, ..s.clone() };
        tables.apply(&Event::ScheduleUpdated(moved));
        assert!(tables.schedule_for_day(s.store_id, s.stylist_id, d1).is_none());
        assert!(tables.schedule_for_day(s.store_id, s.stylist_id, d2).is_some());
    }

    #[test]
    fn revert_restores_previous_images_in_reverse() {
        let mut tables = Tables::new();
        let s = schedule(NaiveDate::from_ymd_opt(2030, 3, 4).unwrap());
        let slot = TimeSlot {
            id: Ulid::new(),
            schedule_id: s.id,
            window: Window::new(t(9, 0), t(9, 30)),
            is_available: true,
        };
        tables.apply(&Event::SchedulesInserted(vec![s.clone()]));
        tables.apply(&Event::TimeSlotsInserted(vec![slot.clone()]));

        let mut undo = tables.apply(&Event::SlotAvailabilityChanged {
            id: slot.id,
            is_available: false,
        });
        undo.extend(tables.apply(&Event::TimeSlotDeleted { id: slot.id }));
        assert!(tables.time_slot(&slot.id).is_none());
        assert!(tables.slots_of(&s.id).is_empty());

        while let Some(u) = undo.pop() {
            tables.revert(u);
        }
        assert_eq!(tables.time_slot(&slot.id), Some(&slot));
        assert_eq!(tables.slots_of(&s.id).len(), 1);
    }

    #[test]
    fn empty_detail_replacement_removes_rows() {
        let mut tables = Tables::new();
        let booking_id = Ulid::new();
        let detail = BookingDetail {
            id: Ulid::new(),
            booking_id,
            service_id: Ulid::new(),
            price: 2500,
            is_addon: false,
        };
        tables.apply(&Event::BookingDetailsReplaced {
            booking_id,
            details: vec![detail],
        });
        assert_eq!(tables.counts().booking_details, 1);
        tables.apply(&Event::BookingDetailsReplaced {
            booking_id,
            details: vec![],
        });
        assert_eq!(tables.counts().booking_details, 0);
    }
}
