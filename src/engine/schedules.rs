use std::collections::HashSet;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info};
use ulid::Ulid;

use crate::access::Caller;
use crate::db::Tables;
use crate::limits::*;
use crate::model::*;

use super::overlap::{check_against_siblings, check_len, parse_date, parse_time, parse_window, sort_and_check_disjoint};
use super::queries::schedule_info;
use super::requests::*;
use super::{ConflictReason, Engine, EngineError, Entity, observe};

/// One validated day of a bulk request.
struct PlannedDay {
    work_date: NaiveDate,
    note: Option<String>,
    /// Sorted by start, pairwise disjoint.
    windows: Vec<Window>,
}

fn first_reserved_slot(tables: &Tables, schedule_id: &Ulid) -> Option<Ulid> {
    tables
        .slots_of(schedule_id)
        .into_iter()
        .find(|s| !s.is_available)
        .map(|s| s.id)
}

fn load_schedule(tables: &Tables, id: Ulid) -> Result<Schedule, EngineError> {
    tables
        .schedule(&id)
        .cloned()
        .ok_or(EngineError::not_found(Entity::Schedule, id))
}

fn load_slot_with_schedule(tables: &Tables, id: Ulid) -> Result<(TimeSlot, Schedule), EngineError> {
    let slot = tables
        .time_slot(&id)
        .cloned()
        .ok_or(EngineError::not_found(Entity::TimeSlot, id))?;
    let schedule = load_schedule(tables, slot.schedule_id)?;
    Ok((slot, schedule))
}

impl Engine {
    async fn require_schedule_access(
        &self,
        caller: &Caller,
        store_id: Ulid,
        stylist_id: Ulid,
    ) -> Result<(), EngineError> {
        if self
            .caps
            .can_manage_stylist_schedule(caller, store_id, stylist_id)
            .await
        {
            Ok(())
        } else {
            Err(EngineError::denied(format!(
                "cannot manage schedules of stylist {stylist_id} at store {store_id}"
            )))
        }
    }

    fn plan_days(&self, days: &[ScheduleDayInput]) -> Result<Vec<PlannedDay>, EngineError> {
        if days.is_empty() {
            return Err(EngineError::validation("no schedule days given"));
        }
        if days.len() > MAX_DAYS_PER_REQUEST {
            return Err(EngineError::validation(format!(
                "at most {MAX_DAYS_PER_REQUEST} days per request"
            )));
        }

        let today = self.clock.today();
        let mut seen = HashSet::with_capacity(days.len());
        let mut planned = Vec::with_capacity(days.len());

        for day in days {
            let work_date = parse_date(&day.work_date)?;
            if work_date < today {
                return Err(EngineError::validation(format!(
                    "work date {work_date} is in the past"
                )));
            }
            if !seen.insert(work_date) {
                return Err(EngineError::validation(format!(
                    "work date {work_date} appears more than once"
                )));
            }
            check_len("schedule note", day.note.as_deref(), MAX_NOTE_LEN)?;
            if day.time_slots.is_empty() {
                return Err(EngineError::validation(format!(
                    "work date {work_date} has no time slots"
                )));
            }
            if day.time_slots.len() > MAX_WINDOWS_PER_DAY {
                return Err(EngineError::validation(format!(
                    "at most {MAX_WINDOWS_PER_DAY} time slots per day"
                )));
            }

            let mut windows = day
                .time_slots
                .iter()
                .map(parse_window)
                .collect::<Result<Vec<_>, _>>()?;
            sort_and_check_disjoint(&mut windows)?;

            planned.push(PlannedDay {
                work_date,
                note: day.note.clone(),
                windows,
            });
        }
        Ok(planned)
    }

    /// Create one schedule per requested day with its time slots, all or nothing.
    pub async fn create_schedules_bulk(
        &self,
        caller: &Caller,
        req: CreateSchedulesRequest,
    ) -> Result<Vec<ScheduleInfo>, EngineError> {
        let started = Instant::now();
        let result = self.create_schedules_bulk_inner(caller, req).await;
        observe("create_schedules", started, &result);
        result
    }

    async fn create_schedules_bulk_inner(
        &self,
        caller: &Caller,
        req: CreateSchedulesRequest,
    ) -> Result<Vec<ScheduleInfo>, EngineError> {
        let (store_ok, stylist_ok) = self
            .db
            .read(|t| (t.store(&req.store_id).is_some(), t.stylist(&req.stylist_id).is_some()))
            .await;
        if !store_ok {
            return Err(EngineError::not_found(Entity::Store, req.store_id));
        }
        if !stylist_ok {
            return Err(EngineError::not_found(Entity::Stylist, req.stylist_id));
        }
        self.require_schedule_access(caller, req.store_id, req.stylist_id)
            .await?;

        let planned = self.plan_days(&req.days)?;

        let mut schedules = Vec::with_capacity(planned.len());
        let mut slots = Vec::new();
        for day in planned {
            let schedule_id = self.next_id();
            for window in day.windows {
                slots.push(TimeSlot {
                    id: self.next_id(),
                    schedule_id,
                    window,
                    is_available: true,
                });
            }
            schedules.push(Schedule {
                id: schedule_id,
                store_id: req.store_id,
                stylist_id: req.stylist_id,
                work_date: day.work_date,
                note: day.note,
            });
        }

        let mut tx = self.db.begin().await;
        for s in &schedules {
            if tx
                .tables()
                .schedule_for_day(s.store_id, s.stylist_id, s.work_date)
                .is_some()
            {
                debug!(
                    "bulk schedule rejected: stylist {} already works {} at store {}",
                    s.stylist_id, s.work_date, s.store_id
                );
                return Err(ConflictReason::DuplicateScheduleDate(s.work_date).into());
            }
        }
        tx.insert_schedules(&schedules);
        tx.insert_time_slots(&slots);
        let created: Vec<ScheduleInfo> = schedules
            .iter()
            .map(|s| schedule_info(tx.tables(), s))
            .collect();
        tx.commit().await?;

        metrics::counter!(crate::observability::SCHEDULES_CREATED_TOTAL)
            .increment(schedules.len() as u64);
        metrics::counter!(crate::observability::TIME_SLOTS_CREATED_TOTAL)
            .increment(slots.len() as u64);
        info!(
            "created {} schedules ({} time slots) for stylist {} at store {}",
            schedules.len(),
            slots.len(),
            req.stylist_id,
            req.store_id
        );
        Ok(created)
    }

    /// Delete schedules and their time slots. Refused if any slot is reserved.
    pub async fn delete_schedules_bulk(
        &self,
        caller: &Caller,
        req: DeleteSchedulesRequest,
    ) -> Result<usize, EngineError> {
        let started = Instant::now();
        let result = self.delete_schedules_bulk_inner(caller, req).await;
        observe("delete_schedules", started, &result);
        result
    }

    async fn delete_schedules_bulk_inner(
        &self,
        caller: &Caller,
        req: DeleteSchedulesRequest,
    ) -> Result<usize, EngineError> {
        if req.schedule_ids.is_empty() {
            return Err(EngineError::validation("no schedules given"));
        }
        if req.schedule_ids.len() > MAX_SCHEDULES_PER_DELETE {
            return Err(EngineError::validation(format!(
                "at most {MAX_SCHEDULES_PER_DELETE} schedules per request"
            )));
        }
        self.require_store_access(caller, req.store_id).await?;
        let own_only = self.caps.can_act_on_own_schedule_only(caller);

        let mut ids = req.schedule_ids;
        ids.sort();
        ids.dedup();

        let mut tx = self.db.begin().await;
        for id in &ids {
            let schedule = load_schedule(tx.tables(), *id)?;
            if schedule.store_id != req.store_id {
                return Err(EngineError::not_found(Entity::Schedule, *id));
            }
            if own_only && schedule.stylist_id != caller.id() {
                return Err(EngineError::denied(format!(
                    "schedule {id} belongs to another stylist"
                )));
            }
            if let Some(slot_id) = first_reserved_slot(tx.tables(), id) {
                return Err(ConflictReason::TimeSlotReserved(slot_id).into());
            }
        }
        for id in &ids {
            let slot_ids: Vec<Ulid> = tx.tables().slots_of(id).iter().map(|s| s.id).collect();
            for slot_id in slot_ids {
                tx.delete_time_slot(slot_id);
            }
            tx.delete_schedule(*id);
        }
        tx.commit().await?;

        info!("deleted {} schedules at store {}", ids.len(), req.store_id);
        Ok(ids.len())
    }

    /// Change a schedule's date or note. The date is frozen once a slot is reserved.
    pub async fn update_schedule(
        &self,
        caller: &Caller,
        schedule_id: Ulid,
        update: ScheduleUpdate,
    ) -> Result<ScheduleInfo, EngineError> {
        if !update.has_updates() {
            return Err(EngineError::validation("no fields to update"));
        }
        let current = self
            .db
            .read(|t| load_schedule(t, schedule_id))
            .await?;
        self.require_schedule_access(caller, current.store_id, current.stylist_id)
            .await?;

        let new_date = match &update.work_date {
            Update::Set(s) => {
                let d = parse_date(s)?;
                if d < self.clock.today() {
                    return Err(EngineError::validation(format!("work date {d} is in the past")));
                }
                Some(d)
            }
            Update::Keep => None,
        };
        if let Update::Set(note) = &update.note {
            check_len("schedule note", note.as_deref(), MAX_NOTE_LEN)?;
        }

        let mut tx = self.db.begin().await;
        let mut schedule = load_schedule(tx.tables(), schedule_id)?;
        if let Some(d) = new_date
            && d != schedule.work_date
        {
            if let Some(slot_id) = first_reserved_slot(tx.tables(), &schedule_id) {
                return Err(ConflictReason::TimeSlotReserved(slot_id).into());
            }
            if tx
                .tables()
                .schedule_for_day(schedule.store_id, schedule.stylist_id, d)
                .is_some()
            {
                return Err(ConflictReason::DuplicateScheduleDate(d).into());
            }
            schedule.work_date = d;
        }
        update.note.apply_to(&mut schedule.note);
        tx.update_schedule(schedule.clone());
        let info = schedule_info(tx.tables(), &schedule);
        tx.commit().await?;

        info!("updated schedule {schedule_id}");
        Ok(info)
    }

    /// Add one time slot to an existing schedule.
    pub async fn create_time_slot(
        &self,
        caller: &Caller,
        schedule_id: Ulid,
        input: TimeWindowInput,
    ) -> Result<TimeSlot, EngineError> {
        let window = parse_window(&input)?;
        let schedule = self
            .db
            .read(|t| load_schedule(t, schedule_id))
            .await?;
        self.require_schedule_access(caller, schedule.store_id, schedule.stylist_id)
            .await?;

        let mut tx = self.db.begin().await;
        load_schedule(tx.tables(), schedule_id)?;
        let siblings = tx.tables().slots_of(&schedule_id);
        if siblings.len() >= MAX_WINDOWS_PER_DAY {
            return Err(EngineError::validation(format!(
                "at most {MAX_WINDOWS_PER_DAY} time slots per day"
            )));
        }
        check_against_siblings(&siblings, &window, None)?;

        let slot = TimeSlot {
            id: self.next_id(),
            schedule_id,
            window,
            is_available: true,
        };
        tx.insert_time_slots(std::slice::from_ref(&slot));
        tx.commit().await?;

        metrics::counter!(crate::observability::TIME_SLOTS_CREATED_TOTAL).increment(1);
        info!("created time slot {} on schedule {schedule_id}", slot.id);
        Ok(slot)
    }

    /// Move an unreserved time slot, re-checking it against its siblings.
    pub async fn update_time_slot(
        &self,
        caller: &Caller,
        slot_id: Ulid,
        update: TimeSlotUpdate,
    ) -> Result<TimeSlot, EngineError> {
        if !update.has_updates() {
            return Err(EngineError::validation("no fields to update"));
        }
        let (_, schedule) = self
            .db
            .read(|t| load_slot_with_schedule(t, slot_id))
            .await?;
        self.require_schedule_access(caller, schedule.store_id, schedule.stylist_id)
            .await?;

        let start = update.start.as_set().map(|s| parse_time(s)).transpose()?;
        let end = update.end.as_set().map(|s| parse_time(s)).transpose()?;

        let mut tx = self.db.begin().await;
        let (mut slot, _) = load_slot_with_schedule(tx.tables(), slot_id)?;
        if !slot.is_available {
            return Err(ConflictReason::TimeSlotReserved(slot_id).into());
        }
        let new_start = start.unwrap_or(slot.window.start);
        let new_end = end.unwrap_or(slot.window.end);
        let window = Window::try_new(new_start, new_end).ok_or_else(|| {
            EngineError::validation(format!(
                "time slot end {new_end} must be after start {new_start}"
            ))
        })?;
        let siblings = tx.tables().slots_of(&slot.schedule_id);
        check_against_siblings(&siblings, &window, Some(slot_id))?;

        slot.window = window;
        tx.update_time_slot(slot.clone());
        tx.commit().await?;

        info!("updated time slot {slot_id}");
        Ok(slot)
    }

    /// Remove an unreserved time slot.
    pub async fn delete_time_slot(&self, caller: &Caller, slot_id: Ulid) -> Result<(), EngineError> {
        let (_, schedule) = self
            .db
            .read(|t| load_slot_with_schedule(t, slot_id))
            .await?;
        self.require_schedule_access(caller, schedule.store_id, schedule.stylist_id)
            .await?;

        let mut tx = self.db.begin().await;
        let (slot, _) = load_slot_with_schedule(tx.tables(), slot_id)?;
        if !slot.is_available {
            return Err(ConflictReason::TimeSlotReserved(slot_id).into());
        }
        tx.delete_time_slot(slot_id);
        tx.commit().await?;

        info!("deleted time slot {slot_id}");
        Ok(())
    }
}
