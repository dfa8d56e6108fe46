use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::access::Caller;
use crate::db::Tables;
use crate::limits::*;
use crate::model::*;

use super::overlap::check_len;
use super::queries::booking_view;
use super::services::{ResolvedServices, check_sub_service_ids, ensure_fits, resolve_services};
use super::slots::{release, reserve};
use super::requests::*;
use super::{ConflictReason, Engine, EngineError, Entity, observe};

fn load_booking(tables: &Tables, id: Ulid) -> Result<Booking, EngineError> {
    tables
        .booking(&id)
        .cloned()
        .ok_or(EngineError::not_found(Entity::Booking, id))
}

fn require_status(b: &Booking, required: BookingStatus) -> Result<(), EngineError> {
    if b.status != required {
        return Err(ConflictReason::StatusNotAllowed {
            current: b.status,
            required,
        }
        .into());
    }
    Ok(())
}

/// A slot that passed every pre-transaction check, with the services to put in it.
struct SlotPlan {
    slot_id: Ulid,
    stylist_id: Ulid,
    services: ResolvedServices,
}

/// Everything that can be checked before the transaction: the slot exists,
/// belongs to `store_id`, is free (unless it is `current`), and is long enough.
fn plan_slot(
    tables: &Tables,
    store_id: Ulid,
    slot_id: Ulid,
    current: Option<Ulid>,
    main_id: Ulid,
    sub_ids: &[Ulid],
) -> Result<SlotPlan, EngineError> {
    let slot = tables
        .time_slot(&slot_id)
        .ok_or(EngineError::not_found(Entity::TimeSlot, slot_id))?;
    let schedule = tables
        .schedule(&slot.schedule_id)
        .ok_or(EngineError::not_found(Entity::Schedule, slot.schedule_id))?;
    if schedule.store_id != store_id {
        return Err(EngineError::validation(format!(
            "time slot {slot_id} does not belong to store {store_id}"
        )));
    }
    if current != Some(slot_id) && !slot.is_available {
        debug!("time slot {slot_id} already reserved");
        return Err(ConflictReason::TimeSlotUnavailable(slot_id).into());
    }
    let services = resolve_services(tables, main_id, sub_ids)?;
    ensure_fits(slot, &services)?;
    Ok(SlotPlan {
        slot_id,
        stylist_id: schedule.stylist_id,
        services,
    })
}

/// The store takes bookings and the customer exists.
fn check_bookable(tables: &Tables, store_id: Ulid, customer_id: Ulid) -> Result<(), EngineError> {
    let store = tables
        .store(&store_id)
        .ok_or(EngineError::not_found(Entity::Store, store_id))?;
    if !store.is_active {
        return Err(EngineError::validation(format!(
            "store {store_id} is not active"
        )));
    }
    if tables.customer(&customer_id).is_none() {
        return Err(EngineError::not_found(Entity::Customer, customer_id));
    }
    Ok(())
}

fn count_transition(status: BookingStatus) {
    metrics::counter!(crate::observability::BOOKINGS_TOTAL, "status" => status.as_str())
        .increment(1);
}

impl Engine {
    async fn require_booking_access(&self, caller: &Caller, b: &Booking) -> Result<(), EngineError> {
        if self.caps.can_act_on_booking(caller, b).await {
            Ok(())
        } else {
            Err(EngineError::denied(format!("no access to booking {}", b.id)))
        }
    }

    /// Book a time slot. The booking, its line items and the slot flip commit
    /// together or not at all.
    pub async fn create_booking(
        &self,
        caller: &Caller,
        req: CreateBookingRequest,
    ) -> Result<BookingView, EngineError> {
        let started = Instant::now();
        let result = self.create_booking_inner(caller, req).await;
        observe("create_booking", started, &result);
        result
    }

    async fn create_booking_inner(
        &self,
        caller: &Caller,
        req: CreateBookingRequest,
    ) -> Result<BookingView, EngineError> {
        check_sub_service_ids(&req.sub_service_ids)?;
        check_len("booking note", req.note.as_deref(), MAX_NOTE_LEN)?;

        self.db
            .read(|t| check_bookable(t, req.store_id, req.customer_id))
            .await?;

        match caller {
            Caller::Customer { id } if *id != req.customer_id => {
                return Err(EngineError::denied("customers may only book for themselves"));
            }
            Caller::Customer { .. } => {}
            Caller::Staff { .. } => self.require_store_access(caller, req.store_id).await?,
        }

        // Every check is repeated under the write guard; the reads above only fail fast.
        let mut tx = self.db.begin().await;
        check_bookable(tx.tables(), req.store_id, req.customer_id)?;
        let plan = plan_slot(
            tx.tables(),
            req.store_id,
            req.time_slot_id,
            None,
            req.main_service_id,
            &req.sub_service_ids,
        )?;

        let booking = Booking {
            id: self.next_id(),
            store_id: req.store_id,
            customer_id: req.customer_id,
            stylist_id: plan.stylist_id,
            time_slot_id: plan.slot_id,
            chat_enabled: req.chat_enabled,
            note: req.note,
            status: BookingStatus::Scheduled,
            cancel_reason: None,
            actual_duration_minutes: None,
            extras: None,
        };
        let details = plan.services.to_details(booking.id, || self.next_id());

        reserve(&mut tx, plan.slot_id)?;
        tx.insert_booking(booking.clone());
        tx.replace_booking_details(booking.id, details);
        let view = booking_view(tx.tables(), &booking)?;
        tx.commit().await?;

        count_transition(BookingStatus::Scheduled);
        info!(
            "booking {} created: slot {} customer {} total {} min",
            booking.id,
            booking.time_slot_id,
            booking.customer_id,
            plan.services.total_duration()
        );
        Ok(view)
    }

    /// Customer-side update. The owning customer or staff of the store may call it.
    pub async fn update_booking(
        &self,
        caller: &Caller,
        booking_id: Ulid,
        update: BookingUpdate,
    ) -> Result<BookingView, EngineError> {
        let started = Instant::now();
        let result = match update.validate() {
            Ok(changes) => self.apply_booking_update(caller, booking_id, changes).await,
            Err(e) => Err(e),
        };
        observe("update_booking", started, &result);
        result
    }

    /// Staff-side update. Same rules, staff callers only.
    pub async fn update_booking_by_staff(
        &self,
        caller: &Caller,
        booking_id: Ulid,
        update: StaffBookingUpdate,
    ) -> Result<BookingView, EngineError> {
        let started = Instant::now();
        let result = if !caller.is_staff() {
            Err(EngineError::denied("staff update requires a staff caller"))
        } else {
            match update.validate() {
                Ok(changes) => self.apply_booking_update(caller, booking_id, changes).await,
                Err(e) => Err(e),
            }
        };
        observe("update_booking_by_staff", started, &result);
        result
    }

    async fn apply_booking_update(
        &self,
        caller: &Caller,
        booking_id: Ulid,
        changes: BookingChanges,
    ) -> Result<BookingView, EngineError> {
        if let Update::Set(note) = &changes.note {
            check_len("booking note", note.as_deref(), MAX_NOTE_LEN)?;
        }
        if let Some(sc) = &changes.slot {
            check_sub_service_ids(&sc.sub_service_ids)?;
        }

        let current = self.db.read(|t| load_booking(t, booking_id)).await?;
        self.require_booking_access(caller, &current).await?;
        require_status(&current, BookingStatus::Scheduled)?;

        let mut tx = self.db.begin().await;
        let mut booking = load_booking(tx.tables(), booking_id)?;
        require_status(&booking, BookingStatus::Scheduled)?;
        let plan = match &changes.slot {
            Some(sc) => Some(plan_slot(
                tx.tables(),
                booking.store_id,
                sc.time_slot_id,
                Some(booking.time_slot_id),
                sc.main_service_id,
                &sc.sub_service_ids,
            )?),
            None => None,
        };

        let mut moved_from = None;
        if let Some(plan) = &plan {
            if plan.slot_id != booking.time_slot_id {
                release(&mut tx, booking.time_slot_id)?;
                reserve(&mut tx, plan.slot_id)?;
                moved_from = Some(booking.time_slot_id);
                booking.time_slot_id = plan.slot_id;
                booking.stylist_id = plan.stylist_id;
            }
            let details = plan.services.to_details(booking.id, || self.next_id());
            tx.replace_booking_details(booking.id, details);
        }
        changes.chat_enabled.apply_to(&mut booking.chat_enabled);
        changes.note.apply_to(&mut booking.note);
        tx.update_booking(booking.clone());
        let view = booking_view(tx.tables(), &booking)?;
        tx.commit().await?;

        match moved_from {
            Some(old) => info!(
                "booking {booking_id} moved from slot {old} to {}",
                booking.time_slot_id
            ),
            None => info!("booking {booking_id} updated"),
        }
        Ok(view)
    }

    /// Cancel a scheduled booking into `CANCELLED` or `NO_SHOW` and free its slot.
    pub async fn cancel_booking(
        &self,
        caller: &Caller,
        booking_id: Ulid,
        target: CancelTarget,
        reason: Option<String>,
    ) -> Result<BookingView, EngineError> {
        let started = Instant::now();
        let result = self
            .cancel_booking_inner(caller, booking_id, target, reason)
            .await;
        observe("cancel_booking", started, &result);
        result
    }

    async fn cancel_booking_inner(
        &self,
        caller: &Caller,
        booking_id: Ulid,
        target: CancelTarget,
        reason: Option<String>,
    ) -> Result<BookingView, EngineError> {
        check_len("cancel reason", reason.as_deref(), MAX_CANCEL_REASON_LEN)?;

        let current = self.db.read(|t| load_booking(t, booking_id)).await?;
        self.require_booking_access(caller, &current).await?;
        require_status(&current, BookingStatus::Scheduled)?;

        let mut tx = self.db.begin().await;
        let mut booking = load_booking(tx.tables(), booking_id)?;
        require_status(&booking, BookingStatus::Scheduled)?;
        booking.status = target.into();
        booking.cancel_reason = reason;
        tx.update_booking(booking.clone());
        release(&mut tx, booking.time_slot_id)?;
        let view = booking_view(tx.tables(), &booking)?;
        tx.commit().await?;

        count_transition(booking.status);
        info!(
            "booking {booking_id} {}; slot {} released",
            booking.status, booking.time_slot_id
        );
        Ok(view)
    }

    /// Staff mark a scheduled booking as served. The slot stays reserved.
    pub async fn complete_booking(
        &self,
        caller: &Caller,
        booking_id: Ulid,
    ) -> Result<BookingView, EngineError> {
        let started = Instant::now();
        let result = self.complete_booking_inner(caller, booking_id).await;
        observe("complete_booking", started, &result);
        result
    }

    async fn complete_booking_inner(
        &self,
        caller: &Caller,
        booking_id: Ulid,
    ) -> Result<BookingView, EngineError> {
        if !caller.is_staff() {
            return Err(EngineError::denied("only staff can complete bookings"));
        }
        let current = self.db.read(|t| load_booking(t, booking_id)).await?;
        self.require_store_access(caller, current.store_id).await?;
        require_status(&current, BookingStatus::Scheduled)?;

        let mut tx = self.db.begin().await;
        let mut booking = load_booking(tx.tables(), booking_id)?;
        require_status(&booking, BookingStatus::Scheduled)?;
        booking.status = BookingStatus::Completed;
        tx.update_booking(booking.clone());
        let view = booking_view(tx.tables(), &booking)?;
        tx.commit().await?;

        count_transition(BookingStatus::Completed);
        info!("booking {booking_id} completed");
        Ok(view)
    }

    /// Amend actual duration or extras on a completed booking.
    pub async fn mark_completed(
        &self,
        caller: &Caller,
        booking_id: Ulid,
        update: CompletionUpdate,
    ) -> Result<BookingView, EngineError> {
        if !update.has_updates() {
            return Err(EngineError::validation("no fields to update"));
        }
        if let Update::Set(Some(0)) = update.actual_duration_minutes {
            return Err(EngineError::validation("actual duration must be positive"));
        }
        if let Update::Set(extras) = &update.extras {
            check_len("extras", extras.as_deref(), MAX_EXTRAS_LEN)?;
        }

        let current = self.db.read(|t| load_booking(t, booking_id)).await?;
        self.require_store_access(caller, current.store_id).await?;
        require_status(&current, BookingStatus::Completed)?;

        let mut tx = self.db.begin().await;
        let mut booking = load_booking(tx.tables(), booking_id)?;
        require_status(&booking, BookingStatus::Completed)?;
        update
            .actual_duration_minutes
            .apply_to(&mut booking.actual_duration_minutes);
        update.extras.apply_to(&mut booking.extras);
        tx.update_booking(booking.clone());
        let view = booking_view(tx.tables(), &booking)?;
        tx.commit().await?;

        info!("booking {booking_id} completion details updated");
        Ok(view)
    }
}
