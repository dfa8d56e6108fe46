use std::collections::HashSet;

use ulid::Ulid;

use crate::db::Tables;
use crate::limits::MAX_SUB_SERVICES;
use crate::model::*;

use super::{ConflictReason, EngineError, ServiceError};

/// Main service plus add-ons, resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedServices {
    pub main: Service,
    pub addons: Vec<Service>,
}

impl ResolvedServices {
    pub fn total_duration(&self) -> Minutes {
        self.all().map(|s| s.duration_minutes).sum()
    }

    pub fn total_price(&self) -> Cents {
        self.all().map(|s| s.price).sum()
    }

    /// Main service first, then add-ons in request order.
    pub fn all(&self) -> impl Iterator<Item = &Service> {
        std::iter::once(&self.main).chain(self.addons.iter())
    }

    /// One line item per service, price captured now.
    pub fn to_details(&self, booking_id: Ulid, mut next_id: impl FnMut() -> Ulid) -> Vec<BookingDetail> {
        self.all()
            .map(|s| BookingDetail {
                id: next_id(),
                booking_id,
                service_id: s.id,
                price: s.price,
                is_addon: s.is_addon,
            })
            .collect()
    }
}

/// Resolve the main service and add-ons in one pass over the catalog.
pub fn resolve_services(
    tables: &Tables,
    main_id: Ulid,
    sub_ids: &[Ulid],
) -> Result<ResolvedServices, ServiceError> {
    let main = tables
        .service(&main_id)
        .ok_or(ServiceError::NotFound(main_id))?;
    if main.is_addon {
        return Err(ServiceError::NotMain(main_id));
    }
    if !main.is_active {
        return Err(ServiceError::Inactive(main_id));
    }

    let mut addons = Vec::with_capacity(sub_ids.len());
    for id in sub_ids {
        let service = tables.service(id).ok_or(ServiceError::NotFound(*id))?;
        if !service.is_addon {
            return Err(ServiceError::NotAddon(*id));
        }
        if !service.is_active {
            return Err(ServiceError::Inactive(*id));
        }
        addons.push(service.clone());
    }

    Ok(ResolvedServices {
        main: main.clone(),
        addons,
    })
}

/// Request-shape checks that need no catalog access.
pub(crate) fn check_sub_service_ids(sub_ids: &[Ulid]) -> Result<(), EngineError> {
    if sub_ids.len() > MAX_SUB_SERVICES {
        return Err(EngineError::validation(format!(
            "at most {MAX_SUB_SERVICES} add-on services per booking"
        )));
    }
    let mut seen = HashSet::with_capacity(sub_ids.len());
    if let Some(dup) = sub_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(EngineError::validation(format!("add-on service {dup} listed twice")));
    }
    Ok(())
}

/// The slot must be at least as long as the services booked into it.
pub fn ensure_fits(slot: &TimeSlot, services: &ResolvedServices) -> Result<(), EngineError> {
    let required = services.total_duration();
    let available = slot.window.duration_minutes();
    if available < required {
        return Err(ConflictReason::DurationExceedsSlot { required, available }.into());
    }
    Ok(())
}
