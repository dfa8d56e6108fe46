use chrono::NaiveDate;
use ulid::Ulid;

use crate::db::DbError;
use crate::model::{BookingStatus, Minutes};

/// Failure kinds the boundary layer maps to transport responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    PermissionDenied,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Store,
    Stylist,
    Customer,
    Schedule,
    TimeSlot,
    Service,
    Booking,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Store => "store",
            Entity::Stylist => "stylist",
            Entity::Customer => "customer",
            Entity::Schedule => "schedule",
            Entity::TimeSlot => "time slot",
            Entity::Service => "service",
            Entity::Booking => "booking",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictReason {
    #[error("time slot {0} overlaps another slot of the same schedule")]
    TimeSlotOverlap(String),
    #[error("schedule already exists for {0}")]
    DuplicateScheduleDate(NaiveDate),
    #[error("time slot {0} is not available")]
    TimeSlotUnavailable(Ulid),
    #[error("time slot {0} is reserved")]
    TimeSlotReserved(Ulid),
    #[error("booking is {current}, operation requires {required}")]
    StatusNotAllowed {
        current: BookingStatus,
        required: BookingStatus,
    },
    #[error("services need {required} minutes but the slot is {available} minutes")]
    DurationExceedsSlot { required: Minutes, available: Minutes },
}

/// Service resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(Ulid),
    #[error("service {0} is an add-on and cannot be the main service")]
    NotMain(Ulid),
    #[error("service {0} is not an add-on")]
    NotAddon(Ulid),
    #[error("service {0} is inactive")]
    Inactive(Ulid),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Ulid },
    #[error("conflict: {0}")]
    Conflict(ConflictReason),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("system error: {0}")]
    System(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            EngineError::System(_) => ErrorKind::System,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub(crate) fn not_found(entity: Entity, id: Ulid) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub(crate) fn denied(msg: impl Into<String>) -> Self {
        EngineError::PermissionDenied(msg.into())
    }
}

impl From<ConflictReason> for EngineError {
    fn from(reason: ConflictReason) -> Self {
        EngineError::Conflict(reason)
    }
}

impl From<ServiceError> for EngineError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(id) => EngineError::not_found(Entity::Service, id),
            other => EngineError::Validation(other.to_string()),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(e: DbError) -> Self {
        EngineError::System(e.to_string())
    }
}
