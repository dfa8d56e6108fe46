use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::Booking;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    Stylist,
}

/// Who is making the request, as established by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Staff { id: Ulid, role: Role },
    Customer { id: Ulid },
}

impl Caller {
    pub fn staff(id: Ulid, role: Role) -> Self {
        Caller::Staff { id, role }
    }

    pub fn customer(id: Ulid) -> Self {
        Caller::Customer { id }
    }

    pub fn id(&self) -> Ulid {
        match self {
            Caller::Staff { id, .. } | Caller::Customer { id } => *id,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Caller::Staff { role, .. } => Some(*role),
            Caller::Customer { .. } => None,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Caller::Staff { .. })
    }
}

/// Staff-to-store access lists, owned by the permission service.
#[async_trait]
pub trait AccessGuard: Send + Sync {
    async fn has_store_access(&self, staff_id: Ulid, store_id: Ulid) -> bool;
}

/// Access lists held in memory.
#[derive(Default)]
pub struct StaticAccessGuard {
    stores: DashMap<Ulid, HashSet<Ulid>>,
}

impl StaticAccessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, staff_id: Ulid, store_id: Ulid) {
        self.stores.entry(staff_id).or_default().insert(store_id);
    }

    pub fn revoke(&self, staff_id: &Ulid, store_id: &Ulid) {
        if let Some(mut set) = self.stores.get_mut(staff_id) {
            set.remove(store_id);
        }
    }
}

#[async_trait]
impl AccessGuard for StaticAccessGuard {
    async fn has_store_access(&self, staff_id: Ulid, store_id: Ulid) -> bool {
        self.stores
            .get(&staff_id)
            .is_some_and(|set| set.contains(&store_id))
    }
}

/// The one place role rules are decided. The generator and the booking
/// coordinator both ask it instead of comparing roles themselves.
#[derive(Clone)]
pub struct Capabilities {
    guard: Arc<dyn AccessGuard>,
}

impl Capabilities {
    pub fn new(guard: Arc<dyn AccessGuard>) -> Self {
        Self { guard }
    }

    /// Staff with the store on their access list; super-admins everywhere.
    /// Customers never act on a store as such.
    pub async fn can_act_on_store(&self, caller: &Caller, store_id: Ulid) -> bool {
        match caller {
            Caller::Staff { role: Role::SuperAdmin, .. } => true,
            Caller::Staff { id, .. } => self.guard.has_store_access(*id, store_id).await,
            Caller::Customer { .. } => false,
        }
    }

    /// Stylists may only manage their own schedules.
    pub fn can_act_on_own_schedule_only(&self, caller: &Caller) -> bool {
        caller.role() == Some(Role::Stylist)
    }

    /// The owning customer, or staff who can act on the booking's store.
    pub async fn can_act_on_booking(&self, caller: &Caller, booking: &Booking) -> bool {
        match caller {
            Caller::Customer { id } => *id == booking.customer_id,
            Caller::Staff { .. } => self.can_act_on_store(caller, booking.store_id).await,
        }
    }

    /// Store access plus, for stylists, ownership of the stylist's schedule.
    pub async fn can_manage_stylist_schedule(
        &self,
        caller: &Caller,
        store_id: Ulid,
        stylist_id: Ulid,
    ) -> bool {
        if self.can_act_on_own_schedule_only(caller) {
            return caller.id() == stylist_id && self.can_act_on_store(caller, store_id).await;
        }
        self.can_act_on_store(caller, store_id).await
    }
}
