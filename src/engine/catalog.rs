use tracing::info;

use crate::limits::MAX_NAME_LEN;
use crate::model::*;

use super::overlap::check_len;
use super::{Engine, EngineError, Entity};

// Catalog rows are owned by plain CRUD elsewhere; these upserts only make them
// visible to the booking core.
impl Engine {
    pub async fn register_store(&self, store: Store) -> Result<(), EngineError> {
        check_len("store name", Some(&store.name), MAX_NAME_LEN)?;
        let mut tx = self.db.begin().await;
        tx.save_store(store.clone());
        tx.commit().await?;
        info!("registered store {} ({})", store.id, store.name);
        Ok(())
    }

    pub async fn register_stylist(&self, stylist: Stylist) -> Result<(), EngineError> {
        check_len("stylist name", Some(&stylist.name), MAX_NAME_LEN)?;
        let mut tx = self.db.begin().await;
        if tx.tables().store(&stylist.store_id).is_none() {
            return Err(EngineError::not_found(Entity::Store, stylist.store_id));
        }
        tx.save_stylist(stylist);
        tx.commit().await?;
        Ok(())
    }

    pub async fn register_customer(&self, customer: Customer) -> Result<(), EngineError> {
        check_len("customer name", Some(&customer.name), MAX_NAME_LEN)?;
        let mut tx = self.db.begin().await;
        tx.save_customer(customer);
        tx.commit().await?;
        Ok(())
    }

    /// Price changes here never touch captured booking line items.
    pub async fn register_service(&self, service: Service) -> Result<(), EngineError> {
        check_len("service name", Some(&service.name), MAX_NAME_LEN)?;
        if service.duration_minutes == 0 {
            return Err(EngineError::validation("service duration must be positive"));
        }
        if service.price < 0 {
            return Err(EngineError::validation("service price must not be negative"));
        }
        let mut tx = self.db.begin().await;
        tx.save_service(service);
        tx.commit().await?;
        Ok(())
    }
}
