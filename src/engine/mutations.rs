use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::store::SharedSchedule;
use super::{validate_id, validate_optional_id, validate_span, Engine, EngineError};

impl Engine {
    /// Get the schedule for `store_id`, creating it within the store limit.
    async fn writable_schedule(&self, store_id: &str) -> Result<SharedSchedule, EngineError> {
        if !self.store.contains_store(store_id) && self.store.store_count() >= MAX_STORES {
            return Err(EngineError::LimitExceeded("too many stores"));
        }
        let schedule = self.store.schedule_or_default(store_id);
        if schedule.read().await.len() >= MAX_RECORDS_PER_STORE {
            return Err(EngineError::LimitExceeded("too many records in store"));
        }
        Ok(schedule)
    }

    /// Reserve a record id across all stores. Runs under the target store's
    /// write lock, so the record lands before anyone else can see the id.
    fn reserve(&self, kind: ConflictKind, id: &str, store_id: &str) -> Result<(), EngineError> {
        if !self
            .store
            .reserve_record(kind, id.to_string(), store_id.to_string())
        {
            return Err(EngineError::AlreadyExists(id.to_string()));
        }
        Ok(())
    }

    pub async fn insert_appointment(&self, appointment: Appointment) -> Result<(), EngineError> {
        validate_id("id", &appointment.id)?;
        validate_id("store_id", &appointment.store_id)?;
        validate_optional_id("staff_id", appointment.staff_id.as_deref())?;
        validate_optional_id("resource_id", appointment.resource_id.as_deref())?;
        if let Some(minutes) = appointment.duration_minutes
            && !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
                return Err(EngineError::Invalid(format!(
                    "duration_minutes must be between 1 and {MAX_DURATION_MINUTES}, got {minutes}"
                )));
            }
        validate_span(&Span {
            start: appointment.scheduled_at,
            end: appointment.end(),
        })?;

        let schedule = self.writable_schedule(&appointment.store_id).await?;
        let mut guard = schedule.write().await;
        self.reserve(ConflictKind::Appointment, &appointment.id, &appointment.store_id)?;
        info!(
            "appointment {} at {} in store {}",
            appointment.id, appointment.scheduled_at, appointment.store_id
        );
        guard.insert_appointment(appointment);
        Ok(())
    }

    pub async fn insert_block(&self, block: Block) -> Result<(), EngineError> {
        validate_id("id", &block.id)?;
        validate_id("store_id", &block.store_id)?;
        validate_optional_id("staff_id", block.staff_id.as_deref())?;
        validate_optional_id("resource_id", block.resource_id.as_deref())?;
        if block.staff_id.is_none() && block.resource_id.is_none() {
            return Err(EngineError::Invalid(
                "block needs a staff_id or a resource_id".into(),
            ));
        }
        if let Some(reason) = &block.reason
            && reason.len() > MAX_REASON_LEN {
                return Err(EngineError::LimitExceeded("block reason too long"));
            }
        validate_span(&block.span)?;

        let schedule = self.writable_schedule(&block.store_id).await?;
        let mut guard = schedule.write().await;
        self.reserve(ConflictKind::Block, &block.id, &block.store_id)?;
        info!(
            "block {} [{}, {}) in store {}",
            block.id, block.span.start, block.span.end, block.store_id
        );
        guard.insert_block(block);
        Ok(())
    }

    pub async fn insert_booking_item(&self, item: BookingItem) -> Result<(), EngineError> {
        validate_id("id", &item.id)?;
        validate_id("store_id", &item.store_id)?;
        validate_id("appointment_id", &item.appointment_id)?;
        validate_optional_id("staff_id", item.staff_id.as_deref())?;
        validate_optional_id("resource_id", item.resource_id.as_deref())?;
        validate_span(&item.span)?;
        if let Some(parent_store) = self
            .store
            .store_for_record(ConflictKind::Appointment, &item.appointment_id)
            && parent_store != item.store_id {
                return Err(EngineError::Invalid(format!(
                    "appointment {} belongs to store {parent_store}",
                    item.appointment_id
                )));
            }

        let schedule = self.writable_schedule(&item.store_id).await?;
        let mut guard = schedule.write().await;
        self.reserve(ConflictKind::BookingItem, &item.id, &item.store_id)?;
        info!(
            "booking item {} of appointment {} [{}, {}) in store {}",
            item.id, item.appointment_id, item.span.start, item.span.end, item.store_id
        );
        self.store.link_item(&item.appointment_id, &item.id);
        guard.insert_booking_item(item);
        Ok(())
    }

    /// Delete a record of the given kind. Returns the store it belonged to.
    pub async fn delete_record(&self, kind: ConflictKind, id: &str) -> Result<String, EngineError> {
        let store_id = self
            .store
            .store_for_record(kind, id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let schedule = self
            .store
            .schedule(&store_id)
            .ok_or_else(|| EngineError::NotFound(store_id.clone()))?;
        let mut guard = schedule.write().await;
        let parent = match kind {
            ConflictKind::BookingItem => guard
                .booking_items
                .iter()
                .find(|i| i.id == id)
                .map(|i| i.appointment_id.clone()),
            _ => None,
        };
        if !guard.remove(kind, id) {
            return Err(EngineError::NotFound(id.to_string()));
        }
        self.store.unmap_record(kind, id);
        if let Some(parent) = parent {
            self.store.unlink_item(&parent, id);
        }
        info!("deleted {} {id} from store {store_id}", kind.as_str());
        Ok(store_id)
    }

    /// Change an appointment's status (e.g. cancel it or mark a no-show).
    pub async fn set_appointment_status(&self, id: &str, status: Status) -> Result<(), EngineError> {
        let schedule = self.schedule_of(ConflictKind::Appointment, id)?;
        let mut guard = schedule.write().await;
        let appointment = guard
            .appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        info!("appointment {id}: {} -> {}", appointment.status.as_str(), status.as_str());
        appointment.status = status;
        Ok(())
    }

    pub async fn set_booking_item_status(&self, id: &str, status: Status) -> Result<(), EngineError> {
        let schedule = self.schedule_of(ConflictKind::BookingItem, id)?;
        let mut guard = schedule.write().await;
        let item = guard
            .booking_items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        info!("booking item {id}: {} -> {}", item.status.as_str(), status.as_str());
        item.status = status;
        Ok(())
    }

    fn schedule_of(&self, kind: ConflictKind, id: &str) -> Result<SharedSchedule, EngineError> {
        let store_id = self
            .store
            .store_for_record(kind, id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        self.store
            .schedule(&store_id)
            .ok_or(EngineError::NotFound(store_id))
    }
}
