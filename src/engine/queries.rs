use crate::model::*;

use super::Engine;

impl Engine {
    pub async fn list_appointments(&self, store_id: &str) -> Vec<Appointment> {
        let Some(schedule) = self.store.schedule(store_id) else {
            return Vec::new();
        };
        let guard = schedule.read().await;
        guard.appointments.clone()
    }

    pub async fn list_blocks(&self, store_id: &str) -> Vec<Block> {
        let Some(schedule) = self.store.schedule(store_id) else {
            return Vec::new();
        };
        let guard = schedule.read().await;
        guard.blocks.clone()
    }

    pub async fn list_booking_items(&self, store_id: &str) -> Vec<BookingItem> {
        let Some(schedule) = self.store.schedule(store_id) else {
            return Vec::new();
        };
        let guard = schedule.read().await;
        guard.booking_items.clone()
    }

    /// Booking items that name `appointment_id` as parent, in start order.
    /// Found through the item index, so items outlive a deleted or missing parent.
    pub async fn booking_items_of(&self, appointment_id: &str) -> Vec<BookingItem> {
        let mut items = Vec::new();
        for store_id in self.store.stores_with_items_of(appointment_id) {
            items.extend(
                self.list_booking_items(&store_id)
                    .await
                    .into_iter()
                    .filter(|i| i.appointment_id == appointment_id),
            );
        }
        items.sort_by_key(|i| i.span.start);
        items
    }

    pub async fn get_appointment(&self, id: &str) -> Option<Appointment> {
        let store_id = self.store.store_for_record(ConflictKind::Appointment, id)?;
        let schedule = self.store.schedule(&store_id)?;
        let guard = schedule.read().await;
        guard.appointments.iter().find(|a| a.id == id).cloned()
    }
}
