use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

use super::StoreError;

/// Which store and which subject a fetch is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectScope {
    pub store_id: String,
    pub subject: Subject,
}

/// `store_id = ? AND <subject column> = ? AND status NOT IN (cancelled, no_show)
///  AND scheduled_at < before [AND id <> exclude_id]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentQuery {
    pub scope: SubjectScope,
    pub before: Ms,
    pub exclude_id: Option<String>,
}

/// `store_id = ? AND <subject column> = ? AND start < window.end AND end > window.start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockQuery {
    pub scope: SubjectScope,
    pub window: Span,
}

/// `store_id = ? AND <subject column> = ? AND status <> cancelled
///  AND start < before [AND appointment_id <> exclude_parent]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingItemQuery {
    pub scope: SubjectScope,
    pub before: Ms,
    pub exclude_parent: Option<String>,
}

/// Read access to the three record kinds a conflict check looks at.
///
/// Implementations return an empty `Vec` when nothing matches and reserve
/// `Err` for genuine I/O failure.
#[async_trait]
pub trait IntervalStore: Send + Sync {
    async fn appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError>;

    async fn blocks(&self, query: &BlockQuery) -> Result<Vec<Block>, StoreError>;

    async fn booking_items(&self, query: &BookingItemQuery) -> Result<Vec<BookingItem>, StoreError>;
}

// ── Per-store schedule ───────────────────────────────────────────

/// All records of one store, each list sorted by start time.
#[derive(Debug, Default)]
pub struct StoreSchedule {
    pub appointments: Vec<Appointment>,
    pub blocks: Vec<Block>,
    pub booking_items: Vec<BookingItem>,
}

pub type SharedSchedule = Arc<RwLock<StoreSchedule>>;

fn insert_sorted<T>(list: &mut Vec<T>, item: T, start: impl Fn(&T) -> Ms) {
    let key = start(&item);
    let pos = list
        .binary_search_by_key(&key, |existing| start(existing))
        .unwrap_or_else(|e| e);
    list.insert(pos, item);
}

impl StoreSchedule {
    pub fn len(&self) -> usize {
        self.appointments.len() + self.blocks.len() + self.booking_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert_appointment(&mut self, appointment: Appointment) {
        insert_sorted(&mut self.appointments, appointment, |a| a.scheduled_at);
    }

    pub fn insert_block(&mut self, block: Block) {
        insert_sorted(&mut self.blocks, block, |b| b.span.start);
    }

    pub fn insert_booking_item(&mut self, item: BookingItem) {
        insert_sorted(&mut self.booking_items, item, |i| i.span.start);
    }

    pub fn remove(&mut self, kind: ConflictKind, id: &str) -> bool {
        fn take<T>(list: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> bool {
            match list.iter().position(matches) {
                Some(pos) => {
                    list.remove(pos);
                    true
                }
                None => false,
            }
        }
        match kind {
            ConflictKind::Appointment => take(&mut self.appointments, |a| a.id == id),
            ConflictKind::Block => take(&mut self.blocks, |b| b.id == id),
            ConflictKind::BookingItem => take(&mut self.booking_items, |i| i.id == id),
        }
    }

    /// Appointments starting before `before` (the only bound the store can push
    /// down, since their end is derived).
    pub fn appointments_starting_before(&self, before: Ms) -> &[Appointment] {
        let right = self.appointments.partition_point(|a| a.scheduled_at < before);
        &self.appointments[..right]
    }

    /// Blocks whose span overlaps `window`.
    pub fn blocks_overlapping(&self, window: &Span) -> impl Iterator<Item = &Block> {
        let right = self.blocks.partition_point(|b| b.span.start < window.end);
        self.blocks[..right]
            .iter()
            .filter(move |b| b.span.end > window.start)
    }

    pub fn booking_items_starting_before(&self, before: Ms) -> &[BookingItem] {
        let right = self.booking_items.partition_point(|i| i.span.start < before);
        &self.booking_items[..right]
    }
}

// ── In-memory store ──────────────────────────────────────────────

pub struct InMemoryStore {
    schedules: DashMap<String, SharedSchedule>,
    /// Reverse lookup: (kind, record id) → store id
    record_to_store: DashMap<(ConflictKind, String), String>,
    /// appointment id → ids of booking items naming it as parent
    items_by_appointment: DashMap<String, Vec<String>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            schedules: DashMap::new(),
            record_to_store: DashMap::new(),
            items_by_appointment: DashMap::new(),
        }
    }

    pub fn store_count(&self) -> usize {
        self.schedules.len()
    }

    pub fn contains_store(&self, store_id: &str) -> bool {
        self.schedules.contains_key(store_id)
    }

    pub fn schedule(&self, store_id: &str) -> Option<SharedSchedule> {
        self.schedules.get(store_id).map(|e| e.value().clone())
    }

    pub fn schedule_or_default(&self, store_id: &str) -> SharedSchedule {
        self.schedules
            .entry(store_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    // ── Record index ─────────────────────────────────────────

    pub fn store_for_record(&self, kind: ConflictKind, id: &str) -> Option<String> {
        self.record_to_store
            .get(&(kind, id.to_string()))
            .map(|e| e.value().clone())
    }

    /// Claim `id` for `store_id`. False if the id is already taken, in any store.
    pub fn reserve_record(&self, kind: ConflictKind, id: String, store_id: String) -> bool {
        match self.record_to_store.entry((kind, id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(store_id);
                true
            }
        }
    }

    pub fn unmap_record(&self, kind: ConflictKind, id: &str) {
        self.record_to_store.remove(&(kind, id.to_string()));
    }

    pub fn link_item(&self, appointment_id: &str, item_id: &str) {
        self.items_by_appointment
            .entry(appointment_id.to_string())
            .or_default()
            .push(item_id.to_string());
    }

    pub fn unlink_item(&self, appointment_id: &str, item_id: &str) {
        if let Some(mut ids) = self.items_by_appointment.get_mut(appointment_id) {
            ids.retain(|id| id != item_id);
        }
        self.items_by_appointment
            .remove_if(appointment_id, |_, ids| ids.is_empty());
    }

    /// Stores holding booking items of `appointment_id`, whether or not the
    /// appointment itself exists.
    pub fn stores_with_items_of(&self, appointment_id: &str) -> Vec<String> {
        let item_ids = self
            .items_by_appointment
            .get(appointment_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        let mut stores: Vec<String> = item_ids
            .iter()
            .filter_map(|id| self.store_for_record(ConflictKind::BookingItem, id))
            .collect();
        stores.sort();
        stores.dedup();
        stores
    }
}

#[async_trait]
impl IntervalStore for InMemoryStore {
    async fn appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, StoreError> {
        let Some(schedule) = self.schedule(&query.scope.store_id) else {
            return Ok(Vec::new());
        };
        let guard = schedule.read().await;
        Ok(guard
            .appointments_starting_before(query.before)
            .iter()
            .filter(|a| a.status.holds_appointment_slot())
            .filter(|a| {
                query
                    .scope
                    .subject
                    .matches(a.staff_id.as_deref(), a.resource_id.as_deref())
            })
            .filter(|a| query.exclude_id.as_deref() != Some(a.id.as_str()))
            .cloned()
            .collect())
    }

    async fn blocks(&self, query: &BlockQuery) -> Result<Vec<Block>, StoreError> {
        let Some(schedule) = self.schedule(&query.scope.store_id) else {
            return Ok(Vec::new());
        };
        let guard = schedule.read().await;
        Ok(guard
            .blocks_overlapping(&query.window)
            .filter(|b| {
                query
                    .scope
                    .subject
                    .matches(b.staff_id.as_deref(), b.resource_id.as_deref())
            })
            .cloned()
            .collect())
    }

    async fn booking_items(&self, query: &BookingItemQuery) -> Result<Vec<BookingItem>, StoreError> {
        let Some(schedule) = self.schedule(&query.scope.store_id) else {
            return Ok(Vec::new());
        };
        let guard = schedule.read().await;
        Ok(guard
            .booking_items_starting_before(query.before)
            .iter()
            .filter(|i| i.status.holds_item_slot())
            .filter(|i| {
                query
                    .scope
                    .subject
                    .matches(i.staff_id.as_deref(), i.resource_id.as_deref())
            })
            .filter(|i| query.exclude_parent.as_deref() != Some(i.appointment_id.as_str()))
            .cloned()
            .collect())
    }
}
