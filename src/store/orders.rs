use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::order::{Order, OrderStatus, StatusHistoryEntry};

// orders plus their append-only status history; the per-order mutex serializes
// every writer that touches one order (transitions, dispatch, timeouts)
pub struct OrderStore {
    orders: DashMap<Uuid, Order>,
    history: DashMap<Uuid, Vec<StatusHistoryEntry>>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            history: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    pub fn lock_for(&self, order_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn insert(&self, order: Order) {
        self.history.entry(order.id).or_default().push(StatusHistoryEntry {
            status: order.status,
            note: None,
            at: order.created_at,
        });
        self.orders.insert(order.id, order);
    }

    pub fn get(&self, order_id: Uuid) -> Option<Order> {
        self.orders.get(&order_id).map(|o| o.value().clone())
    }

    pub fn update<F>(&self, order_id: Uuid, f: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let mut entry = self.orders.get_mut(&order_id)?;
        f(&mut entry);
        Some(entry.clone())
    }

    pub fn append_history(&self, order_id: Uuid, entry: StatusHistoryEntry) {
        self.history.entry(order_id).or_default().push(entry);
    }

    pub fn history(&self, order_id: Uuid) -> Vec<StatusHistoryEntry> {
        self.history
            .get(&order_id)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    pub fn status_entered_at(&self, order_id: Uuid, status: OrderStatus) -> Option<DateTime<Utc>> {
        self.history
            .get(&order_id)?
            .iter()
            .rev()
            .find(|entry| entry.status == status)
            .map(|entry| entry.at)
    }

    pub fn with_status(&self, status: OrderStatus) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}
