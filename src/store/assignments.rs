use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::Assignment;

// every assignment row ever created, kept for audit; the active_* maps index
// the single non-terminal row an order or courier may hold at a time
pub struct AssignmentStore {
    assignments: DashMap<Uuid, Assignment>,
    by_order: DashMap<Uuid, Vec<Uuid>>,
    active_by_order: DashMap<Uuid, Uuid>,
    active_by_courier: DashMap<Uuid, Uuid>,
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self {
            assignments: DashMap::new(),
            by_order: DashMap::new(),
            active_by_order: DashMap::new(),
            active_by_courier: DashMap::new(),
        }
    }

    pub fn get(&self, assignment_id: Uuid) -> Option<Assignment> {
        self.assignments
            .get(&assignment_id)
            .map(|a| a.value().clone())
    }

    pub fn all(&self) -> Vec<Assignment> {
        self.assignments.iter().map(|a| a.value().clone()).collect()
    }

    pub fn active_for_order(&self, order_id: Uuid) -> Option<Assignment> {
        let id = *self.active_by_order.get(&order_id)?;
        self.get(id)
    }

    pub fn has_active_for_courier(&self, courier_id: Uuid) -> bool {
        self.active_by_courier.contains_key(&courier_id)
    }

    pub fn active_count(&self) -> usize {
        self.active_by_order.len()
    }

    // conditional write: fails if the order already holds a non-terminal row
    pub fn insert_active(&self, assignment: Assignment) -> Result<Assignment, AppError> {
        match self.active_by_order.entry(assignment.order_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "order {} already has an active assignment",
                assignment.order_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(assignment.id);
                self.active_by_courier
                    .insert(assignment.courier_id, assignment.id);
                self.by_order
                    .entry(assignment.order_id)
                    .or_default()
                    .push(assignment.id);
                self.assignments.insert(assignment.id, assignment.clone());
                Ok(assignment)
            }
        }
    }

    pub fn update<F>(&self, assignment_id: Uuid, f: F) -> Option<Assignment>
    where
        F: FnOnce(&mut Assignment),
    {
        let updated = {
            let mut entry = self.assignments.get_mut(&assignment_id)?;
            f(&mut entry);
            entry.clone()
        };
        if updated.state.is_terminal() {
            self.active_by_order
                .remove_if(&updated.order_id, |_, id| *id == assignment_id);
            self.active_by_courier
                .remove_if(&updated.courier_id, |_, id| *id == assignment_id);
        }
        Some(updated)
    }

    pub fn for_order(&self, order_id: Uuid) -> Vec<Assignment> {
        self.by_order
            .get(&order_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(*id)).collect())
            .unwrap_or_default()
    }

    pub fn attempts(&self, order_id: Uuid) -> u32 {
        self.by_order
            .get(&order_id)
            .map(|ids| ids.len() as u32)
            .unwrap_or(0)
    }

    pub fn tried_couriers(&self, order_id: Uuid) -> HashSet<Uuid> {
        self.for_order(order_id)
            .into_iter()
            .map(|a| a.courier_id)
            .collect()
    }

    pub fn first_assigned_at(&self, order_id: Uuid) -> Option<DateTime<Utc>> {
        let first_id = *self.by_order.get(&order_id)?.first()?;
        self.get(first_id).map(|a| a.assigned_at)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl Default for AssignmentStore {
    fn default() -> Self {
        Self::new()
    }
}
