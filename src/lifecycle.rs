use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::queue::{DispatchJob, enqueue_dispatch};
use crate::error::AppError;
use crate::events::DomainEvent;
use crate::models::assignment::AssignmentState;
use crate::models::order::{Order, OrderStatus, StatusHistoryEntry};
use crate::observability::metrics::Metrics;
use crate::store::{AssignmentStore, OrderStore};

pub struct OrderStateMachine {
    orders: Arc<OrderStore>,
    assignments: Arc<AssignmentStore>,
    events: broadcast::Sender<DomainEvent>,
    dispatch_tx: mpsc::Sender<DispatchJob>,
    metrics: Metrics,
}

impl OrderStateMachine {
    pub fn new(
        orders: Arc<OrderStore>,
        assignments: Arc<AssignmentStore>,
        events: broadcast::Sender<DomainEvent>,
        dispatch_tx: mpsc::Sender<DispatchJob>,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            assignments,
            events,
            dispatch_tx,
            metrics,
        }
    }

    pub async fn request_transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, AppError> {
        let lock = self.orders.lock_for(order_id);
        let _guard = lock.lock().await;

        let order = self
            .orders
            .get(order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let old = order.status;

        if old.is_terminal() {
            return Err(AppError::TerminalState(old));
        }
        if !old.can_transition_to(new_status) {
            return Err(AppError::InvalidTransition {
                from: old,
                allowed: old.allowed_next().to_vec(),
            });
        }

        let updated = self
            .orders
            .update(order_id, |o| {
                o.status = new_status;
                if new_status == OrderStatus::Delivered {
                    o.delivered_at = Some(Utc::now());
                }
            })
            .ok_or_else(|| AppError::Internal(format!("order {order_id} vanished mid-update")))?;

        self.orders.append_history(
            order_id,
            StatusHistoryEntry {
                status: new_status,
                note,
                at: Utc::now(),
            },
        );

        // the order's assignment follows the order
        match new_status {
            OrderStatus::Cancelled => {
                if let Some(active) = self.assignments.active_for_order(order_id) {
                    self.assignments
                        .update(active.id, |a| a.state = AssignmentState::Cancelled);
                    info!(
                        order_id = %order_id,
                        assignment_id = %active.id,
                        courier_id = %active.courier_id,
                        "active assignment cancelled with order"
                    );
                }
            }
            OrderStatus::OnTheWay => {
                if let Some(active) = self.assignments.active_for_order(order_id) {
                    self.assignments
                        .update(active.id, |a| a.state = AssignmentState::InTransit);
                }
            }
            OrderStatus::Delivered => {
                if let Some(active) = self.assignments.active_for_order(order_id) {
                    self.assignments
                        .update(active.id, |a| a.state = AssignmentState::Delivered);
                }
            }
            _ => {}
        }

        let _ = self.events.send(DomainEvent::OrderStatusChanged {
            order_id,
            old,
            new: new_status,
        });

        if new_status == OrderStatus::ReadyForDelivery {
            // the transition itself is already durable; dispatch happens off
            // this call path, so a full queue only delays the first attempt
            let job = DispatchJob {
                order_id,
                excluded: HashSet::new(),
            };
            if let Err(err) = enqueue_dispatch(&self.dispatch_tx, &self.metrics, job).await {
                error!(order_id = %order_id, error = %err, "failed to enqueue dispatch");
            }
        }

        info!(order_id = %order_id, from = %old, to = %new_status, "order status changed");
        Ok(updated)
    }
}
