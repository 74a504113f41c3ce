use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::queue::{DispatchJob, enqueue_dispatch};
use crate::error::AppError;
use crate::events::DomainEvent;
use crate::models::assignment::{Assignment, AssignmentState};
use crate::models::order::OrderStatus;
use crate::observability::metrics::Metrics;
use crate::store::{AssignmentStore, OrderStore};

pub struct AssignmentTimeoutScheduler {
    orders: Arc<OrderStore>,
    assignments: Arc<AssignmentStore>,
    dispatch_tx: mpsc::Sender<DispatchJob>,
    events: broadcast::Sender<DomainEvent>,
    config: Config,
    metrics: Metrics,
    // orders already flagged late or escalated to operations; both signals
    // fire once per order
    flagged_late: DashSet<Uuid>,
    escalated: DashSet<Uuid>,
}

impl AssignmentTimeoutScheduler {
    pub fn new(
        orders: Arc<OrderStore>,
        assignments: Arc<AssignmentStore>,
        dispatch_tx: mpsc::Sender<DispatchJob>,
        events: broadcast::Sender<DomainEvent>,
        config: Config,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            assignments,
            dispatch_tx,
            events,
            config,
            metrics,
            flagged_late: DashSet::new(),
            escalated: DashSet::new(),
        }
    }

    // safe to run any number of times per assignment: only the `assigned`
    // state is acted on, everything else is a no-op
    pub async fn handle_timeout(&self, assignment_id: Uuid) -> Result<(), AppError> {
        let assignment = self
            .assignments
            .get(assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

        let lock = self.orders.lock_for(assignment.order_id);
        let _guard = lock.lock().await;

        let assignment = self
            .assignments
            .get(assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;
        if assignment.state != AssignmentState::Assigned {
            debug!(
                assignment_id = %assignment_id,
                state = %assignment.state,
                "assignment already resolved; timeout is a no-op"
            );
            return Ok(());
        }

        if self.orders.get(assignment.order_id).is_none() {
            self.assignments
                .update(assignment_id, |a| a.state = AssignmentState::Failed);
            warn!(
                assignment_id = %assignment_id,
                order_id = %assignment.order_id,
                "order missing for timed-out assignment; row marked failed"
            );
            return Ok(());
        }

        self.assignments
            .update(assignment_id, |a| a.state = AssignmentState::TimedOut);
        self.metrics.assignment_timeouts_total.inc();
        let _ = self.events.send(DomainEvent::AssignmentExpired {
            assignment_id,
            order_id: assignment.order_id,
            courier_id: assignment.courier_id,
        });
        warn!(
            assignment_id = %assignment_id,
            order_id = %assignment.order_id,
            courier_id = %assignment.courier_id,
            "assignment timed out"
        );

        let attempts = self.assignments.attempts(assignment.order_id);
        let spent = self
            .assignments
            .first_assigned_at(assignment.order_id)
            .map(|first| Utc::now() - first)
            .unwrap_or_else(chrono::Duration::zero);
        let cap = self.config.max_redispatch_attempts;
        if (cap > 0 && attempts >= cap) || spent >= self.config.redispatch_budget() {
            self.escalated.insert(assignment.order_id);
            let _ = self.events.send(DomainEvent::ManualAssignmentRequired {
                order_id: assignment.order_id,
                attempts,
            });
            warn!(
                order_id = %assignment.order_id,
                attempts,
                "redispatch budget exhausted; manual assignment required"
            );
            return Ok(());
        }

        let job = DispatchJob {
            order_id: assignment.order_id,
            excluded: self.assignments.tried_couriers(assignment.order_id),
        };
        enqueue_dispatch(&self.dispatch_tx, &self.metrics, job).await
    }

    pub async fn sweep_once(&self) {
        self.metrics
            .assignments_active
            .set(self.assignments.active_count() as i64);

        for order in self.orders.with_status(OrderStatus::ReadyForDelivery) {
            if self.escalated.contains(&order.id) {
                continue;
            }

            if self.assignments.attempts(order.id) == 0 {
                let entered = self
                    .orders
                    .status_entered_at(order.id, OrderStatus::ReadyForDelivery)
                    .unwrap_or(order.created_at);
                let waited = Utc::now() - entered;
                if waited >= self.config.store_confirmation_window()
                    && self.flagged_late.insert(order.id)
                {
                    let _ = self.events.send(DomainEvent::OrderNotAcceptedOnTime {
                        order_id: order.id,
                        waited_secs: waited.num_seconds(),
                    });
                    warn!(
                        order_id = %order.id,
                        waited_secs = waited.num_seconds(),
                        "ready order never dispatched in time"
                    );
                }
            }

            if self.assignments.active_for_order(order.id).is_none() {
                let job = DispatchJob {
                    order_id: order.id,
                    excluded: self.assignments.tried_couriers(order.id),
                };
                if let Err(err) = enqueue_dispatch(&self.dispatch_tx, &self.metrics, job).await {
                    error!(order_id = %order.id, error = %err, "sweep failed to enqueue dispatch");
                }
            }
        }
    }

    pub async fn run_ready_order_sweep(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("ready-order sweep started");

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }
}

pub fn spawn_timeout(scheduler: Arc<AssignmentTimeoutScheduler>, assignment: &Assignment) {
    let assignment_id = assignment.id;
    let expires_at = assignment.expires_at;

    tokio::spawn(async move {
        let delay = (expires_at - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(delay).await;
        if let Err(err) = scheduler.handle_timeout(assignment_id).await {
            error!(assignment_id = %assignment_id, error = %err, "timeout handling failed");
        }
    });
}
