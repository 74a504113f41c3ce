use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::queue::{DispatchJob, enqueue_dispatch};
use crate::engine::timeout::spawn_timeout;
use crate::error::AppError;
use crate::events::DomainEvent;
use crate::geo::GeoIndex;
use crate::models::assignment::{Assignment, AssignmentState};
use crate::models::order::OrderStatus;
use crate::notify::CourierNotifier;
use crate::observability::metrics::Metrics;
use crate::state::AppState;
use crate::store::{AssignmentStore, OrderStore};

const AVG_COURIER_SPEED_KMH: f64 = 25.0;

pub struct CourierAssignmentEngine {
    orders: Arc<OrderStore>,
    assignments: Arc<AssignmentStore>,
    geo: Arc<GeoIndex>,
    events: broadcast::Sender<DomainEvent>,
    dispatch_tx: mpsc::Sender<DispatchJob>,
    notifier: Arc<dyn CourierNotifier>,
    config: Config,
    metrics: Metrics,
}

impl CourierAssignmentEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<OrderStore>,
        assignments: Arc<AssignmentStore>,
        geo: Arc<GeoIndex>,
        events: broadcast::Sender<DomainEvent>,
        dispatch_tx: mpsc::Sender<DispatchJob>,
        notifier: Arc<dyn CourierNotifier>,
        config: Config,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            assignments,
            geo,
            events,
            dispatch_tx,
            notifier,
            config,
            metrics,
        }
    }

    pub async fn dispatch(
        &self,
        order_id: Uuid,
        excluded: &HashSet<Uuid>,
    ) -> Result<Assignment, AppError> {
        let lock = self.orders.lock_for(order_id);
        let _guard = lock.lock().await;

        let order = self
            .orders
            .get(order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        if order.status != OrderStatus::ReadyForDelivery {
            return Err(AppError::Conflict(format!(
                "order {order_id} is {}, not ready for delivery",
                order.status
            )));
        }

        // a second dispatch for the same order returns the live row untouched
        if let Some(active) = self.assignments.active_for_order(order_id) {
            debug!(
                order_id = %order_id,
                assignment_id = %active.id,
                "dispatch no-op: active assignment exists"
            );
            return Ok(active);
        }

        let winner = self
            .geo
            .candidates(&order.pickup, self.config.location_staleness(), excluded)
            .into_iter()
            .find(|c| !self.assignments.has_active_for_courier(c.courier_id))
            .ok_or(AppError::NoAvailableCourier)?;

        let now = Utc::now();
        let assignment = self.assignments.insert_active(Assignment {
            id: Uuid::new_v4(),
            order_id,
            courier_id: winner.courier_id,
            state: AssignmentState::Assigned,
            assigned_at: now,
            expires_at: now + self.config.response_window(),
            accepted_at: None,
            pickup: order.pickup,
            dropoff: order.dropoff,
            distance_km: winner.distance_km,
            estimated_duration_secs: estimated_duration_secs(winner.distance_km),
            estimated_earning: order.delivery_fee,
        })?;

        let _ = self.events.send(DomainEvent::AssignmentCreated {
            assignment: assignment.clone(),
        });
        self.notifier
            .notify_assignment(assignment.courier_id, order_id, assignment.id);

        info!(
            order_id = %order_id,
            courier_id = %assignment.courier_id,
            assignment_id = %assignment.id,
            distance_km = assignment.distance_km,
            "courier assigned"
        );
        Ok(assignment)
    }

    pub async fn accept(
        &self,
        assignment_id: Uuid,
        courier_id: Uuid,
    ) -> Result<Assignment, AppError> {
        let assignment = self
            .assignments
            .get(assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

        let lock = self.orders.lock_for(assignment.order_id);
        let _guard = lock.lock().await;

        // reload under the lock: a timeout or cancel may have won the race
        let assignment = self
            .assignments
            .get(assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;
        if assignment.state != AssignmentState::Assigned
            || assignment.courier_id != courier_id
            || Utc::now() >= assignment.expires_at
        {
            return Err(AppError::AssignmentExpiredOrTaken);
        }

        let updated = self
            .assignments
            .update(assignment_id, |a| {
                a.state = AssignmentState::Accepted;
                a.accepted_at = Some(Utc::now());
            })
            .ok_or_else(|| {
                AppError::Internal(format!("assignment {assignment_id} vanished mid-update"))
            })?;
        self.orders
            .update(assignment.order_id, |o| o.courier_id = Some(courier_id));

        info!(
            assignment_id = %assignment_id,
            order_id = %assignment.order_id,
            courier_id = %courier_id,
            "assignment accepted"
        );
        Ok(updated)
    }

    pub async fn reject(
        &self,
        assignment_id: Uuid,
        courier_id: Uuid,
        reason: Option<String>,
    ) -> Result<Assignment, AppError> {
        let assignment = self
            .assignments
            .get(assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

        let lock = self.orders.lock_for(assignment.order_id);
        let updated = {
            let _guard = lock.lock().await;

            let assignment = self
                .assignments
                .get(assignment_id)
                .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;
            if assignment.state != AssignmentState::Assigned || assignment.courier_id != courier_id {
                return Err(AppError::AssignmentExpiredOrTaken);
            }

            self.assignments
                .update(assignment_id, |a| a.state = AssignmentState::Rejected)
                .ok_or_else(|| {
                    AppError::Internal(format!("assignment {assignment_id} vanished mid-update"))
                })?
        };

        warn!(
            assignment_id = %assignment_id,
            order_id = %updated.order_id,
            courier_id = %courier_id,
            reason = reason.as_deref().unwrap_or("unspecified"),
            "assignment rejected"
        );

        // immediately retry against the next-best courier
        let job = DispatchJob {
            order_id: updated.order_id,
            excluded: self.assignments.tried_couriers(updated.order_id),
        };
        if let Err(err) = enqueue_dispatch(&self.dispatch_tx, &self.metrics, job).await {
            error!(order_id = %updated.order_id, error = %err, "failed to enqueue redispatch");
        }

        Ok(updated)
    }
}

fn estimated_duration_secs(distance_km: f64) -> u32 {
    (distance_km / AVG_COURIER_SPEED_KMH * 3_600.0).round() as u32
}

pub async fn run_dispatch_worker(state: Arc<AppState>, mut rx: mpsc::Receiver<DispatchJob>) {
    info!("dispatch worker started");

    while let Some(job) = rx.recv().await {
        state.metrics.dispatch_queue_depth.dec();

        let start = Instant::now();
        let outcome = match state.dispatcher.dispatch(job.order_id, &job.excluded).await {
            Ok(assignment) => {
                if assignment.state == AssignmentState::Assigned {
                    spawn_timeout(state.timeouts.clone(), &assignment);
                }
                "success"
            }
            Err(AppError::NoAvailableCourier) => {
                warn!(order_id = %job.order_id, "no courier available; order waits for the next sweep");
                "no_courier"
            }
            Err(AppError::Conflict(msg)) => {
                debug!(order_id = %job.order_id, msg = %msg, "dispatch skipped");
                "skipped"
            }
            Err(err) => {
                error!(order_id = %job.order_id, error = %err, "dispatch failed");
                "error"
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        state
            .metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed);
        state
            .metrics
            .dispatch_total
            .with_label_values(&[outcome])
            .inc();
    }

    warn!("dispatch worker stopped: queue channel closed");
}
