use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::DomainEvent;
use crate::ledger::LedgerService;
use crate::models::ledger::{BalanceField, OwnerRef, TransactionKind};
use crate::models::order::OrderStatus;
use crate::observability::metrics::Metrics;
use crate::store::OrderStore;

pub struct SettlementListener {
    orders: Arc<OrderStore>,
    ledger: Arc<LedgerService>,
    metrics: Metrics,
    // (order, transition) pairs already settled; redelivered events no-op
    applied: DashSet<(Uuid, OrderStatus)>,
}

impl SettlementListener {
    pub fn new(orders: Arc<OrderStore>, ledger: Arc<LedgerService>, metrics: Metrics) -> Self {
        Self {
            orders,
            ledger,
            metrics,
            applied: DashSet::new(),
        }
    }

    pub async fn on_status_changed(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<(), AppError> {
        // only these two transitions move money; settling anywhere else
        // would double-count against them
        if !matches!(new_status, OrderStatus::OnTheWay | OrderStatus::Delivered) {
            return Ok(());
        }

        let order = self
            .orders
            .get(order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let Some(courier_id) = order.courier_id else {
            warn!(order_id = %order_id, status = %new_status, "no courier on order; settlement skipped");
            return Ok(());
        };

        if !self.applied.insert((order_id, new_status)) {
            debug!(order_id = %order_id, status = %new_status, "settlement already applied");
            return Ok(());
        }

        let store = OwnerRef::store(order.store_id);
        let courier = OwnerRef::courier(courier_id);

        match new_status {
            OrderStatus::OnTheWay => {
                let amount = order.store_amount();
                self.ledger
                    .apply_delta(
                        store,
                        BalanceField::Pending,
                        -amount,
                        TransactionKind::Decrement,
                        Some(order_id),
                    )
                    .await?;
                self.ledger
                    .apply_delta(
                        courier,
                        BalanceField::Pending,
                        amount,
                        TransactionKind::Increment,
                        Some(order_id),
                    )
                    .await?;
                self.metrics
                    .settlements_total
                    .with_label_values(&["on_the_way"])
                    .inc();
                info!(
                    order_id = %order_id,
                    amount,
                    store = %store,
                    courier = %courier,
                    "store-to-courier pending transfer applied"
                );
            }
            OrderStatus::Delivered => {
                let commission = order.commission();
                self.ledger
                    .apply_delta(
                        store,
                        BalanceField::Available,
                        commission,
                        TransactionKind::Commission,
                        Some(order_id),
                    )
                    .await?;
                self.ledger
                    .apply_delta(
                        courier,
                        BalanceField::Available,
                        order.delivery_fee,
                        TransactionKind::DeliveryFee,
                        Some(order_id),
                    )
                    .await?;
                self.metrics
                    .settlements_total
                    .with_label_values(&["delivered"])
                    .inc();
                info!(
                    order_id = %order_id,
                    commission,
                    delivery_fee = order.delivery_fee,
                    "delivery settlement applied"
                );
            }
            _ => {}
        }

        Ok(())
    }
}

pub async fn run_settlement_listener(
    listener: Arc<SettlementListener>,
    mut rx: broadcast::Receiver<DomainEvent>,
) {
    info!("settlement listener started");

    loop {
        match rx.recv().await {
            Ok(DomainEvent::OrderStatusChanged { order_id, new, .. }) => {
                if let Err(err) = listener.on_status_changed(order_id, new).await {
                    error!(order_id = %order_id, error = %err, "settlement failed");
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "settlement listener lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    warn!("settlement listener stopped: event channel closed");
}
