use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::Config;
use crate::engine::dispatch::CourierAssignmentEngine;
use crate::engine::queue::DispatchJob;
use crate::engine::timeout::AssignmentTimeoutScheduler;
use crate::events::DomainEvent;
use crate::geo::GeoIndex;
use crate::ledger::LedgerService;
use crate::lifecycle::OrderStateMachine;
use crate::notify::{CourierNotifier, LogNotifier};
use crate::observability::metrics::Metrics;
use crate::settlement::SettlementListener;
use crate::store::{AssignmentStore, OrderStore};

pub struct AppState {
    pub config: Config,
    pub orders: Arc<OrderStore>,
    pub assignments: Arc<AssignmentStore>,
    pub geo: Arc<GeoIndex>,
    pub ledger: Arc<LedgerService>,
    pub lifecycle: Arc<OrderStateMachine>,
    pub dispatcher: Arc<CourierAssignmentEngine>,
    pub timeouts: Arc<AssignmentTimeoutScheduler>,
    pub settlement: Arc<SettlementListener>,
    pub events_tx: broadcast::Sender<DomainEvent>,
    pub dispatch_tx: mpsc::Sender<DispatchJob>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<DispatchJob>) {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(
        config: Config,
        notifier: Arc<dyn CourierNotifier>,
    ) -> (Self, mpsc::Receiver<DispatchJob>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let metrics = Metrics::new();

        let orders = Arc::new(OrderStore::new());
        let assignments = Arc::new(AssignmentStore::new());
        let geo = Arc::new(GeoIndex::new());
        let ledger = Arc::new(LedgerService::new(config.currency.clone()));

        let lifecycle = Arc::new(OrderStateMachine::new(
            orders.clone(),
            assignments.clone(),
            events_tx.clone(),
            dispatch_tx.clone(),
            metrics.clone(),
        ));
        let dispatcher = Arc::new(CourierAssignmentEngine::new(
            orders.clone(),
            assignments.clone(),
            geo.clone(),
            events_tx.clone(),
            dispatch_tx.clone(),
            notifier,
            config.clone(),
            metrics.clone(),
        ));
        let timeouts = Arc::new(AssignmentTimeoutScheduler::new(
            orders.clone(),
            assignments.clone(),
            dispatch_tx.clone(),
            events_tx.clone(),
            config.clone(),
            metrics.clone(),
        ));
        let settlement = Arc::new(SettlementListener::new(
            orders.clone(),
            ledger.clone(),
            metrics.clone(),
        ));

        (
            Self {
                config,
                orders,
                assignments,
                geo,
                ledger,
                lifecycle,
                dispatcher,
                timeouts,
                settlement,
                events_tx,
                dispatch_tx,
                metrics,
            },
            dispatch_rx,
        )
    }
}
