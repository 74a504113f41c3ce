use std::collections::HashSet;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub order_id: Uuid,
    pub excluded: HashSet<Uuid>,
}

pub async fn enqueue_dispatch(
    tx: &mpsc::Sender<DispatchJob>,
    metrics: &Metrics,
    job: DispatchJob,
) -> Result<(), AppError> {
    tx.send(job)
        .await
        .map_err(|err| AppError::Internal(format!("dispatch queue send failed: {err}")))?;

    metrics.dispatch_queue_depth.inc();
    Ok(())
}
