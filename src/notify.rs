use tracing::info;
use uuid::Uuid;

// notification delivery is an external collaborator; failures never roll back
// an assignment, so the contract is fire-and-forget
pub trait CourierNotifier: Send + Sync {
    fn notify_assignment(&self, courier_id: Uuid, order_id: Uuid, assignment_id: Uuid);
}

pub struct LogNotifier;

impl CourierNotifier for LogNotifier {
    fn notify_assignment(&self, courier_id: Uuid, order_id: Uuid, assignment_id: Uuid) {
        info!(
            courier_id = %courier_id,
            order_id = %order_id,
            assignment_id = %assignment_id,
            "courier notified of new assignment"
        );
    }
}
