use serde::Serialize;
use uuid::Uuid;

use crate::models::assignment::Assignment;
use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderStatusChanged {
        order_id: Uuid,
        old: OrderStatus,
        new: OrderStatus,
    },
    AssignmentCreated {
        assignment: Assignment,
    },
    AssignmentExpired {
        assignment_id: Uuid,
        order_id: Uuid,
        courier_id: Uuid,
    },
    ManualAssignmentRequired {
        order_id: Uuid,
        attempts: u32,
    },
    OrderNotAcceptedOnTime {
        order_id: Uuid,
        waited_secs: i64,
    },
}
