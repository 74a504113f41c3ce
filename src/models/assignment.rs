use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentState {
    Assigned,
    Accepted,
    InTransit,
    Delivered,
    Rejected,
    TimedOut,
    Cancelled,
    Failed,
}

impl AssignmentState {
    // terminal rows are never reused; re-dispatch creates a fresh row
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AssignmentState::Delivered
                | AssignmentState::Rejected
                | AssignmentState::TimedOut
                | AssignmentState::Cancelled
                | AssignmentState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentState::Assigned => "assigned",
            AssignmentState::Accepted => "accepted",
            AssignmentState::InTransit => "in_transit",
            AssignmentState::Delivered => "delivered",
            AssignmentState::Rejected => "rejected",
            AssignmentState::TimedOut => "timed_out",
            AssignmentState::Cancelled => "cancelled",
            AssignmentState::Failed => "failed",
        }
    }
}

impl fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub state: AssignmentState,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub distance_km: f64,
    pub estimated_duration_secs: u32,
    pub estimated_earning: i64,
}
