use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    ReadyForDelivery,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn allowed_next(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Processing, Cancelled],
            Processing => &[ReadyForDelivery, Cancelled],
            ReadyForDelivery => &[OnTheWay, Cancelled],
            OnTheWay => &[Delivered],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::ReadyForDelivery => "ready_for_delivery",
            OrderStatus::OnTheWay => "on_the_way",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// monetary fields are integer minor currency units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub total: i64,
    pub delivery_fee: i64,
    pub tax: i64,
    pub service_fee: i64,
    pub commission_bps: u32,
    pub created_at: DateTime<Utc>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn commission(&self) -> i64 {
        ((self.total as i128 * self.commission_bps as i128) / 10_000) as i64
    }

    pub fn store_amount(&self) -> i64 {
        self.total - self.commission()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}
