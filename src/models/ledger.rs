use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Store,
    Courier,
}

impl OwnerKind {
    pub fn parse(raw: &str) -> Option<OwnerKind> {
        match raw {
            "store" => Some(OwnerKind::Store),
            "courier" => Some(OwnerKind::Courier),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OwnerKind::Store => "store",
            OwnerKind::Courier => "courier",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// tagged owner reference shared by balances and transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: Uuid,
}

impl OwnerRef {
    pub fn store(id: Uuid) -> Self {
        Self {
            kind: OwnerKind::Store,
            id,
        }
    }

    pub fn courier(id: Uuid) -> Self {
        Self {
            kind: OwnerKind::Courier,
            id,
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BalanceField {
    Available,
    Pending,
}

// invariant: total == available + pending at every observation point
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Balance {
    pub owner: OwnerRef,
    pub available: i64,
    pub pending: i64,
    pub total: i64,
}

impl Balance {
    pub fn zero(owner: OwnerRef) -> Self {
        Self {
            owner,
            available: 0,
            pending: 0,
            total: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Commission,
    DeliveryFee,
    Increment,
    Decrement,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub owner: OwnerRef,
    pub kind: TransactionKind,
    pub amount: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
