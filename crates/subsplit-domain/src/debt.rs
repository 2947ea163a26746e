//! Monthly debt records owed by the service owner or by a subscriber.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{common::*, month::BillingMonth, wallet::TransactionKind};

/// One month's obligation for a service owner or one of its subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Debt {
    pub id: Uuid,
    pub month: BillingMonth,
    /// Snapshot of the cost or quota when the debt was generated.
    pub amount: Decimal,
    pub status: DebtStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Debt {
    pub fn is_paid(&self) -> bool {
        self.status == DebtStatus::Paid
    }

    pub fn is_pending(&self) -> bool {
        self.status == DebtStatus::Pending
    }

    pub fn mark_paid(&mut self, paid_at: DateTime<Utc>) {
        self.status = DebtStatus::Paid;
        self.paid_at = Some(paid_at);
    }

    pub fn mark_pending(&mut self) {
        self.status = DebtStatus::Pending;
        self.paid_at = None;
    }
}

impl Identifiable for Debt {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Amounted for Debt {
    fn amount(&self) -> Decimal {
        self.amount
    }
}

impl Displayable for Debt {
    fn display_label(&self) -> String {
        format!("{} · {} [{}]", self.month, self.amount, self.status)
    }
}

/// Input for creating a [`Debt`]; new debts always start pending.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDebt {
    pub month: BillingMonth,
    pub amount: Decimal,
}

impl NewDebt {
    pub fn new(month: BillingMonth, amount: Decimal) -> Self {
        Self { month, amount }
    }

    pub fn into_debt(self, id: Uuid, now: DateTime<Utc>) -> Debt {
        Debt {
            id,
            month: self.month,
            amount: self.amount,
            status: DebtStatus::Pending,
            paid_at: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
/// Lifecycle state of a debt. Deletion is terminal and has no stored state.
pub enum DebtStatus {
    #[default]
    Pending,
    Paid,
}

impl fmt::Display for DebtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DebtStatus::Pending => "pending",
            DebtStatus::Paid => "paid",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "party", rename_all = "camelCase")]
/// Identifies whose debts a collection holds.
pub enum DebtScope {
    /// The owner owes the upstream provider the service's cost.
    #[serde(rename_all = "camelCase")]
    Owner { service_id: Uuid },
    /// A subscriber owes the owner their quota.
    #[serde(rename_all = "camelCase")]
    Subscriber {
        service_id: Uuid,
        subscriber_id: Uuid,
    },
}

impl DebtScope {
    pub fn owner(service_id: Uuid) -> Self {
        DebtScope::Owner { service_id }
    }

    pub fn subscriber(service_id: Uuid, subscriber_id: Uuid) -> Self {
        DebtScope::Subscriber {
            service_id,
            subscriber_id,
        }
    }

    pub fn service_id(&self) -> Uuid {
        match self {
            DebtScope::Owner { service_id } | DebtScope::Subscriber { service_id, .. } => {
                *service_id
            }
        }
    }

    pub fn subscriber_id(&self) -> Option<Uuid> {
        match self {
            DebtScope::Owner { .. } => None,
            DebtScope::Subscriber { subscriber_id, .. } => Some(*subscriber_id),
        }
    }

    /// Direction of the cash movement when a debt in this scope is paid:
    /// subscribers pay the owner, the owner pays the provider.
    pub fn payment_kind(&self) -> TransactionKind {
        match self {
            DebtScope::Owner { .. } => TransactionKind::Expense,
            DebtScope::Subscriber { .. } => TransactionKind::Income,
        }
    }
}

impl fmt::Display for DebtScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebtScope::Owner { service_id } => write!(f, "services/{service_id}/owner_debts"),
            DebtScope::Subscriber {
                service_id,
                subscriber_id,
            } => write!(
                f,
                "services/{service_id}/subscribers/{subscriber_id}/debts"
            ),
        }
    }
}
