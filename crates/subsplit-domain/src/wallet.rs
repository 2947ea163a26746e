//! Wallet ledger entries produced when debts move money.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// An append-only income or expense record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Magnitude of the movement; the sign comes from `kind`.
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt_id: Option<Uuid>,
}

impl WalletTransaction {
    /// Amount with income positive and expense negative.
    pub fn signed_amount(&self) -> Decimal {
        self.kind.apply_sign(self.amount)
    }
}

impl Identifiable for WalletTransaction {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Amounted for WalletTransaction {
    fn amount(&self) -> Decimal {
        self.amount
    }
}

impl Displayable for WalletTransaction {
    fn display_label(&self) -> String {
        format!("{} {} {} ({})", self.date.date_naive(), self.kind, self.amount, self.category)
    }
}

/// Input for appending a [`WalletTransaction`]; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWalletTransaction {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub service_id: Option<Uuid>,
    pub subscriber_id: Option<Uuid>,
    pub debt_id: Option<Uuid>,
}

impl NewWalletTransaction {
    pub fn new(
        kind: TransactionKind,
        amount: Decimal,
        category: impl Into<String>,
        description: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            amount,
            category: category.into(),
            description: description.into(),
            date,
            service_id: None,
            subscriber_id: None,
            debt_id: None,
        }
    }

    /// Builds an entry whose signed value equals `signed`: positive values
    /// become income, negative values expense.
    pub fn from_signed(
        signed: Decimal,
        category: impl Into<String>,
        description: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        let kind = if signed < Decimal::ZERO {
            TransactionKind::Expense
        } else {
            TransactionKind::Income
        };
        Self::new(kind, signed.abs(), category, description, date)
    }

    pub fn linked_to(
        mut self,
        service_id: Uuid,
        subscriber_id: Option<Uuid>,
        debt_id: Uuid,
    ) -> Self {
        self.service_id = Some(service_id);
        self.subscriber_id = subscriber_id;
        self.debt_id = Some(debt_id);
        self
    }

    pub fn into_transaction(self, id: Uuid) -> WalletTransaction {
        WalletTransaction {
            id,
            kind: self.kind,
            amount: self.amount,
            category: self.category,
            description: self.description,
            date: self.date,
            service_id: self.service_id,
            subscriber_id: self.subscriber_id,
            debt_id: self.debt_id,
        }
    }
}

/// Category names stamped on entries the billing engine appends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletCategories {
    #[serde(default = "WalletCategories::default_subscriber_income")]
    pub subscriber_income: String,
    #[serde(default = "WalletCategories::default_owner_expense")]
    pub owner_expense: String,
    /// Used for compensating entries so reversals stay distinguishable from
    /// real payments.
    #[serde(default = "WalletCategories::default_correction")]
    pub correction: String,
}

impl WalletCategories {
    pub fn default_subscriber_income() -> String {
        "subscription-income".into()
    }

    pub fn default_owner_expense() -> String {
        "subscription-expense".into()
    }

    pub fn default_correction() -> String {
        "correction".into()
    }

    /// Category for a real payment moving money in direction `kind`.
    pub fn payment_category(&self, kind: TransactionKind) -> &str {
        match kind {
            TransactionKind::Income => &self.subscriber_income,
            TransactionKind::Expense => &self.owner_expense,
        }
    }
}

impl Default for WalletCategories {
    fn default() -> Self {
        Self {
            subscriber_income: Self::default_subscriber_income(),
            owner_expense: Self::default_owner_expense(),
            correction: Self::default_correction(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
/// Direction of a wallet movement.
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn apply_sign(self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        };
        f.write_str(label)
    }
}
