//! Domain types for tracked services and the subscribers they are resold to.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{common::*, month::BillingMonth};

pub const MIN_BILLING_DAY: u32 = 1;
pub const MAX_BILLING_DAY: u32 = 31;

/// A recurring obligation the user owes or resells.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    /// Total monthly amount owed upstream by the owner.
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub billing_day: Option<u32>,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// Validated cost and billing day, required before any month can be
    /// materialized.
    pub fn billing_terms(&self) -> Result<BillingTerms, BillingTermsError> {
        let cost = self.cost.ok_or(BillingTermsError::MissingCost)?;
        let billing_day = self.billing_day.ok_or(BillingTermsError::MissingBillingDay)?;
        BillingTerms::new(cost, billing_day)
    }

    /// Month containing the service's start date.
    pub fn start_month(&self) -> BillingMonth {
        BillingMonth::from_date_clamped(self.start_date)
    }
}

impl Identifiable for Service {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for Service {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Input for creating a [`Service`]; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewService {
    pub name: String,
    pub cost: Option<Decimal>,
    pub billing_day: Option<u32>,
    pub start_date: Option<NaiveDate>,
}

impl NewService {
    pub fn new(name: impl Into<String>, cost: Decimal, billing_day: u32) -> Self {
        Self {
            name: name.into(),
            cost: Some(cost),
            billing_day: Some(billing_day),
            start_date: None,
        }
    }

    pub fn starting(mut self, start_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self
    }

    /// Materializes the draft. A missing start date defaults to the creation day.
    pub fn into_service(self, id: Uuid, now: DateTime<Utc>) -> Service {
        Service {
            id,
            name: self.name,
            cost: self.cost,
            billing_day: self.billing_day,
            start_date: self.start_date.unwrap_or_else(|| now.date_naive()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A person the owner resells access to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: Uuid,
    pub name: String,
    /// Amount this person owes the owner every month.
    pub quota: Decimal,
    pub start_date: NaiveDate,
    #[serde(default = "Subscriber::default_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn default_active() -> bool {
        true
    }

    pub fn start_month(&self) -> BillingMonth {
        BillingMonth::from_date_clamped(self.start_date)
    }
}

impl Identifiable for Subscriber {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for Subscriber {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Input for creating a [`Subscriber`]; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscriber {
    pub name: String,
    pub quota: Decimal,
    pub start_date: Option<NaiveDate>,
}

impl NewSubscriber {
    pub fn new(name: impl Into<String>, quota: Decimal) -> Self {
        Self {
            name: name.into(),
            quota,
            start_date: None,
        }
    }

    pub fn starting(mut self, start_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn into_subscriber(self, id: Uuid, now: DateTime<Utc>) -> Subscriber {
        Subscriber {
            id,
            name: self.name,
            quota: self.quota,
            start_date: self.start_date.unwrap_or_else(|| now.date_naive()),
            active: true,
            created_at: now,
        }
    }
}

/// Cost and billing day of a service after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingTerms {
    pub cost: Decimal,
    pub billing_day: u32,
}

impl BillingTerms {
    pub fn new(cost: Decimal, billing_day: u32) -> Result<Self, BillingTermsError> {
        if cost < Decimal::ZERO {
            return Err(BillingTermsError::NegativeCost(cost));
        }
        if !(MIN_BILLING_DAY..=MAX_BILLING_DAY).contains(&billing_day) {
            return Err(BillingTermsError::BillingDayOutOfRange(billing_day));
        }
        Ok(Self { cost, billing_day })
    }

    /// Due date of `month` under these terms.
    pub fn cutoff(&self, month: BillingMonth) -> NaiveDate {
        month.cutoff(self.billing_day)
    }

    /// Whether `month` has become due on `today`.
    pub fn is_due(&self, month: BillingMonth, today: NaiveDate) -> bool {
        today >= self.cutoff(month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Reasons a service cannot be billed yet.
pub enum BillingTermsError {
    MissingCost,
    MissingBillingDay,
    NegativeCost(Decimal),
    BillingDayOutOfRange(u32),
}

impl fmt::Display for BillingTermsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingTermsError::MissingCost => f.write_str("service has no cost"),
            BillingTermsError::MissingBillingDay => f.write_str("service has no billing day"),
            BillingTermsError::NegativeCost(cost) => write!(f, "service cost {cost} is negative"),
            BillingTermsError::BillingDayOutOfRange(day) => write!(
                f,
                "billing day {day} is outside {MIN_BILLING_DAY}-{MAX_BILLING_DAY}"
            ),
        }
    }
}

impl std::error::Error for BillingTermsError {}
