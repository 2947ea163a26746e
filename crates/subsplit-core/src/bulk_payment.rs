//! Paying several months in one request, including months not billed yet.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use subsplit_domain::{BillingMonth, Debt, DebtScope, WalletCategories, WalletTransaction};

use crate::{
    debt_service::{DebtService, InitialStatus},
    storage::BillingStore,
    CoreError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BulkPaymentRequest {
    pub scope: DebtScope,
    pub payment_date: DateTime<Utc>,
    /// Month labels such as `"Marzo 2024"`. Order and duplicates do not matter.
    pub months: Vec<String>,
    /// Amount used for months that have no debt yet.
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaidMonth {
    pub month: BillingMonth,
    pub debt: Debt,
    pub transaction: Option<WalletTransaction>,
    /// Whether the debt was created by this request.
    pub generated: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkPaymentReceipt {
    pub paid: Vec<PaidMonth>,
    pub already_paid: Vec<BillingMonth>,
    /// Sum of the amounts paid by this request.
    pub total: Decimal,
}

impl BulkPaymentReceipt {
    pub fn months_processed(&self) -> usize {
        self.paid.len() + self.already_paid.len()
    }
}

enum Settlement {
    Paid(PaidMonth),
    AlreadyPaid,
}

pub struct BulkPaymentProcessor;

impl BulkPaymentProcessor {
    /// Parses and orders the requested labels. Any malformed label rejects
    /// the whole request.
    pub fn plan<L: AsRef<str>>(labels: &[L]) -> Result<Vec<BillingMonth>, CoreError> {
        if labels.is_empty() {
            return Err(CoreError::Validation("no months selected".into()));
        }
        let months = labels
            .iter()
            .map(|label| BillingMonth::parse_label(label.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(months.into_iter().collect())
    }

    /// `count` consecutive months starting at `from`.
    pub fn advance_months(
        from: BillingMonth,
        count: usize,
    ) -> Result<Vec<BillingMonth>, CoreError> {
        if count == 0 {
            return Err(CoreError::Validation(
                "advance payment needs at least one month".into(),
            ));
        }
        let months: Vec<_> = from.iter_forward(count).collect();
        if months.len() < count {
            return Err(CoreError::Validation(format!(
                "{count} months from {from} run past the last billable month"
            )));
        }
        Ok(months)
    }

    /// Pays every requested month, oldest first.
    ///
    /// Pending debts are paid, missing ones generated and paid, and months
    /// already paid are reported and skipped, so resubmitting an interrupted
    /// request finishes it without charging twice. The first failure stops
    /// the batch; months before it stay committed.
    pub async fn pay_months<S>(
        store: &S,
        request: BulkPaymentRequest,
        categories: &WalletCategories,
    ) -> Result<BulkPaymentReceipt, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        if request.amount < Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "payment amount {} is negative",
                request.amount
            )));
        }
        let months = Self::plan(&request.months)?;
        let mut receipt = BulkPaymentReceipt::default();

        for month in months {
            match Self::settle(store, &request, month, categories).await {
                Ok(Settlement::Paid(paid)) => {
                    receipt.total += paid.debt.amount;
                    receipt.paid.push(paid);
                }
                Ok(Settlement::AlreadyPaid) => {
                    debug!(scope = %request.scope, month = %month, "month already paid");
                    receipt.already_paid.push(month);
                }
                Err(source) => {
                    return Err(CoreError::BatchInterrupted {
                        completed: receipt.months_processed(),
                        month,
                        source: Box::new(source),
                    })
                }
            }
        }

        info!(
            scope = %request.scope,
            paid = receipt.paid.len(),
            already_paid = receipt.already_paid.len(),
            total = %receipt.total,
            "bulk payment applied"
        );
        Ok(receipt)
    }

    /// Pays `count` months ahead starting at `from`.
    #[allow(clippy::too_many_arguments)]
    pub async fn pay_ahead<S>(
        store: &S,
        scope: DebtScope,
        from: BillingMonth,
        count: usize,
        amount: Decimal,
        payment_date: DateTime<Utc>,
        categories: &WalletCategories,
    ) -> Result<BulkPaymentReceipt, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let months = Self::advance_months(from, count)?;
        let request = BulkPaymentRequest {
            scope,
            payment_date,
            months: months.iter().map(BillingMonth::label).collect(),
            amount,
        };
        Self::pay_months(store, request, categories).await
    }

    async fn settle<S>(
        store: &S,
        request: &BulkPaymentRequest,
        month: BillingMonth,
        categories: &WalletCategories,
    ) -> Result<Settlement, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let scope = &request.scope;
        match store.find_debt_by_month(scope, month).await? {
            Some(debt) if debt.is_paid() => Ok(Settlement::AlreadyPaid),
            Some(debt) => {
                let receipt =
                    DebtService::pay(store, scope, debt.id, request.payment_date, categories)
                        .await?;
                Ok(Settlement::Paid(PaidMonth {
                    month,
                    debt: receipt.debt,
                    transaction: receipt.transaction,
                    generated: false,
                }))
            }
            None => {
                let generated = DebtService::generate(
                    store,
                    scope,
                    request.amount,
                    month,
                    InitialStatus::Paid {
                        paid_at: request.payment_date,
                    },
                    request.payment_date,
                    categories,
                )
                .await?;
                Ok(Settlement::Paid(PaidMonth {
                    month,
                    debt: generated.debt,
                    transaction: generated.payment,
                    generated: true,
                }))
            }
        }
    }
}
