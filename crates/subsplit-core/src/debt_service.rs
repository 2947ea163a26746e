//! Debt lifecycle transitions and the wallet entries each one produces.
//!
//! ```text
//! pending --pay--> paid --revert--> pending
//! pending|paid --delete--> (gone)
//! ```
//!
//! Compensating entries always cancel the debt's *net* wallet contribution,
//! so a transition interrupted between its wallet write and its debt write
//! finishes cleanly when retried.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info};
use uuid::Uuid;

use subsplit_domain::{
    total_amount, BillingMonth, Debt, DebtScope, DebtStatus, Displayable, NewDebt,
    WalletCategories, WalletTransaction,
};

use crate::{
    storage::{BillingStore, DebtInsert},
    wallet_service::WalletService,
    CoreError,
};

/// Status requested for a freshly generated debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialStatus {
    Pending,
    /// Generated and immediately paid through [`DebtService::pay`].
    Paid { paid_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedDebt {
    pub debt: Debt,
    pub payment: Option<WalletTransaction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub debt: Debt,
    /// `None` when the entry had already been recorded by an interrupted
    /// earlier attempt.
    pub transaction: Option<WalletTransaction>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RevertOutcome {
    Reverted {
        debt: Debt,
        correction: Option<WalletTransaction>,
    },
    AlreadyPending(Debt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletionReceipt {
    pub debt: Debt,
    pub correction: Option<WalletTransaction>,
}

/// Totals of a debt collection split by status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebtSummary {
    pub pending_total: Decimal,
    pub paid_total: Decimal,
    pub pending_months: Vec<BillingMonth>,
    pub paid_months: Vec<BillingMonth>,
}

impl DebtSummary {
    pub fn from_debts(debts: &[Debt]) -> Self {
        let (paid, pending): (Vec<&Debt>, Vec<&Debt>) = debts.iter().partition(|d| d.is_paid());
        let mut pending_months: Vec<_> = pending.iter().map(|d| d.month).collect();
        let mut paid_months: Vec<_> = paid.iter().map(|d| d.month).collect();
        pending_months.sort();
        paid_months.sort();
        Self {
            pending_total: total_amount(pending),
            paid_total: total_amount(paid),
            pending_months,
            paid_months,
        }
    }
}

/// Provides the only code paths that change a debt's status.
pub struct DebtService;

impl DebtService {
    /// Creates the debt for `month` in `scope`.
    ///
    /// A paid initial status still goes through [`DebtService::pay`], so a
    /// paid debt never exists without its wallet entry.
    #[allow(clippy::too_many_arguments)]
    pub async fn generate<S>(
        store: &S,
        scope: &DebtScope,
        amount: Decimal,
        month: BillingMonth,
        initial: InitialStatus,
        now: DateTime<Utc>,
        categories: &WalletCategories,
    ) -> Result<GeneratedDebt, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        if amount < Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "debt amount {amount} is negative"
            )));
        }
        let debt = match store
            .insert_debt_if_absent(scope, NewDebt::new(month, amount), now)
            .await?
        {
            DebtInsert::Created(debt) => debt,
            DebtInsert::Existing(_) => return Err(CoreError::DuplicateDebt { month }),
        };
        debug!(scope = %scope, month = %month, amount = %amount, "generated debt");

        match initial {
            InitialStatus::Pending => Ok(GeneratedDebt {
                debt,
                payment: None,
            }),
            InitialStatus::Paid { paid_at } => {
                let receipt = Self::pay(store, scope, debt.id, paid_at, categories).await?;
                Ok(GeneratedDebt {
                    debt: receipt.debt,
                    payment: receipt.transaction,
                })
            }
        }
    }

    /// Marks a pending debt paid and records the matching wallet entry:
    /// income when a subscriber pays, expense when the owner pays upstream.
    /// Zero-amount debts move no money and get no entry.
    pub async fn pay<S>(
        store: &S,
        scope: &DebtScope,
        debt_id: Uuid,
        payment_date: DateTime<Utc>,
        categories: &WalletCategories,
    ) -> Result<PaymentReceipt, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let mut debt = Self::load(store, scope, debt_id).await?;
        if debt.is_paid() {
            return Err(CoreError::InvalidTransition {
                debt: debt.id,
                status: debt.status,
                operation: "pay",
            });
        }

        let net = WalletService::net_for_debt(store, debt.id).await?;
        let expected = scope.payment_kind().apply_sign(debt.amount);
        let transaction = if expected.is_zero() {
            None
        } else if net.is_zero() {
            let txn =
                WalletService::record_payment(store, scope, &debt, payment_date, categories)
                    .await?;
            Some(txn)
        } else if net == expected {
            debug!(debt = %debt.id, "payment entry already recorded, completing status update");
            None
        } else {
            return Err(CoreError::Validation(format!(
                "debt {} has wallet balance {net}, expected 0 or {expected}",
                debt.id
            )));
        };

        debt.mark_paid(payment_date);
        store.update_debt(scope, &debt).await?;
        info!(debt = %debt.id, detail = %debt.display_label(), "debt paid");
        Ok(PaymentReceipt { debt, transaction })
    }

    /// Returns a paid debt to pending, appending a correction entry that
    /// cancels its payment. Already-pending debts are left untouched.
    pub async fn revert_to_pending<S>(
        store: &S,
        scope: &DebtScope,
        debt_id: Uuid,
        now: DateTime<Utc>,
        categories: &WalletCategories,
    ) -> Result<RevertOutcome, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let mut debt = Self::load(store, scope, debt_id).await?;
        if debt.is_pending() {
            debug!(debt = %debt.id, "revert requested on pending debt");
            return Ok(RevertOutcome::AlreadyPending(debt));
        }

        let correction = Self::neutralize(store, scope, &debt, now, categories).await?;
        debt.mark_pending();
        store.update_debt(scope, &debt).await?;
        info!(debt = %debt.id, month = %debt.month, "debt reverted to pending");
        Ok(RevertOutcome::Reverted { debt, correction })
    }

    /// Removes a debt permanently. Money recorded against it is cancelled
    /// first so the wallet keeps no trace of a payment for a debt that no
    /// longer exists.
    pub async fn delete<S>(
        store: &S,
        scope: &DebtScope,
        debt_id: Uuid,
        now: DateTime<Utc>,
        categories: &WalletCategories,
    ) -> Result<DeletionReceipt, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let debt = Self::load(store, scope, debt_id).await?;
        let correction = Self::neutralize(store, scope, &debt, now, categories).await?;
        store.delete_debt(scope, debt.id).await?;
        info!(debt = %debt.id, month = %debt.month, status = %debt.status, "debt deleted");
        Ok(DeletionReceipt { debt, correction })
    }

    /// Debts in `scope`, oldest month first.
    pub async fn list_debts<S>(store: &S, scope: &DebtScope) -> Result<Vec<Debt>, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        store.list_debts(scope).await
    }

    pub async fn summary<S>(store: &S, scope: &DebtScope) -> Result<DebtSummary, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let debts = store.list_debts(scope).await?;
        Ok(DebtSummary::from_debts(&debts))
    }

    /// Pending debts in `scope` whose month is `month` or earlier.
    pub async fn outstanding<S>(
        store: &S,
        scope: &DebtScope,
        month: BillingMonth,
    ) -> Result<Vec<Debt>, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let debts = store.list_debts(scope).await?;
        Ok(debts
            .into_iter()
            .filter(|debt| debt.status == DebtStatus::Pending && debt.month <= month)
            .collect())
    }

    async fn load<S>(store: &S, scope: &DebtScope, debt_id: Uuid) -> Result<Debt, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        store
            .get_debt(scope, debt_id)
            .await?
            .ok_or(CoreError::DebtNotFound(debt_id))
    }

    async fn neutralize<S>(
        store: &S,
        scope: &DebtScope,
        debt: &Debt,
        now: DateTime<Utc>,
        categories: &WalletCategories,
    ) -> Result<Option<WalletTransaction>, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let net = WalletService::net_for_debt(store, debt.id).await?;
        if net.is_zero() {
            return Ok(None);
        }
        match WalletService::record_correction(store, scope, debt, net, now, categories).await {
            Ok(txn) => Ok(Some(txn)),
            Err(err) => {
                error!(debt = %debt.id, net = %net, error = %err, "failed to record correction");
                Err(err)
            }
        }
    }
}
