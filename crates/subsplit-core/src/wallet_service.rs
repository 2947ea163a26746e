//! Wallet ledger helpers: appending debt-linked entries and reading balances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use subsplit_domain::{
    Debt, DebtScope, NewWalletTransaction, TransactionKind, WalletCategories, WalletTransaction,
};

use crate::{storage::BillingStore, CoreError};

/// Income, expense and net totals over a set of wallet entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalletBalance {
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
}

impl WalletBalance {
    pub fn from_transactions<'a>(
        transactions: impl IntoIterator<Item = &'a WalletTransaction>,
    ) -> Self {
        let mut balance = WalletBalance::default();
        for txn in transactions {
            match txn.kind {
                TransactionKind::Income => balance.income += txn.amount,
                TransactionKind::Expense => balance.expense += txn.amount,
            }
        }
        balance.net = balance.income - balance.expense;
        balance
    }
}

pub struct WalletService;

impl WalletService {
    /// Sum of signed entries carrying `debt_id`. Zero means the debt has no
    /// money recorded against it.
    pub async fn net_for_debt<S>(store: &S, debt_id: Uuid) -> Result<Decimal, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let entries = store.list_transactions_for_debt(debt_id).await?;
        Ok(entries.iter().map(WalletTransaction::signed_amount).sum())
    }

    /// Appends the entry for a real payment of `debt`.
    pub async fn record_payment<S>(
        store: &S,
        scope: &DebtScope,
        debt: &Debt,
        date: DateTime<Utc>,
        categories: &WalletCategories,
    ) -> Result<WalletTransaction, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let kind = scope.payment_kind();
        let draft = NewWalletTransaction::new(
            kind,
            debt.amount,
            categories.payment_category(kind),
            format!("Payment for {}", debt.month),
            date,
        )
        .linked_to(scope.service_id(), scope.subscriber_id(), debt.id);
        let txn = store.append_transaction(draft).await?;
        info!(
            debt = %debt.id,
            month = %debt.month,
            kind = %txn.kind,
            amount = %txn.amount,
            "recorded payment"
        );
        Ok(txn)
    }

    /// Appends a correction entry cancelling `net`, the debt's current signed
    /// contribution to the wallet.
    pub async fn record_correction<S>(
        store: &S,
        scope: &DebtScope,
        debt: &Debt,
        net: Decimal,
        date: DateTime<Utc>,
        categories: &WalletCategories,
    ) -> Result<WalletTransaction, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let draft = NewWalletTransaction::from_signed(
            -net,
            categories.correction.clone(),
            format!("Reversal of payment for {}", debt.month),
            date,
        )
        .linked_to(scope.service_id(), scope.subscriber_id(), debt.id);
        let txn = store.append_transaction(draft).await?;
        info!(
            debt = %debt.id,
            month = %debt.month,
            kind = %txn.kind,
            amount = %txn.amount,
            "recorded correction"
        );
        Ok(txn)
    }

    /// Balance over the whole wallet.
    pub async fn balance<S>(store: &S) -> Result<WalletBalance, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let transactions = store.list_transactions().await?;
        Ok(WalletBalance::from_transactions(&transactions))
    }

    /// Entries referencing `service_id`, in append order.
    pub async fn entries_for_service<S>(
        store: &S,
        service_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let transactions = store.list_transactions().await?;
        Ok(transactions
            .into_iter()
            .filter(|txn| txn.service_id == Some(service_id))
            .collect())
    }
}
