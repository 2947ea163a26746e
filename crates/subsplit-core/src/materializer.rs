//! Turns elapsed billing cycles into pending debts.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use subsplit_domain::{BillingMonth, BillingTerms, Debt, DebtScope, NewDebt, Service};

use crate::{
    storage::{BillingStore, DebtInsert},
    CoreError,
};

/// A month that could not be written. It is retried on the next run.
#[derive(Debug)]
pub struct MaterializeFailure {
    pub scope: DebtScope,
    pub month: BillingMonth,
    pub error: CoreError,
}

#[derive(Debug, Default)]
pub struct MaterializeReport {
    /// Debts created by this run, in processing order.
    pub created: Vec<(DebtScope, Debt)>,
    /// Due months that already had a debt.
    pub existing: usize,
    pub failures: Vec<MaterializeFailure>,
}

impl MaterializeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn created_in(&self, scope: &DebtScope) -> impl Iterator<Item = &Debt> + '_ {
        let scope = *scope;
        self.created
            .iter()
            .filter(move |(s, _)| *s == scope)
            .map(|(_, debt)| debt)
    }
}

pub struct Materializer;

impl Materializer {
    /// Materializes with `today` taken as the UTC date of `now`.
    pub async fn materialize<S>(
        store: &S,
        service_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<MaterializeReport, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        Self::materialize_on(store, service_id, now.date_naive(), now).await
    }

    /// Materializes against the caller's calendar date `today`. `now` only
    /// stamps the created debts.
    pub async fn materialize_on<S>(
        store: &S,
        service_id: Uuid,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<MaterializeReport, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let service = store
            .get_service(service_id)
            .await?
            .ok_or(CoreError::ServiceNotFound(service_id))?;
        Self::materialize_service(store, &service, today, now).await
    }

    /// Creates the owner's and every active subscriber's missing debts for
    /// months whose cutoff has passed by `today`. Existing debts are never
    /// touched, so running twice is the same as running once.
    pub async fn materialize_service<S>(
        store: &S,
        service: &Service,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<MaterializeReport, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let terms = service.billing_terms()?;
        let mut report = MaterializeReport::default();

        let owner = DebtScope::owner(service.id);
        let months = Self::due_months(service.start_month(), &terms, today);
        Self::fill_scope(store, &owner, &months, terms.cost, now, &mut report).await;

        for subscriber in store.list_subscribers(service.id).await? {
            if !subscriber.active {
                debug!(subscriber = %subscriber.id, "skipping inactive subscriber");
                continue;
            }
            let start = service.start_month().max(subscriber.start_month());
            let months = Self::due_months(start, &terms, today);
            let scope = DebtScope::subscriber(service.id, subscriber.id);
            Self::fill_scope(store, &scope, &months, subscriber.quota, now, &mut report)
                .await;
        }

        info!(
            service = %service.id,
            created = report.created.len(),
            existing = report.existing,
            failures = report.failures.len(),
            "materialized billing cycles"
        );
        Ok(report)
    }

    /// Runs [`Materializer::materialize_service`] for every stored service.
    /// Per-service errors are returned alongside the service id instead of
    /// aborting the sweep.
    pub async fn materialize_all<S>(
        store: &S,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, Result<MaterializeReport, CoreError>)>, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let mut results = Vec::new();
        for service in store.list_services().await? {
            let outcome = Self::materialize_service(store, &service, today, now).await;
            if let Err(err) = &outcome {
                warn!(service = %service.id, error = %err, "service not materialized");
            }
            results.push((service.id, outcome));
        }
        Ok(results)
    }

    /// Months from `start` whose cutoff falls on or before `today`.
    pub fn due_months(
        start: BillingMonth,
        terms: &BillingTerms,
        today: NaiveDate,
    ) -> Vec<BillingMonth> {
        let mut months = Vec::new();
        let mut cursor = start;
        while cursor.first_day() <= today {
            if terms.is_due(cursor, today) {
                months.push(cursor);
            }
            cursor = match cursor.succ() {
                Some(next) => next,
                None => break,
            };
        }
        months
    }

    async fn fill_scope<S>(
        store: &S,
        scope: &DebtScope,
        months: &[BillingMonth],
        amount: Decimal,
        now: DateTime<Utc>,
        report: &mut MaterializeReport,
    ) where
        S: BillingStore + ?Sized,
    {
        for &month in months {
            match store
                .insert_debt_if_absent(scope, NewDebt::new(month, amount), now)
                .await
            {
                Ok(DebtInsert::Created(debt)) => {
                    debug!(scope = %scope, month = %month, amount = %amount, "created debt");
                    report.created.push((*scope, debt));
                }
                Ok(DebtInsert::Existing(_)) => report.existing += 1,
                Err(error) => {
                    warn!(
                        scope = %scope,
                        month = %month,
                        error = %error,
                        "failed to materialize month"
                    );
                    report.failures.push(MaterializeFailure {
                        scope: *scope,
                        month,
                        error,
                    });
                }
            }
        }
    }
}
