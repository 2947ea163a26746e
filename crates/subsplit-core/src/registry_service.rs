//! Services and subscribers: validated creation, partial updates and
//! cascading deletes.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use subsplit_domain::{
    BillingMonth, DebtScope, Identifiable, NamedEntity, NewService, NewSubscriber, Service,
    Subscriber, MAX_BILLING_DAY, MIN_BILLING_DAY,
};

use crate::{storage::BillingStore, CoreError};

/// Fields to change on a service. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub cost: Option<Decimal>,
    pub billing_day: Option<u32>,
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriberUpdate {
    pub name: Option<String>,
    pub quota: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub active: Option<bool>,
}

/// Records removed by a cascading delete. Wallet entries are never removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub subscribers_removed: usize,
    pub debts_removed: usize,
}

pub struct RegistryService;

impl RegistryService {
    pub async fn create_service<S>(
        store: &S,
        draft: NewService,
        now: DateTime<Utc>,
    ) -> Result<Service, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let mut draft = draft;
        draft.name = validate_name(&draft.name)?;
        validate_cost(draft.cost)?;
        validate_billing_day(draft.billing_day)?;
        validate_start_date(draft.start_date)?;
        let service = store.create_service(draft, now).await?;
        info!(service = %service.id(), name = service.name(), "service created");
        Ok(service)
    }

    /// Applies `update`. Existing debts keep the amount they were generated
    /// with.
    pub async fn update_service<S>(
        store: &S,
        service_id: Uuid,
        update: ServiceUpdate,
        now: DateTime<Utc>,
    ) -> Result<Service, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let mut service = store
            .get_service(service_id)
            .await?
            .ok_or(CoreError::ServiceNotFound(service_id))?;
        if let Some(name) = update.name {
            service.name = validate_name(&name)?;
        }
        if let Some(cost) = update.cost {
            validate_cost(Some(cost))?;
            service.cost = Some(cost);
        }
        if let Some(day) = update.billing_day {
            validate_billing_day(Some(day))?;
            service.billing_day = Some(day);
        }
        if let Some(start) = update.start_date {
            validate_start_date(Some(start))?;
            service.start_date = start;
        }
        service.updated_at = now;
        store.update_service(&service).await?;
        Ok(service)
    }

    /// Removes the service with its subscribers and every debt beneath it.
    pub async fn delete_service<S>(store: &S, service_id: Uuid) -> Result<CascadeReport, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        if store.get_service(service_id).await?.is_none() {
            return Err(CoreError::ServiceNotFound(service_id));
        }
        let mut report = CascadeReport::default();
        for subscriber in store.list_subscribers(service_id).await? {
            report.debts_removed +=
                Self::delete_subscriber(store, service_id, subscriber.id).await?;
            report.subscribers_removed += 1;
        }
        report.debts_removed += clear_debts(store, &DebtScope::owner(service_id)).await?;
        store.delete_service(service_id).await?;
        info!(
            service = %service_id,
            subscribers = report.subscribers_removed,
            debts = report.debts_removed,
            "service deleted"
        );
        Ok(report)
    }

    pub async fn create_subscriber<S>(
        store: &S,
        service_id: Uuid,
        draft: NewSubscriber,
        now: DateTime<Utc>,
    ) -> Result<Subscriber, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let mut draft = draft;
        draft.name = validate_name(&draft.name)?;
        validate_quota(draft.quota)?;
        validate_start_date(draft.start_date)?;
        let subscriber = store.create_subscriber(service_id, draft, now).await?;
        info!(
            service = %service_id,
            subscriber = %subscriber.id(),
            name = subscriber.name(),
            "subscriber created"
        );
        Ok(subscriber)
    }

    pub async fn update_subscriber<S>(
        store: &S,
        service_id: Uuid,
        subscriber_id: Uuid,
        update: SubscriberUpdate,
    ) -> Result<Subscriber, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        let mut subscriber = store
            .get_subscriber(service_id, subscriber_id)
            .await?
            .ok_or(CoreError::SubscriberNotFound(subscriber_id))?;
        if let Some(name) = update.name {
            subscriber.name = validate_name(&name)?;
        }
        if let Some(quota) = update.quota {
            validate_quota(quota)?;
            subscriber.quota = quota;
        }
        if let Some(start) = update.start_date {
            validate_start_date(Some(start))?;
            subscriber.start_date = start;
        }
        if let Some(active) = update.active {
            subscriber.active = active;
        }
        store.update_subscriber(service_id, &subscriber).await?;
        Ok(subscriber)
    }

    /// Removes the subscriber and its debts, returning how many debts went.
    pub async fn delete_subscriber<S>(
        store: &S,
        service_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<usize, CoreError>
    where
        S: BillingStore + ?Sized,
    {
        if store.get_subscriber(service_id, subscriber_id).await?.is_none() {
            return Err(CoreError::SubscriberNotFound(subscriber_id));
        }
        let removed = clear_debts(store, &DebtScope::subscriber(service_id, subscriber_id)).await?;
        store.delete_subscriber(service_id, subscriber_id).await?;
        info!(
            service = %service_id,
            subscriber = %subscriber_id,
            debts = removed,
            "subscriber deleted"
        );
        Ok(removed)
    }
}

async fn clear_debts<S>(store: &S, scope: &DebtScope) -> Result<usize, CoreError>
where
    S: BillingStore + ?Sized,
{
    let mut removed = 0;
    for debt in store.list_debts(scope).await? {
        if store.delete_debt(scope, debt.id).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

fn validate_name(name: &str) -> Result<String, CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("name cannot be empty".into()));
    }
    Ok(trimmed.to_string())
}

fn validate_cost(cost: Option<Decimal>) -> Result<(), CoreError> {
    match cost {
        Some(cost) if cost < Decimal::ZERO => Err(CoreError::Validation(format!(
            "cost {cost} is negative"
        ))),
        _ => Ok(()),
    }
}

fn validate_quota(quota: Decimal) -> Result<(), CoreError> {
    if quota < Decimal::ZERO {
        return Err(CoreError::Validation(format!("quota {quota} is negative")));
    }
    Ok(())
}

fn validate_start_date(start: Option<NaiveDate>) -> Result<(), CoreError> {
    match start {
        Some(date) if BillingMonth::from_date(date).is_none() => Err(CoreError::Validation(
            format!("start date {date} is outside the billable years"),
        )),
        _ => Ok(()),
    }
}

fn validate_billing_day(day: Option<u32>) -> Result<(), CoreError> {
    match day {
        Some(day) if !(MIN_BILLING_DAY..=MAX_BILLING_DAY).contains(&day) => {
            Err(CoreError::Validation(format!(
                "billing day {day} is outside {MIN_BILLING_DAY}-{MAX_BILLING_DAY}"
            )))
        }
        _ => Ok(()),
    }
}
