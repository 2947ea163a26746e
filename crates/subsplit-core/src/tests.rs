use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::{
    bulk_payment::{BulkPaymentProcessor, BulkPaymentRequest},
    debt_service::{DebtService, InitialStatus, RevertOutcome},
    materializer::Materializer,
    registry_service::{RegistryService, ServiceUpdate, SubscriberUpdate},
    storage::{BillingStore, DebtInsert, InMemoryStore},
    wallet_service::WalletService,
    BillingDocument, Clock, CoreError, FixedClock,
};
use subsplit_domain::{
    BillingMonth, BillingTerms, Debt, DebtScope, DebtStatus, NewDebt, NewService, NewSubscriber,
    NewWalletTransaction, Service, Subscriber, TransactionKind, WalletCategories,
    WalletTransaction,
};

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn month(year: i32, month: u32) -> BillingMonth {
    BillingMonth::new(year, month).unwrap()
}

async fn streaming<S>(store: &S, cost: Decimal, billing_day: u32) -> Service
where
    S: BillingStore + ?Sized,
{
    RegistryService::create_service(
        store,
        NewService::new("Streaming", cost, billing_day).starting(date(2024, 1, 1)),
        at(2024, 1, 1),
    )
    .await
    .expect("create service")
}

async fn subscriber<S: BillingStore + ?Sized>(
    store: &S,
    service: &Service,
    quota: Decimal,
    start: NaiveDate,
) -> Subscriber {
    RegistryService::create_subscriber(
        store,
        service.id,
        NewSubscriber::new("Ana", quota).starting(start),
        at(2024, 1, 1),
    )
    .await
    .expect("create subscriber")
}

fn months_of(debts: &[Debt]) -> Vec<BillingMonth> {
    debts.iter().map(|d| d.month).collect()
}

/// Delegates to an [`InMemoryStore`] but fails selected calls on demand.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    failing_updates: AtomicUsize,
    failing_appends: AtomicUsize,
    failing_month: Mutex<Option<BillingMonth>>,
}

impl FlakyStore {
    fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    fn fail_next_appends(&self, count: usize) {
        self.failing_appends.store(count, Ordering::SeqCst);
    }

    fn fail_inserts_for(&self, month: Option<BillingMonth>) {
        *self.failing_month.lock().unwrap() = month;
    }

    fn trip(counter: &AtomicUsize) -> Result<(), CoreError> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(CoreError::StoreUnavailable("injected failure".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl BillingStore for FlakyStore {
    async fn create_service(
        &self,
        draft: NewService,
        now: DateTime<Utc>,
    ) -> Result<Service, CoreError> {
        self.inner.create_service(draft, now).await
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, CoreError> {
        self.inner.get_service(service_id).await
    }

    async fn list_services(&self) -> Result<Vec<Service>, CoreError> {
        self.inner.list_services().await
    }

    async fn update_service(&self, service: &Service) -> Result<(), CoreError> {
        self.inner.update_service(service).await
    }

    async fn delete_service(&self, service_id: Uuid) -> Result<bool, CoreError> {
        self.inner.delete_service(service_id).await
    }

    async fn create_subscriber(
        &self,
        service_id: Uuid,
        draft: NewSubscriber,
        now: DateTime<Utc>,
    ) -> Result<Subscriber, CoreError> {
        self.inner.create_subscriber(service_id, draft, now).await
    }

    async fn get_subscriber(
        &self,
        service_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscriber>, CoreError> {
        self.inner.get_subscriber(service_id, subscriber_id).await
    }

    async fn list_subscribers(&self, service_id: Uuid) -> Result<Vec<Subscriber>, CoreError> {
        self.inner.list_subscribers(service_id).await
    }

    async fn update_subscriber(
        &self,
        service_id: Uuid,
        subscriber: &Subscriber,
    ) -> Result<(), CoreError> {
        self.inner.update_subscriber(service_id, subscriber).await
    }

    async fn delete_subscriber(
        &self,
        service_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<bool, CoreError> {
        self.inner.delete_subscriber(service_id, subscriber_id).await
    }

    async fn list_debts(&self, scope: &DebtScope) -> Result<Vec<Debt>, CoreError> {
        self.inner.list_debts(scope).await
    }

    async fn get_debt(&self, scope: &DebtScope, debt_id: Uuid) -> Result<Option<Debt>, CoreError> {
        self.inner.get_debt(scope, debt_id).await
    }

    async fn find_debt_by_month(
        &self,
        scope: &DebtScope,
        month: BillingMonth,
    ) -> Result<Option<Debt>, CoreError> {
        self.inner.find_debt_by_month(scope, month).await
    }

    async fn insert_debt_if_absent(
        &self,
        scope: &DebtScope,
        draft: NewDebt,
        now: DateTime<Utc>,
    ) -> Result<DebtInsert, CoreError> {
        if *self.failing_month.lock().unwrap() == Some(draft.month) {
            return Err(CoreError::StoreUnavailable("injected failure".into()));
        }
        self.inner.insert_debt_if_absent(scope, draft, now).await
    }

    async fn update_debt(&self, scope: &DebtScope, debt: &Debt) -> Result<(), CoreError> {
        Self::trip(&self.failing_updates)?;
        self.inner.update_debt(scope, debt).await
    }

    async fn delete_debt(&self, scope: &DebtScope, debt_id: Uuid) -> Result<bool, CoreError> {
        self.inner.delete_debt(scope, debt_id).await
    }

    async fn append_transaction(
        &self,
        draft: NewWalletTransaction,
    ) -> Result<WalletTransaction, CoreError> {
        Self::trip(&self.failing_appends)?;
        self.inner.append_transaction(draft).await
    }

    async fn list_transactions(&self) -> Result<Vec<WalletTransaction>, CoreError> {
        self.inner.list_transactions().await
    }

    async fn list_transactions_for_debt(
        &self,
        debt_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, CoreError> {
        self.inner.list_transactions_for_debt(debt_id).await
    }
}

// ---------------------------------------------------------------------------
// Materializer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn materializer_creates_first_owner_debt_after_cutoff() {
    let store = InMemoryStore::new();
    let service = streaming(&store, dec!(50), 15).await;

    let report = Materializer::materialize(&store, service.id, at(2024, 1, 20))
        .await
        .expect("materialize");
    assert!(report.is_complete());
    assert_eq!(report.created.len(), 1);

    let debts = store.list_debts(&DebtScope::owner(service.id)).await.unwrap();
    assert_eq!(debts.len(), 1);
    assert_eq!(debts[0].month.label(), "Enero 2024");
    assert_eq!(debts[0].amount, dec!(50));
    assert_eq!(debts[0].status, DebtStatus::Pending);
    assert_eq!(debts[0].created_at, at(2024, 1, 20));
}

#[tokio::test]
async fn materializer_waits_for_the_billing_day() {
    let store = InMemoryStore::new();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);

    Materializer::materialize(&store, service.id, at(2024, 1, 10)).await.unwrap();
    assert!(store.list_debts(&owner).await.unwrap().is_empty());

    Materializer::materialize(&store, service.id, at(2024, 1, 16)).await.unwrap();
    assert_eq!(store.list_debts(&owner).await.unwrap().len(), 1);
}

#[tokio::test]
async fn materializer_is_idempotent() {
    let store = InMemoryStore::new();
    let service = streaming(&store, dec!(50), 15).await;
    subscriber(&store, &service, dec!(20), date(2024, 1, 1)).await;

    let first = Materializer::materialize(&store, service.id, at(2024, 4, 20)).await.unwrap();
    let second = Materializer::materialize(&store, service.id, at(2024, 4, 20)).await.unwrap();

    assert_eq!(first.created.len(), 8);
    assert!(second.created.is_empty());
    assert_eq!(second.existing, 8);
    let owner = store.list_debts(&DebtScope::owner(service.id)).await.unwrap();
    assert_eq!(owner.len(), 4);
}

#[tokio::test]
async fn subscribers_start_no_earlier_than_their_own_start_month() {
    let store = InMemoryStore::new();
    let service = streaming(&store, dec!(50), 15).await;
    let ana = subscriber(&store, &service, dec!(20), date(2024, 3, 10)).await;

    let report = Materializer::materialize(&store, service.id, at(2024, 5, 20)).await.unwrap();

    let scope = DebtScope::subscriber(service.id, ana.id);
    let debts = store.list_debts(&scope).await.unwrap();
    assert_eq!(months_of(&debts), vec![month(2024, 3), month(2024, 4), month(2024, 5)]);
    assert!(debts.iter().all(|d| d.amount == dec!(20)));
    assert_eq!(report.created_in(&scope).count(), 3);
    assert_eq!(report.created_in(&DebtScope::owner(service.id)).count(), 5);
}

#[tokio::test]
async fn inactive_subscribers_are_not_billed() {
    let store = InMemoryStore::new();
    let service = streaming(&store, dec!(50), 15).await;
    let ana = subscriber(&store, &service, dec!(20), date(2024, 1, 1)).await;
    RegistryService::update_subscriber(
        &store,
        service.id,
        ana.id,
        SubscriberUpdate {
            active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    Materializer::materialize(&store, service.id, at(2024, 2, 20)).await.unwrap();
    let debts = store
        .list_debts(&DebtScope::subscriber(service.id, ana.id))
        .await
        .unwrap();
    assert!(debts.is_empty());
}

#[tokio::test]
async fn materializer_requires_billing_terms() {
    let store = InMemoryStore::new();
    let mut draft = NewService::new("Streaming", dec!(50), 15);
    draft.billing_day = None;
    let service = RegistryService::create_service(&store, draft, at(2024, 1, 1)).await.unwrap();

    let err = Materializer::materialize(&store, service.id, at(2024, 3, 1)).await.unwrap_err();
    assert!(matches!(err, CoreError::MissingConfiguration(_)));

    let missing = Materializer::materialize(&store, Uuid::new_v4(), at(2024, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(missing, CoreError::ServiceNotFound(_)));
}

#[tokio::test]
async fn billing_day_past_month_end_clamps_to_last_day() {
    let store = InMemoryStore::new();
    let service = streaming(&store, dec!(50), 31).await;
    let owner = DebtScope::owner(service.id);

    Materializer::materialize(&store, service.id, at(2024, 2, 28)).await.unwrap();
    assert_eq!(months_of(&store.list_debts(&owner).await.unwrap()), vec![month(2024, 1)]);

    Materializer::materialize(&store, service.id, at(2024, 2, 29)).await.unwrap();
    assert_eq!(
        months_of(&store.list_debts(&owner).await.unwrap()),
        vec![month(2024, 1), month(2024, 2)]
    );
}

#[tokio::test]
async fn materializer_follows_the_callers_calendar_date() {
    let store = InMemoryStore::new();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);
    // 02:00 UTC on the 15th is still the 14th west of Greenwich.
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 2, 0, 0).unwrap();

    let early = Materializer::materialize_on(&store, service.id, date(2024, 1, 14), now)
        .await
        .unwrap();
    assert!(early.created.is_empty());
    assert!(store.list_debts(&owner).await.unwrap().is_empty());

    let due = Materializer::materialize_on(&store, service.id, date(2024, 1, 15), now)
        .await
        .unwrap();
    assert_eq!(due.created.len(), 1);
    assert_eq!(due.created[0].1.created_at, now);
}

#[test]
fn due_months_end_at_the_last_labelled_month() {
    let terms = BillingTerms::new(dec!(50), 15).unwrap();
    assert_eq!(
        Materializer::due_months(month(9999, 11), &terms, date(10000, 3, 1)),
        vec![month(9999, 11), month(9999, 12)]
    );
}

#[tokio::test]
async fn materializer_records_failed_months_and_retries_them_later() {
    let store = FlakyStore::default();
    let service = streaming(&store, dec!(50), 15).await;
    store.fail_inserts_for(Some(month(2024, 2)));

    let report = Materializer::materialize(&store, service.id, at(2024, 3, 20)).await.unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].month, month(2024, 2));
    assert!(report.failures[0].error.is_transient());
    assert_eq!(report.created.len(), 2);

    store.fail_inserts_for(None);
    let retry = Materializer::materialize(&store, service.id, at(2024, 3, 20)).await.unwrap();
    assert!(retry.is_complete());
    assert_eq!(retry.created.len(), 1);
    let debts = store.list_debts(&DebtScope::owner(service.id)).await.unwrap();
    assert_eq!(debts.len(), 3);
}

#[tokio::test]
async fn persisted_services_without_billing_day_are_not_materialized() {
    let service_id = Uuid::new_v4();
    let raw = format!(
        r#"{{
            "schemaVersion": 1,
            "services": {{
                "{service_id}": {{
                    "id": "{service_id}",
                    "name": "Legacy",
                    "cost": 30,
                    "startDate": "2024-01-01",
                    "createdAt": "2024-01-01T00:00:00Z",
                    "updatedAt": "2024-01-01T00:00:00Z"
                }}
            }}
        }}"#
    );
    let document: BillingDocument = serde_json::from_str(&raw).expect("legacy document");
    let store = InMemoryStore::from_document(document);
    let clock = FixedClock(at(2024, 3, 1));

    let err = Materializer::materialize(&store, service_id, clock.now()).await.unwrap_err();
    assert!(matches!(err, CoreError::MissingConfiguration(_)));
    assert!(!err.is_transient());

    RegistryService::update_service(
        &store,
        service_id,
        ServiceUpdate {
            billing_day: Some(10),
            ..Default::default()
        },
        clock.now(),
    )
    .await
    .unwrap();
    let report = Materializer::materialize(&store, service_id, clock.now()).await.unwrap();
    assert_eq!(report.created.len(), 2);
    assert_eq!(store.snapshot().await.services[&service_id].owner_debts.len(), 2);
    assert_eq!(clock.today(), date(2024, 3, 1));
}

#[tokio::test]
async fn materialize_all_reports_each_service() {
    let store = InMemoryStore::new();
    let billed = streaming(&store, dec!(50), 15).await;
    let mut draft = NewService::new("Music", dec!(10), 1);
    draft.cost = None;
    let unconfigured = RegistryService::create_service(&store, draft, at(2024, 1, 1))
        .await
        .unwrap();

    let results = Materializer::materialize_all(&store, date(2024, 1, 20), at(2024, 1, 20))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    for (id, outcome) in results {
        if id == billed.id {
            assert_eq!(outcome.unwrap().created.len(), 1);
        } else {
            assert_eq!(id, unconfigured.id);
            assert!(matches!(outcome, Err(CoreError::MissingConfiguration(_))));
        }
    }
}

// ---------------------------------------------------------------------------
// Debt lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn paying_owner_debt_records_an_expense() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);
    Materializer::materialize(&store, service.id, at(2024, 1, 20)).await.unwrap();
    let debt = store.list_debts(&owner).await.unwrap().remove(0);

    let receipt = DebtService::pay(&store, &owner, debt.id, at(2024, 1, 21), &cats)
        .await
        .expect("pay");
    assert_eq!(receipt.debt.status, DebtStatus::Paid);
    assert_eq!(receipt.debt.paid_at, Some(at(2024, 1, 21)));

    let txns = store.list_transactions().await.unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].kind, TransactionKind::Expense);
    assert_eq!(txns[0].amount, dec!(50));
    assert_eq!(txns[0].category, cats.owner_expense);
    assert_eq!(txns[0].debt_id, Some(debt.id));
    assert_eq!(txns[0].subscriber_id, None);

    let again = DebtService::pay(&store, &owner, debt.id, at(2024, 1, 22), &cats).await;
    assert!(matches!(
        again,
        Err(CoreError::InvalidTransition {
            operation: "pay",
            status: DebtStatus::Paid,
            ..
        })
    ));
    assert_eq!(store.list_transactions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn pay_then_revert_leaves_the_wallet_unchanged() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let ana = subscriber(&store, &service, dec!(20), date(2024, 1, 1)).await;
    let scope = DebtScope::subscriber(service.id, ana.id);
    let generated = DebtService::generate(
        &store,
        &scope,
        dec!(20),
        month(2024, 2),
        InitialStatus::Pending,
        at(2024, 2, 1),
        &cats,
    )
    .await
    .unwrap();
    let debt_id = generated.debt.id;

    DebtService::pay(&store, &scope, debt_id, at(2024, 2, 16), &cats).await.unwrap();
    assert_eq!(WalletService::net_for_debt(&store, debt_id).await.unwrap(), dec!(20));

    let outcome = DebtService::revert_to_pending(&store, &scope, debt_id, at(2024, 2, 17), &cats)
        .await
        .unwrap();
    let RevertOutcome::Reverted { debt, correction } = outcome else {
        panic!("expected a reverted debt");
    };
    assert_eq!(debt.status, DebtStatus::Pending);
    assert_eq!(debt.paid_at, None);
    let correction = correction.expect("correction entry");
    assert_eq!(correction.kind, TransactionKind::Expense);
    assert_eq!(correction.amount, dec!(20));
    assert_eq!(correction.category, cats.correction);

    assert_eq!(WalletService::net_for_debt(&store, debt_id).await.unwrap(), Decimal::ZERO);
    let balance = WalletService::balance(&store).await.unwrap();
    assert_eq!(balance.net, Decimal::ZERO);
}

#[tokio::test]
async fn reverting_a_pending_debt_is_a_no_op() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);
    Materializer::materialize(&store, service.id, at(2024, 1, 20)).await.unwrap();
    let debt = store.list_debts(&owner).await.unwrap().remove(0);

    let outcome = DebtService::revert_to_pending(&store, &owner, debt.id, at(2024, 1, 21), &cats)
        .await
        .unwrap();
    assert!(matches!(outcome, RevertOutcome::AlreadyPending(_)));
    assert!(store.list_transactions().await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_paid_debt_refunds_it() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);
    Materializer::materialize(&store, service.id, at(2024, 2, 20)).await.unwrap();
    let debts = store.list_debts(&owner).await.unwrap();
    let (january, february) = (debts[0].clone(), debts[1].clone());
    DebtService::pay(&store, &owner, january.id, at(2024, 2, 20), &cats).await.unwrap();

    let paid = DebtService::delete(&store, &owner, january.id, at(2024, 2, 21), &cats)
        .await
        .unwrap();
    assert!(paid.correction.is_some());
    let pending = DebtService::delete(&store, &owner, february.id, at(2024, 2, 21), &cats)
        .await
        .unwrap();
    assert!(pending.correction.is_none());

    assert!(store.list_debts(&owner).await.unwrap().is_empty());
    assert_eq!(store.list_transactions().await.unwrap().len(), 2);
    assert_eq!(WalletService::balance(&store).await.unwrap().net, Decimal::ZERO);

    let gone = DebtService::delete(&store, &owner, january.id, at(2024, 2, 22), &cats).await;
    assert!(matches!(gone, Err(CoreError::DebtNotFound(_))));
}

#[tokio::test]
async fn generate_rejects_duplicate_months_and_routes_paid_through_pay() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);

    let generated = DebtService::generate(
        &store,
        &owner,
        dec!(50),
        month(2024, 1),
        InitialStatus::Paid {
            paid_at: at(2024, 1, 15),
        },
        at(2024, 1, 15),
        &cats,
    )
    .await
    .unwrap();
    assert!(generated.debt.is_paid());
    assert_eq!(generated.payment.as_ref().map(|t| t.amount), Some(dec!(50)));

    let duplicate = DebtService::generate(
        &store,
        &owner,
        dec!(50),
        month(2024, 1),
        InitialStatus::Pending,
        at(2024, 1, 16),
        &cats,
    )
    .await;
    assert!(matches!(duplicate, Err(CoreError::DuplicateDebt { .. })));

    let negative = DebtService::generate(
        &store,
        &owner,
        dec!(-1),
        month(2024, 2),
        InitialStatus::Pending,
        at(2024, 1, 16),
        &cats,
    )
    .await;
    assert!(matches!(negative, Err(CoreError::Validation(_))));
}

#[tokio::test]
async fn interrupted_payment_completes_on_retry_without_double_charging() {
    let store = FlakyStore::default();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);
    Materializer::materialize(&store, service.id, at(2024, 1, 20)).await.unwrap();
    let debt = store.list_debts(&owner).await.unwrap().remove(0);

    store.fail_next_updates(1);
    let err = DebtService::pay(&store, &owner, debt.id, at(2024, 1, 21), &cats)
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert!(store.get_debt(&owner, debt.id).await.unwrap().unwrap().is_pending());
    assert_eq!(store.list_transactions().await.unwrap().len(), 1);

    let receipt = DebtService::pay(&store, &owner, debt.id, at(2024, 1, 21), &cats)
        .await
        .unwrap();
    assert!(receipt.transaction.is_none());
    assert!(receipt.debt.is_paid());
    assert_eq!(store.list_transactions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_wallet_append_leaves_debt_pending() {
    let store = FlakyStore::default();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);
    Materializer::materialize(&store, service.id, at(2024, 1, 20)).await.unwrap();
    let debt = store.list_debts(&owner).await.unwrap().remove(0);

    store.fail_next_appends(1);
    assert!(DebtService::pay(&store, &owner, debt.id, at(2024, 1, 21), &cats).await.is_err());
    assert!(store.get_debt(&owner, debt.id).await.unwrap().unwrap().is_pending());
    assert!(store.list_transactions().await.unwrap().is_empty());
}

#[tokio::test]
async fn summary_splits_totals_by_status() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);
    Materializer::materialize(&store, service.id, at(2024, 3, 20)).await.unwrap();
    let debts = DebtService::list_debts(&store, &owner).await.unwrap();
    DebtService::pay(&store, &owner, debts[1].id, at(2024, 3, 20), &cats).await.unwrap();

    let summary = DebtService::summary(&store, &owner).await.unwrap();
    assert_eq!(summary.pending_total, dec!(100));
    assert_eq!(summary.paid_total, dec!(50));
    assert_eq!(summary.pending_months, vec![month(2024, 1), month(2024, 3)]);
    assert_eq!(summary.paid_months, vec![month(2024, 2)]);

    let outstanding = DebtService::outstanding(&store, &owner, month(2024, 2)).await.unwrap();
    assert_eq!(months_of(&outstanding), vec![month(2024, 1)]);
}

// ---------------------------------------------------------------------------
// Bulk payments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn paying_ahead_generates_and_pays_future_months() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let ana = subscriber(&store, &service, dec!(20), date(2024, 1, 1)).await;
    let scope = DebtScope::subscriber(service.id, ana.id);

    let receipt = BulkPaymentProcessor::pay_ahead(
        &store,
        scope,
        month(2024, 1),
        3,
        dec!(20),
        at(2024, 1, 5),
        &cats,
    )
    .await
    .unwrap();

    assert_eq!(receipt.paid.len(), 3);
    assert!(receipt.paid.iter().all(|p| p.generated));
    assert_eq!(receipt.total, dec!(60));
    let debts = store.list_debts(&scope).await.unwrap();
    assert_eq!(
        months_of(&debts),
        vec![month(2024, 1), month(2024, 2), month(2024, 3)]
    );
    assert!(debts.iter().all(Debt::is_paid));

    let txns = store.list_transactions().await.unwrap();
    assert_eq!(txns.len(), 3);
    assert!(txns
        .iter()
        .all(|t| t.kind == TransactionKind::Income && t.amount == dec!(20)));

    // Materializing afterwards must not duplicate the prepaid months.
    let report = Materializer::materialize(&store, service.id, at(2024, 3, 20)).await.unwrap();
    assert_eq!(report.created_in(&scope).count(), 0);
}

#[tokio::test]
async fn bulk_payment_orders_and_collapses_labels() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);
    Materializer::materialize(&store, service.id, at(2024, 1, 20)).await.unwrap();

    let request = BulkPaymentRequest {
        scope: owner,
        payment_date: at(2024, 1, 20),
        months: vec!["Marzo 2024".into(), "enero de 2024".into(), "MARZO 2024".into()],
        amount: dec!(50),
    };
    let receipt = BulkPaymentProcessor::pay_months(&store, request, &cats).await.unwrap();

    let paid: Vec<_> = receipt.paid.iter().map(|p| p.month).collect();
    assert_eq!(paid, vec![month(2024, 1), month(2024, 3)]);
    assert!(!receipt.paid[0].generated);
    assert!(receipt.paid[1].generated);
    assert_eq!(store.list_transactions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_label_rejects_the_whole_batch() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;

    let request = BulkPaymentRequest {
        scope: DebtScope::owner(service.id),
        payment_date: at(2024, 1, 20),
        months: vec!["Enero 2024".into(), "Brumario 2024".into()],
        amount: dec!(50),
    };
    let err = BulkPaymentProcessor::pay_months(&store, request, &cats).await.unwrap_err();
    assert!(matches!(err, CoreError::MalformedLabel(_)));
    assert!(store.list_transactions().await.unwrap().is_empty());
    assert!(store
        .list_debts(&DebtScope::owner(service.id))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn interrupted_bulk_payment_resumes_without_duplicates() {
    let store = FlakyStore::default();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let ana = subscriber(&store, &service, dec!(20), date(2024, 1, 1)).await;
    let scope = DebtScope::subscriber(service.id, ana.id);
    store.fail_inserts_for(Some(month(2024, 2)));

    let (from, paid_on) = (month(2024, 1), at(2024, 1, 5));
    let err = BulkPaymentProcessor::pay_ahead(&store, scope, from, 3, dec!(20), paid_on, &cats)
        .await
        .unwrap_err();
    match &err {
        CoreError::BatchInterrupted {
            completed, month: m, ..
        } => {
            assert_eq!(*completed, 1);
            assert_eq!(*m, month(2024, 2));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_transient());

    store.fail_inserts_for(None);
    let receipt = BulkPaymentProcessor::pay_ahead(&store, scope, from, 3, dec!(20), paid_on, &cats)
        .await
        .unwrap();
    assert_eq!(receipt.already_paid, vec![month(2024, 1)]);
    assert_eq!(receipt.paid.len(), 2);
    assert_eq!(receipt.total, dec!(40));
    assert_eq!(store.list_transactions().await.unwrap().len(), 3);
}

#[test]
fn advance_months_requires_a_positive_count() {
    assert!(matches!(
        BulkPaymentProcessor::advance_months(month(2024, 11), 0),
        Err(CoreError::Validation(_))
    ));
    assert_eq!(
        BulkPaymentProcessor::advance_months(month(2024, 11), 3).unwrap(),
        vec![month(2024, 11), month(2024, 12), month(2025, 1)]
    );
}

#[test]
fn advance_months_stop_at_the_last_labelled_year() {
    assert!(matches!(
        BulkPaymentProcessor::advance_months(month(9999, 11), 3),
        Err(CoreError::Validation(_))
    ));
    assert_eq!(
        BulkPaymentProcessor::advance_months(month(9999, 11), 2).unwrap(),
        vec![month(9999, 11), month(9999, 12)]
    );
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_a_service_cascades_but_keeps_wallet_entries() {
    let store = InMemoryStore::new();
    let cats = WalletCategories::default();
    let service = streaming(&store, dec!(50), 15).await;
    let ana = subscriber(&store, &service, dec!(20), date(2024, 1, 1)).await;
    Materializer::materialize(&store, service.id, at(2024, 2, 20)).await.unwrap();
    let scope = DebtScope::subscriber(service.id, ana.id);
    let first = store.list_debts(&scope).await.unwrap().remove(0);
    DebtService::pay(&store, &scope, first.id, at(2024, 2, 20), &cats).await.unwrap();

    let report = RegistryService::delete_service(&store, service.id).await.unwrap();
    assert_eq!(report.subscribers_removed, 1);
    assert_eq!(report.debts_removed, 4);
    assert!(store.get_service(service.id).await.unwrap().is_none());
    assert!(store.list_debts(&scope).await.unwrap().is_empty());
    assert_eq!(store.list_transactions().await.unwrap().len(), 1);

    let again = RegistryService::delete_service(&store, service.id).await;
    assert!(matches!(again, Err(CoreError::ServiceNotFound(_))));
}

#[tokio::test]
async fn deleting_a_subscriber_only_removes_its_debts() {
    let store = InMemoryStore::new();
    let service = streaming(&store, dec!(50), 15).await;
    let ana = subscriber(&store, &service, dec!(20), date(2024, 1, 1)).await;
    Materializer::materialize(&store, service.id, at(2024, 2, 20)).await.unwrap();

    let removed = RegistryService::delete_subscriber(&store, service.id, ana.id).await.unwrap();
    assert_eq!(removed, 2);
    assert!(store.list_subscribers(service.id).await.unwrap().is_empty());
    assert_eq!(
        store.list_debts(&DebtScope::owner(service.id)).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn registry_validates_input() {
    let store = InMemoryStore::new();
    let created = at(2024, 1, 1);
    let blank =
        RegistryService::create_service(&store, NewService::new("  ", dec!(1), 1), created).await;
    assert!(matches!(blank, Err(CoreError::Validation(_))));
    let negative =
        RegistryService::create_service(&store, NewService::new("Video", dec!(-1), 1), created)
            .await;
    assert!(matches!(negative, Err(CoreError::Validation(_))));
    let day = RegistryService::create_service(&store, NewService::new("Video", dec!(1), 0), created)
        .await;
    assert!(matches!(day, Err(CoreError::Validation(_))));
    let far_future = NewService::new("Video", dec!(1), 1).starting(date(10000, 1, 1));
    let far_future = RegistryService::create_service(&store, far_future, created).await;
    assert!(matches!(far_future, Err(CoreError::Validation(_))));

    let service = streaming(&store, dec!(50), 15).await;
    let quota = RegistryService::create_subscriber(
        &store,
        service.id,
        NewSubscriber::new("Ana", dec!(-5)),
        at(2024, 1, 1),
    )
    .await;
    assert!(matches!(quota, Err(CoreError::Validation(_))));

    let orphan = RegistryService::create_subscriber(
        &store,
        Uuid::new_v4(),
        NewSubscriber::new("Ana", dec!(5)),
        at(2024, 1, 1),
    )
    .await;
    assert!(matches!(orphan, Err(CoreError::ServiceNotFound(_))));
}

#[tokio::test]
async fn service_updates_do_not_touch_existing_debts() {
    let store = InMemoryStore::new();
    let service = streaming(&store, dec!(50), 15).await;
    let owner = DebtScope::owner(service.id);
    Materializer::materialize(&store, service.id, at(2024, 1, 20)).await.unwrap();

    let updated = RegistryService::update_service(
        &store,
        service.id,
        ServiceUpdate {
            name: Some(" Video ".into()),
            cost: Some(dec!(60)),
            ..Default::default()
        },
        at(2024, 2, 1),
    )
    .await
    .unwrap();
    assert_eq!(updated.name, "Video");
    assert_eq!(updated.updated_at, at(2024, 2, 1));

    Materializer::materialize(&store, service.id, at(2024, 2, 20)).await.unwrap();
    let amounts: Vec<_> = store
        .list_debts(&owner)
        .await
        .unwrap()
        .iter()
        .map(|d| d.amount)
        .collect();
    assert_eq!(amounts, vec![dec!(50), dec!(60)]);
}
