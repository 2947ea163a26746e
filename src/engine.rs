//! Entry point for UI handlers: one engine per user, wiring configuration,
//! a clock and a [`BillingStore`] together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use subsplit_config::{Config, ConfigManager};
use subsplit_core::{
    BillingStore, BulkPaymentProcessor, BulkPaymentReceipt, BulkPaymentRequest, CascadeReport,
    Clock, CoreError, DebtService, DebtSummary, DeletionReceipt, GeneratedDebt, InitialStatus,
    MaterializeReport, Materializer, PaymentReceipt, RegistryService, RevertOutcome,
    ServiceUpdate, SubscriberUpdate, WalletBalance, WalletService,
};
use subsplit_domain::{
    BillingMonth, Debt, DebtScope, NewService, NewSubscriber, Service, Subscriber,
    WalletTransaction,
};
use subsplit_storage_json::JsonBillingStore;

use crate::{errors::Result, system_clock::SystemClock};

pub struct BillingEngine {
    config: Config,
    store: Arc<dyn BillingStore>,
    clock: Arc<dyn Clock>,
}

impl BillingEngine {
    /// Opens the JSON store under the configured data root.
    pub fn open(config: Config) -> Result<Self> {
        let root = config.resolve_data_root();
        let store = JsonBillingStore::open(&root)?;
        debug!(root = %root.display(), "billing engine opened");
        Ok(Self::with_store(config, Arc::new(store), Arc::new(SystemClock)))
    }

    /// Loads the config persisted by `manager` and opens its store.
    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        Self::open(manager.load()?)
    }

    pub fn with_store(config: Config, store: Arc<dyn BillingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn BillingStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn current_month(&self) -> BillingMonth {
        BillingMonth::from_date_clamped(self.clock.today())
    }

    // Registry -------------------------------------------------------------

    pub async fn create_service(&self, draft: NewService) -> Result<Service> {
        Ok(RegistryService::create_service(self.store(), draft, self.now()).await?)
    }

    pub async fn update_service(&self, service_id: Uuid, update: ServiceUpdate) -> Result<Service> {
        Ok(RegistryService::update_service(self.store(), service_id, update, self.now()).await?)
    }

    pub async fn delete_service(&self, service_id: Uuid) -> Result<CascadeReport> {
        Ok(RegistryService::delete_service(self.store(), service_id).await?)
    }

    pub async fn services(&self) -> Result<Vec<Service>> {
        Ok(self.store.list_services().await?)
    }

    pub async fn add_subscriber(
        &self,
        service_id: Uuid,
        draft: NewSubscriber,
    ) -> Result<Subscriber> {
        let now = self.now();
        Ok(RegistryService::create_subscriber(self.store(), service_id, draft, now).await?)
    }

    pub async fn update_subscriber(
        &self,
        service_id: Uuid,
        subscriber_id: Uuid,
        update: SubscriberUpdate,
    ) -> Result<Subscriber> {
        Ok(
            RegistryService::update_subscriber(self.store(), service_id, subscriber_id, update)
                .await?,
        )
    }

    pub async fn remove_subscriber(&self, service_id: Uuid, subscriber_id: Uuid) -> Result<usize> {
        Ok(RegistryService::delete_subscriber(self.store(), service_id, subscriber_id).await?)
    }

    pub async fn subscribers(&self, service_id: Uuid) -> Result<Vec<Subscriber>> {
        Ok(self.store.list_subscribers(service_id).await?)
    }

    // Billing cycles -------------------------------------------------------

    /// Brings a service's debts up to date. Safe to call on every screen entry.
    pub async fn materialize(&self, service_id: Uuid) -> Result<MaterializeReport> {
        let today = self.clock.today();
        Ok(Materializer::materialize_on(self.store(), service_id, today, self.now()).await?)
    }

    pub async fn materialize_all(
        &self,
    ) -> Result<Vec<(Uuid, std::result::Result<MaterializeReport, CoreError>)>> {
        Ok(Materializer::materialize_all(self.store(), self.clock.today(), self.now()).await?)
    }

    // Debts ----------------------------------------------------------------

    pub async fn debts(&self, scope: &DebtScope) -> Result<Vec<Debt>> {
        Ok(DebtService::list_debts(self.store(), scope).await?)
    }

    pub async fn debt_summary(&self, scope: &DebtScope) -> Result<DebtSummary> {
        Ok(DebtService::summary(self.store(), scope).await?)
    }

    /// Creates the debt for `month_label`. When `paid` is set the debt is
    /// paid immediately with the current time as payment date.
    pub async fn generate_debt(
        &self,
        scope: &DebtScope,
        month_label: &str,
        amount: Decimal,
        paid: bool,
    ) -> Result<GeneratedDebt> {
        let month = BillingMonth::parse_label(month_label)?;
        let now = self.now();
        let initial = if paid {
            InitialStatus::Paid { paid_at: now }
        } else {
            InitialStatus::Pending
        };
        Ok(DebtService::generate(
            self.store(),
            scope,
            amount,
            month,
            initial,
            now,
            &self.config.categories,
        )
        .await?)
    }

    pub async fn pay(&self, scope: &DebtScope, debt_id: Uuid) -> Result<PaymentReceipt> {
        self.pay_on(scope, debt_id, self.now()).await
    }

    pub async fn pay_on(
        &self,
        scope: &DebtScope,
        debt_id: Uuid,
        payment_date: DateTime<Utc>,
    ) -> Result<PaymentReceipt> {
        let categories = &self.config.categories;
        Ok(DebtService::pay(self.store(), scope, debt_id, payment_date, categories).await?)
    }

    pub async fn revert(&self, scope: &DebtScope, debt_id: Uuid) -> Result<RevertOutcome> {
        Ok(DebtService::revert_to_pending(
            self.store(),
            scope,
            debt_id,
            self.now(),
            &self.config.categories,
        )
        .await?)
    }

    pub async fn delete_debt(&self, scope: &DebtScope, debt_id: Uuid) -> Result<DeletionReceipt> {
        let categories = &self.config.categories;
        Ok(DebtService::delete(self.store(), scope, debt_id, self.now(), categories).await?)
    }

    // Bulk payments --------------------------------------------------------

    /// Pays the listed months. Months without a debt are generated at
    /// `amount`, or at the scope's current quota or cost when omitted.
    pub async fn bulk_pay(
        &self,
        scope: DebtScope,
        months: Vec<String>,
        amount: Option<Decimal>,
    ) -> Result<BulkPaymentReceipt> {
        let amount = match amount {
            Some(amount) => amount,
            None => self.default_amount(&scope).await?,
        };
        let request = BulkPaymentRequest {
            scope,
            payment_date: self.now(),
            months,
            amount,
        };
        Ok(BulkPaymentProcessor::pay_months(self.store(), request, &self.config.categories).await?)
    }

    /// Pays `count` months starting with the current one.
    pub async fn pay_ahead(&self, scope: DebtScope, count: usize) -> Result<BulkPaymentReceipt> {
        let amount = self.default_amount(&scope).await?;
        Ok(BulkPaymentProcessor::pay_ahead(
            self.store(),
            scope,
            self.current_month(),
            count,
            amount,
            self.now(),
            &self.config.categories,
        )
        .await?)
    }

    // Wallet ---------------------------------------------------------------

    pub async fn wallet_balance(&self) -> Result<WalletBalance> {
        Ok(WalletService::balance(self.store()).await?)
    }

    pub async fn wallet_entries(&self, service_id: Uuid) -> Result<Vec<WalletTransaction>> {
        Ok(WalletService::entries_for_service(self.store(), service_id).await?)
    }

    /// Monthly amount owed in `scope`: the service cost for the owner, the
    /// quota for a subscriber.
    async fn default_amount(&self, scope: &DebtScope) -> Result<Decimal> {
        match *scope {
            DebtScope::Owner { service_id } => {
                let service = self
                    .store
                    .get_service(service_id)
                    .await?
                    .ok_or(CoreError::ServiceNotFound(service_id))?;
                Ok(service.billing_terms().map_err(CoreError::from)?.cost)
            }
            DebtScope::Subscriber {
                service_id,
                subscriber_id,
            } => {
                let subscriber = self
                    .store
                    .get_subscriber(service_id, subscriber_id)
                    .await?
                    .ok_or(CoreError::SubscriberNotFound(subscriber_id))?;
                Ok(subscriber.quota)
            }
        }
    }
}
