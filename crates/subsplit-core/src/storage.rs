use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use subsplit_domain::{
    BillingMonth, Debt, DebtScope, NewDebt, NewService, NewSubscriber, NewWalletTransaction,
    Service, Subscriber, WalletTransaction,
};

use crate::{document::BillingDocument, CoreError};

/// Outcome of a check-and-insert on a debt collection.
#[derive(Debug, Clone, PartialEq)]
pub enum DebtInsert {
    Created(Debt),
    Existing(Debt),
}

impl DebtInsert {
    pub fn was_created(&self) -> bool {
        matches!(self, DebtInsert::Created(_))
    }
}

/// Collection-scoped persistence for one user's services, debts and wallet.
///
/// Identifiers are assigned by the store on create. Reads under a missing
/// parent return empty results; writes under a missing parent fail with the
/// matching `*NotFound` error. Any backend failure surfaces as
/// [`CoreError::StoreUnavailable`].
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn create_service(
        &self,
        draft: NewService,
        now: DateTime<Utc>,
    ) -> Result<Service, CoreError>;
    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, CoreError>;
    async fn list_services(&self) -> Result<Vec<Service>, CoreError>;
    async fn update_service(&self, service: &Service) -> Result<(), CoreError>;
    /// Removes the service document. Callers remove nested records first.
    async fn delete_service(&self, service_id: Uuid) -> Result<bool, CoreError>;

    async fn create_subscriber(
        &self,
        service_id: Uuid,
        draft: NewSubscriber,
        now: DateTime<Utc>,
    ) -> Result<Subscriber, CoreError>;
    async fn get_subscriber(
        &self,
        service_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscriber>, CoreError>;
    async fn list_subscribers(&self, service_id: Uuid) -> Result<Vec<Subscriber>, CoreError>;
    async fn update_subscriber(
        &self,
        service_id: Uuid,
        subscriber: &Subscriber,
    ) -> Result<(), CoreError>;
    async fn delete_subscriber(
        &self,
        service_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<bool, CoreError>;

    /// Debts in `scope`, oldest month first.
    async fn list_debts(&self, scope: &DebtScope) -> Result<Vec<Debt>, CoreError>;
    async fn get_debt(&self, scope: &DebtScope, debt_id: Uuid) -> Result<Option<Debt>, CoreError>;
    async fn find_debt_by_month(
        &self,
        scope: &DebtScope,
        month: BillingMonth,
    ) -> Result<Option<Debt>, CoreError>;
    /// Creates a pending debt unless `scope` already holds one for the same
    /// month. The check and the insert happen under one write.
    async fn insert_debt_if_absent(
        &self,
        scope: &DebtScope,
        draft: NewDebt,
        now: DateTime<Utc>,
    ) -> Result<DebtInsert, CoreError>;
    async fn update_debt(&self, scope: &DebtScope, debt: &Debt) -> Result<(), CoreError>;
    async fn delete_debt(&self, scope: &DebtScope, debt_id: Uuid) -> Result<bool, CoreError>;

    async fn append_transaction(
        &self,
        draft: NewWalletTransaction,
    ) -> Result<WalletTransaction, CoreError>;
    /// Every wallet entry in append order.
    async fn list_transactions(&self) -> Result<Vec<WalletTransaction>, CoreError>;
    async fn list_transactions_for_debt(
        &self,
        debt_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, CoreError>;
}

/// Volatile store holding the document tree in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    document: RwLock<BillingDocument>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: BillingDocument) -> Self {
        Self {
            document: RwLock::new(document),
        }
    }

    /// Copy of the current document tree.
    pub async fn snapshot(&self) -> BillingDocument {
        self.document.read().await.clone()
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn create_service(
        &self,
        draft: NewService,
        now: DateTime<Utc>,
    ) -> Result<Service, CoreError> {
        Ok(self.document.write().await.create_service(draft, now))
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, CoreError> {
        Ok(self.document.read().await.service(service_id).cloned())
    }

    async fn list_services(&self) -> Result<Vec<Service>, CoreError> {
        Ok(self.document.read().await.services())
    }

    async fn update_service(&self, service: &Service) -> Result<(), CoreError> {
        self.document.write().await.update_service(service)
    }

    async fn delete_service(&self, service_id: Uuid) -> Result<bool, CoreError> {
        Ok(self.document.write().await.delete_service(service_id))
    }

    async fn create_subscriber(
        &self,
        service_id: Uuid,
        draft: NewSubscriber,
        now: DateTime<Utc>,
    ) -> Result<Subscriber, CoreError> {
        self.document
            .write()
            .await
            .create_subscriber(service_id, draft, now)
    }

    async fn get_subscriber(
        &self,
        service_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscriber>, CoreError> {
        Ok(self
            .document
            .read()
            .await
            .subscriber(service_id, subscriber_id)
            .cloned())
    }

    async fn list_subscribers(&self, service_id: Uuid) -> Result<Vec<Subscriber>, CoreError> {
        Ok(self.document.read().await.subscribers(service_id))
    }

    async fn update_subscriber(
        &self,
        service_id: Uuid,
        subscriber: &Subscriber,
    ) -> Result<(), CoreError> {
        self.document
            .write()
            .await
            .update_subscriber(service_id, subscriber)
    }

    async fn delete_subscriber(
        &self,
        service_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<bool, CoreError> {
        Ok(self
            .document
            .write()
            .await
            .delete_subscriber(service_id, subscriber_id))
    }

    async fn list_debts(&self, scope: &DebtScope) -> Result<Vec<Debt>, CoreError> {
        Ok(self.document.read().await.debts(scope))
    }

    async fn get_debt(&self, scope: &DebtScope, debt_id: Uuid) -> Result<Option<Debt>, CoreError> {
        Ok(self.document.read().await.debt(scope, debt_id).cloned())
    }

    async fn find_debt_by_month(
        &self,
        scope: &DebtScope,
        month: BillingMonth,
    ) -> Result<Option<Debt>, CoreError> {
        Ok(self.document.read().await.debt_by_month(scope, month).cloned())
    }

    async fn insert_debt_if_absent(
        &self,
        scope: &DebtScope,
        draft: NewDebt,
        now: DateTime<Utc>,
    ) -> Result<DebtInsert, CoreError> {
        self.document
            .write()
            .await
            .insert_debt_if_absent(scope, draft, now)
    }

    async fn update_debt(&self, scope: &DebtScope, debt: &Debt) -> Result<(), CoreError> {
        self.document.write().await.update_debt(scope, debt)
    }

    async fn delete_debt(&self, scope: &DebtScope, debt_id: Uuid) -> Result<bool, CoreError> {
        Ok(self.document.write().await.delete_debt(scope, debt_id))
    }

    async fn append_transaction(
        &self,
        draft: NewWalletTransaction,
    ) -> Result<WalletTransaction, CoreError> {
        Ok(self.document.write().await.append_transaction(draft))
    }

    async fn list_transactions(&self) -> Result<Vec<WalletTransaction>, CoreError> {
        Ok(self.document.read().await.transactions.clone())
    }

    async fn list_transactions_for_debt(
        &self,
        debt_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, CoreError> {
        Ok(self.document.read().await.transactions_for_debt(debt_id))
    }
}
