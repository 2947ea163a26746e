//! The per-user document tree shared by the bundled store implementations.
//!
//! Layout mirrors the collection paths used by the engine:
//! `services/{id}` holding `subscribers/{id}/debts/{id}` and
//! `owner_debts/{id}`, plus a flat append-only `transactions` list.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use subsplit_domain::{
    BillingMonth, Debt, DebtScope, NewDebt, NewService, NewSubscriber, NewWalletTransaction,
    Service, Subscriber, WalletTransaction,
};

use crate::{storage::DebtInsert, CoreError};

pub const CURRENT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingDocument {
    #[serde(default = "BillingDocument::schema_version_default")]
    pub schema_version: u8,
    #[serde(default)]
    pub services: BTreeMap<Uuid, ServiceNode>,
    #[serde(default)]
    pub transactions: Vec<WalletTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNode {
    #[serde(flatten)]
    pub service: Service,
    #[serde(default)]
    pub subscribers: BTreeMap<Uuid, SubscriberNode>,
    #[serde(default, rename = "owner_debts")]
    pub owner_debts: BTreeMap<Uuid, Debt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberNode {
    #[serde(flatten)]
    pub subscriber: Subscriber,
    #[serde(default)]
    pub debts: BTreeMap<Uuid, Debt>,
}

impl Default for BillingDocument {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            services: BTreeMap::new(),
            transactions: Vec::new(),
        }
    }
}

impl BillingDocument {
    pub fn schema_version_default() -> u8 {
        CURRENT_SCHEMA_VERSION
    }

    pub fn create_service(&mut self, draft: NewService, now: DateTime<Utc>) -> Service {
        let service = draft.into_service(Uuid::new_v4(), now);
        self.services.insert(
            service.id,
            ServiceNode {
                service: service.clone(),
                subscribers: BTreeMap::new(),
                owner_debts: BTreeMap::new(),
            },
        );
        service
    }

    pub fn service(&self, id: Uuid) -> Option<&Service> {
        self.services.get(&id).map(|node| &node.service)
    }

    pub fn services(&self) -> Vec<Service> {
        let mut services: Vec<_> = self.services.values().map(|n| n.service.clone()).collect();
        services.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        services
    }

    pub fn update_service(&mut self, service: &Service) -> Result<(), CoreError> {
        let node = self.service_node_mut(service.id)?;
        node.service = service.clone();
        Ok(())
    }

    pub fn delete_service(&mut self, id: Uuid) -> bool {
        self.services.remove(&id).is_some()
    }

    pub fn create_subscriber(
        &mut self,
        service_id: Uuid,
        draft: NewSubscriber,
        now: DateTime<Utc>,
    ) -> Result<Subscriber, CoreError> {
        let node = self.service_node_mut(service_id)?;
        let subscriber = draft.into_subscriber(Uuid::new_v4(), now);
        node.subscribers.insert(
            subscriber.id,
            SubscriberNode {
                subscriber: subscriber.clone(),
                debts: BTreeMap::new(),
            },
        );
        Ok(subscriber)
    }

    pub fn subscriber(&self, service_id: Uuid, subscriber_id: Uuid) -> Option<&Subscriber> {
        self.services
            .get(&service_id)?
            .subscribers
            .get(&subscriber_id)
            .map(|node| &node.subscriber)
    }

    pub fn subscribers(&self, service_id: Uuid) -> Vec<Subscriber> {
        let mut subscribers: Vec<_> = self
            .services
            .get(&service_id)
            .map(|node| {
                node.subscribers
                    .values()
                    .map(|s| s.subscriber.clone())
                    .collect()
            })
            .unwrap_or_default();
        subscribers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        subscribers
    }

    pub fn update_subscriber(
        &mut self,
        service_id: Uuid,
        subscriber: &Subscriber,
    ) -> Result<(), CoreError> {
        let node = self
            .service_node_mut(service_id)?
            .subscribers
            .get_mut(&subscriber.id)
            .ok_or(CoreError::SubscriberNotFound(subscriber.id))?;
        node.subscriber = subscriber.clone();
        Ok(())
    }

    pub fn delete_subscriber(&mut self, service_id: Uuid, subscriber_id: Uuid) -> bool {
        self.services
            .get_mut(&service_id)
            .and_then(|node| node.subscribers.remove(&subscriber_id))
            .is_some()
    }

    /// Debts under `scope`, oldest month first. Missing parents read as empty.
    pub fn debts(&self, scope: &DebtScope) -> Vec<Debt> {
        let mut debts: Vec<_> = self
            .debt_collection(scope)
            .map(|debts| debts.values().cloned().collect())
            .unwrap_or_default();
        debts.sort_by_key(|debt| debt.month);
        debts
    }

    pub fn debt(&self, scope: &DebtScope, debt_id: Uuid) -> Option<&Debt> {
        self.debt_collection(scope)?.get(&debt_id)
    }

    pub fn debt_by_month(&self, scope: &DebtScope, month: BillingMonth) -> Option<&Debt> {
        self.debt_collection(scope)?
            .values()
            .find(|debt| debt.month == month)
    }

    /// Inserts a pending debt unless one already exists for the same month.
    pub fn insert_debt_if_absent(
        &mut self,
        scope: &DebtScope,
        draft: NewDebt,
        now: DateTime<Utc>,
    ) -> Result<DebtInsert, CoreError> {
        let debts = self.debt_collection_mut(scope)?;
        if let Some(existing) = debts.values().find(|debt| debt.month == draft.month) {
            return Ok(DebtInsert::Existing(existing.clone()));
        }
        let debt = draft.into_debt(Uuid::new_v4(), now);
        debts.insert(debt.id, debt.clone());
        Ok(DebtInsert::Created(debt))
    }

    pub fn update_debt(&mut self, scope: &DebtScope, debt: &Debt) -> Result<(), CoreError> {
        let slot = self
            .debt_collection_mut(scope)?
            .get_mut(&debt.id)
            .ok_or(CoreError::DebtNotFound(debt.id))?;
        *slot = debt.clone();
        Ok(())
    }

    pub fn delete_debt(&mut self, scope: &DebtScope, debt_id: Uuid) -> bool {
        self.debt_collection_mut(scope)
            .map(|debts| debts.remove(&debt_id).is_some())
            .unwrap_or(false)
    }

    pub fn append_transaction(&mut self, draft: NewWalletTransaction) -> WalletTransaction {
        let transaction = draft.into_transaction(Uuid::new_v4());
        self.transactions.push(transaction.clone());
        transaction
    }

    pub fn transactions_for_debt(&self, debt_id: Uuid) -> Vec<WalletTransaction> {
        self.transactions
            .iter()
            .filter(|txn| txn.debt_id == Some(debt_id))
            .cloned()
            .collect()
    }

    fn service_node_mut(&mut self, id: Uuid) -> Result<&mut ServiceNode, CoreError> {
        self.services
            .get_mut(&id)
            .ok_or(CoreError::ServiceNotFound(id))
    }

    fn debt_collection(&self, scope: &DebtScope) -> Option<&BTreeMap<Uuid, Debt>> {
        let node = self.services.get(&scope.service_id())?;
        match scope {
            DebtScope::Owner { .. } => Some(&node.owner_debts),
            DebtScope::Subscriber { subscriber_id, .. } => {
                node.subscribers.get(subscriber_id).map(|s| &s.debts)
            }
        }
    }

    fn debt_collection_mut(
        &mut self,
        scope: &DebtScope,
    ) -> Result<&mut BTreeMap<Uuid, Debt>, CoreError> {
        let node = self.service_node_mut(scope.service_id())?;
        match scope {
            DebtScope::Owner { .. } => Ok(&mut node.owner_debts),
            DebtScope::Subscriber { subscriber_id, .. } => node
                .subscribers
                .get_mut(subscriber_id)
                .map(|s| &mut s.debts)
                .ok_or(CoreError::SubscriberNotFound(*subscriber_id)),
        }
    }
}
