//! In-process record store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Filter, Record, RecordId, Store, StoreError};
use crate::validation::ValidationError;

/// Insertion-ordered in-memory store for one collection.
///
/// # Thread Safety
///
/// Uses `RwLock` so readers (API layer) never block each other; the owning
/// manager is the only writer.
pub struct MemoryStore<R: Record> {
    records: RwLock<Vec<R>>,
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Build a store from already-persisted records, keeping their order.
    ///
    /// Every record must carry an assigned, unique id and pass validation.
    pub fn from_records(records: Vec<R>) -> Result<Self, StoreError> {
        let mut seen = std::collections::HashSet::with_capacity(records.len());
        for record in &records {
            if !record.id().is_assigned() {
                return Err(ValidationError::new(format!(
                    "{} record without id",
                    R::COLLECTION
                ))
                .into());
            }
            if !seen.insert(record.id().clone()) {
                return Err(ValidationError::new(format!(
                    "duplicate {} id {}",
                    R::COLLECTION,
                    record.id()
                ))
                .into());
            }
            record.validate()?;
        }
        Ok(Self {
            records: RwLock::new(records),
        })
    }

    /// Copy of every record, in insertion order.
    pub async fn snapshot(&self) -> Vec<R> {
        self.records.read().await.clone()
    }

    /// Replace every record; used to roll back a write that failed to persist.
    pub(crate) async fn restore(&self, records: Vec<R>) {
        *self.records.write().await = records;
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> Store<R> for MemoryStore<R> {
    async fn insert(&self, mut record: R) -> Result<RecordId, StoreError> {
        if record.id().is_assigned() {
            return Err(ValidationError::new(format!(
                "{} record already has id {}",
                R::COLLECTION,
                record.id()
            ))
            .into());
        }
        record.validate()?;

        let id = RecordId::generate();
        record.assign_id(id.clone());

        let mut records = self.records.write().await;
        records.push(record);
        debug!(collection = R::COLLECTION, id = %id, "Record inserted");
        Ok(id)
    }

    async fn get(&self, id: &RecordId) -> Result<Option<R>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id() == id).cloned())
    }

    async fn update(&self, id: &RecordId, patch: R::Patch) -> Result<R, StoreError> {
        let mut records = self.records.write().await;
        let slot = records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| StoreError::NotFound {
                collection: R::COLLECTION,
                id: id.clone(),
            })?;

        // Work on a copy so a rejected patch leaves the stored record untouched
        let mut updated = slot.clone();
        updated.apply(patch.clone())?;
        updated.validate()?;
        *slot = updated.clone();

        debug!(collection = R::COLLECTION, id = %id, patch = ?patch, "Record updated");
        Ok(updated)
    }

    async fn delete(&self, id: &RecordId) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Err(StoreError::NotFound {
                collection: R::COLLECTION,
                id: id.clone(),
            });
        }
        debug!(collection = R::COLLECTION, id = %id, "Record deleted");
        Ok(())
    }

    async fn list(&self, filter: &Filter<R::Status>) -> Result<Vec<R>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| filter.matches(*r))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{ManagedOrder, OrderPatch, OrderSpec, OrderStatus};
    use crate::store::Match;
    use crate::types::{Direction, OrderType};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_order() -> ManagedOrder {
        ManagedOrder::new(
            OrderSpec {
                exchange: "paper".to_string(),
                pair: "BTC/USD".to_string(),
                direction: Direction::Long,
                leverage: dec!(1),
                price: dec!(100),
                amount: dec!(2),
                order_type: OrderType::Limit,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_assigns_id() {
        let store = MemoryStore::new();
        let id = store.insert(sample_order()).await.unwrap();

        let order = store.get(&id).await.unwrap().unwrap();
        assert_eq!(order.id, id);
        assert_eq!(order.status, OrderStatus::Uninitialized);
        assert!(store.get(&RecordId::new("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_record() {
        let store = MemoryStore::new();
        let mut order = sample_order();
        order.original_order.amount = dec!(0);

        let err = store.insert(order).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_rejects_preassigned_id() {
        let store = MemoryStore::new();
        let mut order = sample_order();
        order.id = RecordId::new("forced");

        assert!(matches!(
            store.insert(order).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_fail() {
        let store: MemoryStore<ManagedOrder> = MemoryStore::new();
        let missing = RecordId::new("nope");

        let err = store
            .update(&missing, OrderPatch::attempt(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let err = store.delete(&missing).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejected_patch_leaves_record_untouched() {
        let store = MemoryStore::new();
        let id = store.insert(sample_order()).await.unwrap();

        // ORDER_FILLED is not reachable from UNINITIALIZED
        let patch = OrderPatch {
            status: Some(OrderStatus::OrderFilled),
            ..Default::default()
        };
        assert!(store.update(&id, patch).await.is_err());

        let order = store.get(&id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Uninitialized);
    }

    #[tokio::test]
    async fn test_list_filters_and_keeps_order() {
        let store = MemoryStore::new();
        let a = store.insert(sample_order()).await.unwrap();
        let b = store.insert(sample_order()).await.unwrap();
        let c = store.insert(sample_order()).await.unwrap();

        store
            .update(&b, OrderPatch::placement_failed("venue down"))
            .await
            .unwrap();
        store
            .update(&c, OrderPatch::requested("ext-1"))
            .await
            .unwrap();

        let all = store.list(&Filter::all()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, vec![a.clone(), b.clone(), c.clone()]);

        let failed = store
            .list(&Filter::open().status(Match::Eq(OrderStatus::PlacementFailed)))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, b);

        let not_fresh = store
            .list(&Filter::all().status(Match::Ne(OrderStatus::Uninitialized)))
            .await
            .unwrap();
        assert_eq!(not_fresh.len(), 2);

        store.delete(&a).await.unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_from_records_rejects_duplicates() {
        let mut order = sample_order();
        order.assign_id(RecordId::new("dup"));
        let result = MemoryStore::from_records(vec![order.clone(), order]);
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }
}
