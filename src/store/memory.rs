//! In-memory order store for tests and local runs without Postgres.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DbErr;

use super::{OrderStore, OrderTransaction, StoreResult};
use crate::{
    models::{NewOrder, Order, OrderLine},
    status::OrderStatus,
};

#[derive(Debug, Default)]
struct MemoryState {
    orders: BTreeMap<i64, Order>,
    next_order_id: i64,
    next_line_id: i64,
    fail_on_insert: bool,
    fail_on_commit: bool,
    commits: usize,
    rollbacks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent `insert_order` fail.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.lock().fail_on_insert = fail;
    }

    /// Makes every subsequent `commit` fail and discard its writes.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.lock().fail_on_commit = fail;
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn line_count(&self) -> usize {
        self.lock()
            .orders
            .values()
            .map(|order| order.items.len())
            .sum()
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    /// Seeds an order directly, bypassing the saga.
    pub fn insert(&self, order: NewOrder) -> Order {
        let mut state = self.lock();
        let order = materialize(&mut state, order);
        state.orders.insert(order.id, order.clone());
        order
    }
}

fn materialize(state: &mut MemoryState, order: NewOrder) -> Order {
    let now = Utc::now();
    state.next_order_id += 1;
    let id = state.next_order_id;

    let items = order
        .items
        .into_iter()
        .map(|line| {
            state.next_line_id += 1;
            OrderLine {
                id: state.next_line_id,
                order_id: id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.price,
                subtotal: line.subtotal,
                created_at: now,
            }
        })
        .collect();

    Order {
        id,
        user_id: order.user_id,
        total_amount: order.total_amount,
        status: order.status,
        items,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> StoreResult<Box<dyn OrderTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
        }))
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Order>> {
        Ok(self.lock().orders.get(&id).cloned())
    }

    async fn find_by_user(
        &self,
        user_id: i64,
        limit: u64,
        offset: u64,
    ) -> StoreResult<(Vec<Order>, u64)> {
        let state = self.lock();
        let mut owned: Vec<&Order> = state
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = owned.len() as u64;
        let page = owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn update_status(
        &self,
        id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StoreResult<Option<Order>> {
        let mut state = self.lock();
        match state.orders.get_mut(&id) {
            Some(order) if order.status == expected => {
                order.status = next;
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

struct InMemoryTransaction {
    store: InMemoryOrderStore,
    staged: Vec<Order>,
}

#[async_trait]
impl OrderTransaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order> {
        let mut state = self.store.lock();
        if state.fail_on_insert {
            return Err(DbErr::Custom("insert rejected".into()));
        }
        let order = materialize(&mut state, order);
        self.staged.push(order.clone());
        Ok(order)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTransaction { store, staged } = *self;
        let mut state = store.lock();
        if state.fail_on_commit {
            state.rollbacks += 1;
            return Err(DbErr::Custom("commit failed".into()));
        }
        for order in staged {
            state.orders.insert(order.id, order);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.store.lock().rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrderLine;
    use rust_decimal_macros::dec;

    fn new_order(user_id: i64) -> NewOrder {
        NewOrder::pending(user_id, vec![NewOrderLine::priced(1, 1, dec!(10))])
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let store = InMemoryOrderStore::new();
        let mut txn = store.begin().await.unwrap();
        let order = txn.insert_order(new_order(1)).await.unwrap();

        assert!(store.find_by_id(order.id).await.unwrap().is_none());
        txn.commit().await.unwrap();
        assert!(store.find_by_id(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rollback_discards_staged_orders() {
        let store = InMemoryOrderStore::new();
        let mut txn = store.begin().await.unwrap();
        txn.insert_order(new_order(1)).await.unwrap();
        txn.rollback().await.unwrap();

        assert_eq!(store.order_count(), 0);
        assert_eq!(store.rollbacks(), 1);
    }

    #[tokio::test]
    async fn update_status_is_compare_and_set() {
        let store = InMemoryOrderStore::new();
        let order = store.insert(new_order(1));

        let missed = store
            .update_status(order.id, OrderStatus::Processing, OrderStatus::Shipped)
            .await
            .unwrap();
        assert!(missed.is_none());

        let hit = store
            .update_status(order.id, OrderStatus::Pending, OrderStatus::Processing)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn find_by_user_pages_newest_first() {
        let store = InMemoryOrderStore::new();
        let first = store.insert(new_order(1));
        let second = store.insert(new_order(1));
        store.insert(new_order(2));

        let (page, total) = store.find_by_user(1, 1, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second.id);

        let (page, _) = store.find_by_user(1, 1, 1).await.unwrap();
        assert_eq!(page[0].id, first.id);
    }
}
