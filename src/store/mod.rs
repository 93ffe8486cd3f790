//! Persistence for orders and their lines.
//!
//! The creation saga needs a transaction that stays open across remote stock
//! calls, so writes go through [`OrderTransaction`]; reads and status updates
//! run directly against the store.

use async_trait::async_trait;
use sea_orm::DbErr;

use crate::{
    models::{NewOrder, Order},
    status::OrderStatus,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryOrderStore;
pub use postgres::SeaOrmOrderStore;

pub type StoreResult<T> = Result<T, DbErr>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn OrderTransaction>>;

    /// Loads an order with its lines.
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Order>>;

    /// Newest first. Returns the page and the total number of orders the
    /// user owns.
    async fn find_by_user(
        &self,
        user_id: i64,
        limit: u64,
        offset: u64,
    ) -> StoreResult<(Vec<Order>, u64)>;

    /// Sets `next` only if the stored status is still `expected`.
    ///
    /// Returns `None` when the row is missing or its status moved on.
    async fn update_status(
        &self,
        id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StoreResult<Option<Order>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Local write scope. Dropping it without `commit` discards the writes.
#[async_trait]
pub trait OrderTransaction: Send {
    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
