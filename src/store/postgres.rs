use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use super::{OrderStore, OrderTransaction, StoreResult};
use crate::{
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
    },
    models::{NewOrder, Order, OrderLine},
    status::OrderStatus,
};

#[derive(Clone)]
pub struct SeaOrmOrderStore {
    conn: DatabaseConnection,
}

impl SeaOrmOrderStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    async fn lines_for(
        &self,
        order_ids: Vec<i64>,
    ) -> StoreResult<HashMap<i64, Vec<OrderItemModel>>> {
        let mut by_order: HashMap<i64, Vec<OrderItemModel>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(by_order);
        }

        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.is_in(order_ids))
            .order_by_asc(OrderItemCol::Id)
            .all(&self.conn)
            .await?;
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }
        Ok(by_order)
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn begin(&self) -> StoreResult<Box<dyn OrderTransaction>> {
        let txn = self.conn.begin().await?;
        Ok(Box::new(SeaOrmTransaction { txn }))
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Order>> {
        let Some(order) = Orders::find_by_id(id).one(&self.conn).await? else {
            return Ok(None);
        };
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .order_by_asc(OrderItemCol::Id)
            .all(&self.conn)
            .await?;
        order_from_entity(order, items).map(Some)
    }

    async fn find_by_user(
        &self,
        user_id: i64,
        limit: u64,
        offset: u64,
    ) -> StoreResult<(Vec<Order>, u64)> {
        let finder = Orders::find()
            .filter(OrderCol::UserId.eq(user_id))
            .order_by_desc(OrderCol::CreatedAt)
            .order_by_desc(OrderCol::Id);

        let total = finder.clone().count(&self.conn).await?;
        let orders = finder.limit(limit).offset(offset).all(&self.conn).await?;

        let mut lines = self
            .lines_for(orders.iter().map(|order| order.id).collect())
            .await?;
        let orders = orders
            .into_iter()
            .map(|order| {
                let items = lines.remove(&order.id).unwrap_or_default();
                order_from_entity(order, items)
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok((orders, total))
    }

    async fn update_status(
        &self,
        id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StoreResult<Option<Order>> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let result = Orders::update_many()
            .col_expr(OrderCol::Status, Expr::value(next.as_str()))
            .col_expr(OrderCol::UpdatedAt, Expr::value(now))
            .filter(OrderCol::Id.eq(id))
            .filter(OrderCol::Status.eq(expected.as_str()))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.conn.ping().await
    }
}

struct SeaOrmTransaction {
    txn: DatabaseTransaction,
}

#[async_trait]
impl OrderTransaction for SeaOrmTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = OrderActive {
            id: NotSet,
            user_id: Set(order.user_id),
            total_amount: Set(order.total_amount),
            status: Set(order.status.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.txn)
        .await?;

        let mut items = Vec::with_capacity(order.items.len());
        for line in order.items {
            let item = OrderItemActive {
                id: NotSet,
                order_id: Set(model.id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price: Set(line.price),
                subtotal: Set(line.subtotal),
                created_at: Set(now),
            }
            .insert(&self.txn)
            .await?;
            items.push(item);
        }

        order_from_entity(model, items)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.txn.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.txn.rollback().await
    }
}

fn order_from_entity(model: OrderModel, items: Vec<OrderItemModel>) -> StoreResult<Order> {
    let status = model.status.parse::<OrderStatus>().map_err(|err| {
        DbErr::Type(format!("order {}: {err}", model.id))
    })?;

    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        total_amount: model.total_amount,
        status,
        items: items.into_iter().map(order_line_from_entity).collect(),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_line_from_entity(model: OrderItemModel) -> OrderLine {
    OrderLine {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
        subtotal: model.subtotal,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
