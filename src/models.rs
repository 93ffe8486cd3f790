use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::status::OrderStatus;

/// Decimal places kept for money; matches the `NUMERIC(12,2)` columns.
pub const MONEY_SCALE: u32 = 2;

/// Rounds half away from zero, the way Postgres rounds into `NUMERIC`.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub items: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn can_be_cancelled(&self) -> bool {
        self.status.can_be_cancelled()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A line priced during checkout, not yet written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderLine {
    pub product_id: i64,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

impl NewOrderLine {
    /// Freezes `price` at cents and derives the subtotal from the rounded
    /// price, so stored lines always add up to the stored total.
    pub fn priced(product_id: i64, quantity: i32, price: Decimal) -> Self {
        let price = round_money(price);
        Self {
            product_id,
            quantity,
            price,
            subtotal: price * Decimal::from(quantity),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: i64,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub items: Vec<NewOrderLine>,
}

impl NewOrder {
    pub fn pending(user_id: i64, items: Vec<NewOrderLine>) -> Self {
        let total_amount = items.iter().map(|line| line.subtotal).sum();
        Self {
            user_id,
            total_amount,
            status: OrderStatus::Pending,
            items,
        }
    }
}
