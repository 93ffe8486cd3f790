use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    clients::{ClientError, InventoryClient},
    dto::orders::OrderItemRequest,
    error::{AppError, AppResult},
    events::EventEmitter,
    models::{NewOrder, NewOrderLine, Order},
    routes::params::Pagination,
    services::saga::{StockLedger, restore_lines},
    status::OrderStatus,
    store::{OrderStore, OrderTransaction},
};

const USER_CANCEL_REASON: &str = "cancelled by user";
const ADMIN_CANCEL_REASON: &str = "cancelled by administrator";

/// One page of a user's orders, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// Drives order creation, status changes and cancellation against the store
/// and the inventory service.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryClient>,
    events: EventEmitter,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        inventory: Arc<dyn InventoryClient>,
        events: EventEmitter,
    ) -> Self {
        Self {
            store,
            inventory,
            events,
        }
    }

    /// Creates a pending order and takes its stock.
    ///
    /// Prices are read from inventory and frozen on the lines. The local
    /// transaction stays open while stock is decremented; if a decrement or
    /// the commit fails, every decrement already applied is restored.
    pub async fn create_order(
        &self,
        user_id: i64,
        items: Vec<OrderItemRequest>,
    ) -> AppResult<Order> {
        validate_items(&items)?;

        let mut txn = self.store.begin().await?;

        let lines = match self.price_lines(&items).await {
            Ok(lines) => lines,
            Err(err) => {
                rollback(txn).await;
                return Err(err);
            }
        };

        let order = match txn.insert_order(NewOrder::pending(user_id, lines)).await {
            Ok(order) => order,
            Err(err) => {
                rollback(txn).await;
                return Err(err.into());
            }
        };
        debug!(order_id = order.id, user_id, "order staged");

        let mut ledger = StockLedger::new();
        if let Err(err) = self.decrement_stock(&order, &mut ledger).await {
            rollback(txn).await;
            ledger.compensate(self.inventory.as_ref(), Some(order.id)).await;
            return Err(err);
        }

        if let Err(err) = txn.commit().await {
            error!(
                order_id = order.id,
                error = %err,
                "order commit failed after stock was taken"
            );
            ledger.compensate(self.inventory.as_ref(), Some(order.id)).await;
            return Err(err.into());
        }

        info!(
            order_id = order.id,
            user_id,
            total_amount = %order.total_amount,
            "order created"
        );
        self.events.order_created(&order);
        Ok(order)
    }

    async fn price_lines(&self, items: &[OrderItemRequest]) -> AppResult<Vec<NewOrderLine>> {
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = self
                .inventory
                .fetch_product(item.product_id)
                .await
                .map_err(|err| inventory_error(item.product_id, err))?;

            let stock = self
                .inventory
                .check_stock(item.product_id, item.quantity)
                .await
                .map_err(|err| inventory_error(item.product_id, err))?;
            if !stock.available {
                return Err(AppError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: stock.current_stock,
                });
            }

            debug!(
                product_id = product.id,
                quantity = item.quantity,
                price = %product.price,
                "line priced"
            );
            lines.push(NewOrderLine::priced(
                item.product_id,
                item.quantity,
                product.price,
            ));
        }
        Ok(lines)
    }

    async fn decrement_stock(&self, order: &Order, ledger: &mut StockLedger) -> AppResult<()> {
        for line in &order.items {
            let adjustment = self
                .inventory
                .adjust_stock(line.product_id, -line.quantity)
                .await
                .map_err(|err| inventory_error(line.product_id, err))?;

            if !adjustment.success {
                return Err(AppError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: adjustment.new_stock,
                });
            }
            ledger.record(line.product_id, line.quantity);
        }
        Ok(())
    }

    pub async fn get_order(&self, order_id: i64, user_id: i64) -> AppResult<Order> {
        let order = self.load(order_id).await?;
        if order.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(order)
    }

    pub async fn get_order_admin(&self, order_id: i64) -> AppResult<Order> {
        self.load(order_id).await
    }

    pub async fn get_user_orders(
        &self,
        user_id: i64,
        pagination: &Pagination,
    ) -> AppResult<OrderPage> {
        let (page, limit, offset) = pagination.normalize();
        let (store_limit, store_offset) = u64::try_from(limit)
            .ok()
            .zip(u64::try_from(offset).ok())
            .ok_or_else(|| AppError::Validation(format!("invalid page {page}")))?;

        let (orders, total) = self
            .store
            .find_by_user(user_id, store_limit, store_offset)
            .await?;

        Ok(OrderPage {
            orders,
            page,
            limit,
            total: i64::try_from(total).unwrap_or(i64::MAX),
        })
    }

    pub async fn update_order_status(&self, order_id: i64, status: &str) -> AppResult<Order> {
        let next: OrderStatus = status.trim().parse()?;
        let current = self.load(order_id).await?;
        let previous = current.status;
        previous.transition_to(next)?;

        let Some(updated) = self.store.update_status(order_id, previous, next).await? else {
            let now = self.load(order_id).await?;
            return Err(AppError::IllegalTransition {
                from: now.status,
                to: next,
            });
        };
        info!(order_id, from = %previous, to = %next, "order status updated");

        if next == OrderStatus::Cancelled {
            restore_lines(self.inventory.as_ref(), order_id, &updated.items).await;
            self.events.order_cancelled(
                order_id,
                updated.user_id,
                ADMIN_CANCEL_REASON,
                updated.updated_at,
            );
        }
        self.events
            .order_status_changed(order_id, previous, next, updated.updated_at);

        Ok(updated)
    }

    /// Cancels a pending order owned by `user_id` and gives its stock back.
    pub async fn cancel_order(
        &self,
        order_id: i64,
        user_id: i64,
        reason: Option<String>,
    ) -> AppResult<Order> {
        let order = self.load(order_id).await?;
        if order.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        if !order.can_be_cancelled() {
            return Err(not_cancellable(order.status));
        }

        let Some(cancelled) = self
            .store
            .update_status(order_id, order.status, OrderStatus::Cancelled)
            .await?
        else {
            let now = self.load(order_id).await?;
            return Err(not_cancellable(now.status));
        };

        let restored = restore_lines(self.inventory.as_ref(), order_id, &cancelled.items).await;
        if restored < cancelled.items.len() {
            warn!(
                order_id,
                restored,
                lines = cancelled.items.len(),
                "order cancelled with stock partially restored"
            );
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| USER_CANCEL_REASON.to_string());
        info!(order_id, user_id, %reason, "order cancelled");
        self.events
            .order_cancelled(order_id, user_id, &reason, cancelled.updated_at);

        Ok(cancelled)
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await?;
        Ok(())
    }

    async fn load(&self, order_id: i64) -> AppResult<Order> {
        self.store
            .find_by_id(order_id)
            .await?
            .ok_or(AppError::OrderNotFound(order_id))
    }
}

fn validate_items(items: &[OrderItemRequest]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::Validation(
            "order must have at least one item".into(),
        ));
    }
    for item in items {
        if item.product_id <= 0 {
            return Err(AppError::Validation(format!(
                "invalid product id: {}",
                item.product_id
            )));
        }
        if item.quantity <= 0 {
            return Err(AppError::Validation(format!(
                "invalid quantity for product {}",
                item.product_id
            )));
        }
    }
    Ok(())
}

fn not_cancellable(status: OrderStatus) -> AppError {
    AppError::InvalidState(format!(
        "cannot cancel order with status: {status} (only pending orders can be cancelled)"
    ))
}

async fn rollback(txn: Box<dyn OrderTransaction>) {
    if let Err(err) = txn.rollback().await {
        warn!(error = %err, "order transaction rollback failed");
    }
}

/// Maps an inventory failure for `product_id` onto the service's errors.
pub fn inventory_error(product_id: i64, err: ClientError) -> AppError {
    match err {
        ClientError::NotFound => AppError::ProductNotFound(product_id),
        ClientError::Unavailable(reason) => AppError::Unavailable {
            service: "inventory",
            reason,
        },
        ClientError::Rejected { status, message } => AppError::Upstream {
            service: "inventory",
            reason: format!("product {product_id}: {status} {message}"),
        },
        ClientError::InvalidResponse(reason) => AppError::Upstream {
            service: "inventory",
            reason,
        },
        ClientError::Configuration(reason) => AppError::Internal(anyhow::anyhow!(reason)),
    }
}
