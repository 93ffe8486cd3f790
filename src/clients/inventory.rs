//! Inventory authority adapter.
//!
//! The inventory service owns product prices and stock levels. This service
//! never caches either: each checkout reads them fresh and each stock change
//! is a signed delta the authority applies or rejects.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClientError, ClientResult, decode_json, http_client, trim_base_url};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCheck {
    pub available: bool,
    pub current_stock: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub success: bool,
    pub new_stock: i64,
}

#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn fetch_product(&self, product_id: i64) -> ClientResult<Product>;

    async fn check_stock(&self, product_id: i64, quantity: i32) -> ClientResult<StockCheck>;

    /// Applies `delta` to the product's stock. Negative deltas decrement and
    /// are refused (`success == false`) when stock would go below zero.
    async fn adjust_stock(&self, product_id: i64, delta: i32) -> ClientResult<StockAdjustment>;
}

/// JSON-over-HTTP client for the product service.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct AdjustStockBody {
    quantity: i32,
}

impl HttpInventoryClient {
    pub fn new(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> ClientResult<Self> {
        Ok(Self {
            client: http_client(connect_timeout, request_timeout)?,
            base_url: trim_base_url(base_url),
        })
    }

    fn product_url(&self, product_id: i64) -> String {
        format!("{}/api/v1/products/{}", self.base_url, product_id)
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn fetch_product(&self, product_id: i64) -> ClientResult<Product> {
        let url = self.product_url(product_id);
        debug!(%url, "fetching product");
        let response = self.client.get(&url).send().await?;
        decode_json(response).await
    }

    async fn check_stock(&self, product_id: i64, quantity: i32) -> ClientResult<StockCheck> {
        let url = format!("{}/stock", self.product_url(product_id));
        debug!(%url, quantity, "checking stock");
        let response = self
            .client
            .get(&url)
            .query(&[("quantity", quantity)])
            .send()
            .await?;
        decode_json(response).await
    }

    async fn adjust_stock(&self, product_id: i64, delta: i32) -> ClientResult<StockAdjustment> {
        let url = format!("{}/stock", self.product_url(product_id));
        debug!(%url, delta, "adjusting stock");
        let response = self
            .client
            .patch(&url)
            .json(&AdjustStockBody { quantity: delta })
            .send()
            .await?;
        decode_json(response).await
    }
}

/// One `adjust_stock` call observed by [`InMemoryInventory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustmentCall {
    pub product_id: i64,
    pub delta: i32,
    pub applied: bool,
}

#[derive(Debug, Default)]
struct InventoryState {
    products: HashMap<i64, Product>,
    unreachable: HashSet<i64>,
    failing_adjustments: HashSet<i64>,
    adjustments: Vec<AdjustmentCall>,
}

/// In-memory stock authority for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<Mutex<InventoryState>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InventoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_product(self, id: i64, name: &str, price: Decimal, stock: i64) -> Self {
        self.lock().products.insert(
            id,
            Product {
                id,
                name: name.to_string(),
                price,
                stock,
            },
        );
        self
    }

    pub fn set_price(&self, id: i64, price: Decimal) {
        if let Some(product) = self.lock().products.get_mut(&id) {
            product.price = price;
        }
    }

    pub fn stock_of(&self, id: i64) -> Option<i64> {
        self.lock().products.get(&id).map(|product| product.stock)
    }

    /// Every call touching `id` fails as if the service were down.
    pub fn set_unreachable(&self, id: i64, unreachable: bool) {
        let mut state = self.lock();
        if unreachable {
            state.unreachable.insert(id);
        } else {
            state.unreachable.remove(&id);
        }
    }

    /// Only `adjust_stock` for `id` fails as if the service were down.
    pub fn set_adjustments_failing(&self, id: i64, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing_adjustments.insert(id);
        } else {
            state.failing_adjustments.remove(&id);
        }
    }

    pub fn adjustments(&self) -> Vec<AdjustmentCall> {
        self.lock().adjustments.clone()
    }

    pub fn decrements(&self) -> Vec<AdjustmentCall> {
        self.adjustments()
            .into_iter()
            .filter(|call| call.delta < 0)
            .collect()
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventory {
    async fn fetch_product(&self, product_id: i64) -> ClientResult<Product> {
        let state = self.lock();
        if state.unreachable.contains(&product_id) {
            return Err(ClientError::Unavailable("connection refused".into()));
        }
        state
            .products
            .get(&product_id)
            .cloned()
            .ok_or(ClientError::NotFound)
    }

    async fn check_stock(&self, product_id: i64, quantity: i32) -> ClientResult<StockCheck> {
        let state = self.lock();
        if state.unreachable.contains(&product_id) {
            return Err(ClientError::Unavailable("connection refused".into()));
        }
        let current_stock = state
            .products
            .get(&product_id)
            .map(|product| product.stock)
            .unwrap_or(0);
        Ok(StockCheck {
            available: current_stock >= i64::from(quantity),
            current_stock,
        })
    }

    async fn adjust_stock(&self, product_id: i64, delta: i32) -> ClientResult<StockAdjustment> {
        let mut state = self.lock();
        if state.unreachable.contains(&product_id)
            || state.failing_adjustments.contains(&product_id)
        {
            state.adjustments.push(AdjustmentCall {
                product_id,
                delta,
                applied: false,
            });
            return Err(ClientError::Unavailable("connection reset".into()));
        }

        let outcome = match state.products.get_mut(&product_id) {
            None => Err(ClientError::NotFound),
            Some(product) => {
                let new_stock = product.stock + i64::from(delta);
                if new_stock < 0 {
                    Ok(StockAdjustment {
                        success: false,
                        new_stock: product.stock,
                    })
                } else {
                    product.stock = new_stock;
                    Ok(StockAdjustment {
                        success: true,
                        new_stock,
                    })
                }
            }
        };

        let applied = matches!(outcome, Ok(StockAdjustment { success: true, .. }));
        state.adjustments.push(AdjustmentCall {
            product_id,
            delta,
            applied,
        });
        outcome
    }
}
