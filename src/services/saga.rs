//! Stock compensation for the order saga.
//!
//! Every decrement the saga gets applied is written to a [`StockLedger`].
//! When a later step fails, the ledger is replayed backwards as restores.

use tracing::{debug, error, warn};

use crate::{clients::InventoryClient, models::OrderLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockEntry {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CompensationReport {
    pub restored: usize,
    pub failed: Vec<StockEntry>,
}

impl CompensationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Decrements applied so far by one saga invocation.
#[derive(Debug, Default)]
pub struct StockLedger {
    entries: Vec<StockEntry>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, product_id: i64, quantity: i32) {
        self.entries.push(StockEntry {
            product_id,
            quantity,
        });
    }

    /// Restores every recorded decrement, newest first.
    ///
    /// A restore that fails is logged at error level and reported; the
    /// remaining entries are still attempted.
    pub async fn compensate(
        self,
        inventory: &dyn InventoryClient,
        order_id: Option<i64>,
    ) -> CompensationReport {
        let mut report = CompensationReport::default();

        for entry in self.entries.into_iter().rev() {
            match inventory
                .adjust_stock(entry.product_id, entry.quantity)
                .await
            {
                Ok(adjustment) if adjustment.success => {
                    debug!(
                        product_id = entry.product_id,
                        quantity = entry.quantity,
                        new_stock = adjustment.new_stock,
                        "stock restored"
                    );
                    report.restored += 1;
                }
                Ok(_) => {
                    error!(
                        ?order_id,
                        product_id = entry.product_id,
                        quantity = entry.quantity,
                        "stock compensation refused by inventory"
                    );
                    report.failed.push(entry);
                }
                Err(err) => {
                    error!(
                        ?order_id,
                        product_id = entry.product_id,
                        quantity = entry.quantity,
                        error = %err,
                        "stock compensation failed"
                    );
                    report.failed.push(entry);
                }
            }
        }

        report
    }
}

/// Gives back the stock held by a cancelled order's lines.
///
/// Each line is restored independently; failures are warnings and never stop
/// the remaining lines. Returns how many lines were restored.
pub async fn restore_lines(
    inventory: &dyn InventoryClient,
    order_id: i64,
    lines: &[OrderLine],
) -> usize {
    let mut restored = 0;
    for line in lines {
        match inventory.adjust_stock(line.product_id, line.quantity).await {
            Ok(adjustment) if adjustment.success => restored += 1,
            Ok(_) => warn!(
                order_id,
                product_id = line.product_id,
                quantity = line.quantity,
                "stock restore refused"
            ),
            Err(err) => warn!(
                order_id,
                product_id = line.product_id,
                quantity = line.quantity,
                error = %err,
                "stock restore failed"
            ),
        }
    }
    restored
}
