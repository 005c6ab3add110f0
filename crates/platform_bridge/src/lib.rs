use std::sync::Arc;

use async_trait::async_trait;
use shared::{domain::ProductId, protocol::RawTransactionBatch};
use tokio::sync::mpsc;

pub mod sandbox;

pub use sandbox::SandboxPurchaseApi;

/// Host store (payment queue, catalog, receipts). Results that the platform
/// hands back loosely typed stay as JSON so callers can validate their shape.
#[async_trait]
pub trait NativePurchaseApi: Send + Sync {
    async fn can_make_payments(&self) -> anyhow::Result<bool>;
    async fn get_products(&self, product_ids: &[ProductId]) -> anyhow::Result<serde_json::Value>;
    /// Returns `false` when the store refuses the product outright.
    async fn purchase_product(&self, product_id: &ProductId, quantity: u32) -> anyhow::Result<bool>;
    async fn receipt_url(&self) -> anyhow::Result<String>;
    async fn finish_transaction_by_date(&self, date: &str) -> anyhow::Result<()>;
    /// Every `transactions-updated` batch is pushed into `listener`.
    fn on_transactions_updated(&self, listener: mpsc::Sender<RawTransactionBatch>);
}

#[async_trait]
pub trait ScriptTarget: Send + Sync {
    fn is_main_window(&self) -> bool;
    async fn execute_javascript(&self, script: &str) -> anyhow::Result<()>;
}

pub trait WindowHost: Send + Sync {
    fn all_windows(&self) -> Vec<Arc<dyn ScriptTarget>>;

    fn main_window(&self) -> Option<Arc<dyn ScriptTarget>> {
        self.all_windows()
            .into_iter()
            .find(|window| window.is_main_window())
    }
}

pub struct NoWindows;

impl WindowHost for NoWindows {
    fn all_windows(&self) -> Vec<Arc<dyn ScriptTarget>> {
        Vec::new()
    }
}

pub struct MissingPurchaseApi;

#[async_trait]
impl NativePurchaseApi for MissingPurchaseApi {
    async fn can_make_payments(&self) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn get_products(&self, _product_ids: &[ProductId]) -> anyhow::Result<serde_json::Value> {
        Err(anyhow::anyhow!("in-app purchase backend unavailable"))
    }

    async fn purchase_product(
        &self,
        _product_id: &ProductId,
        _quantity: u32,
    ) -> anyhow::Result<bool> {
        Err(anyhow::anyhow!("in-app purchase backend unavailable"))
    }

    async fn receipt_url(&self) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("in-app purchase backend unavailable"))
    }

    async fn finish_transaction_by_date(&self, _date: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("in-app purchase backend unavailable"))
    }

    fn on_transactions_updated(&self, _listener: mpsc::Sender<RawTransactionBatch>) {}
}

#[cfg(test)]
#[path = "tests/sandbox_tests.rs"]
mod tests;
