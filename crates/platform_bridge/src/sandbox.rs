//! In-memory store used by the developer harness and tests. Purchases settle
//! immediately: every accepted submission emits a `purchasing` batch followed
//! by a batch in the configured settle state.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use shared::{
    domain::{Product, ProductId, TransactionState},
    protocol::RawTransactionBatch,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::NativePurchaseApi;

pub struct SandboxPurchaseApi {
    inner: Mutex<SandboxState>,
}

struct SandboxState {
    payments_allowed: bool,
    catalog: Vec<Product>,
    receipt_url: String,
    settle_state: TransactionState,
    listener: Option<mpsc::Sender<RawTransactionBatch>>,
    product_fetches: usize,
    submitted: Vec<(ProductId, u32)>,
    finished_dates: Vec<String>,
}

impl SandboxPurchaseApi {
    pub fn new(catalog: Vec<Product>, receipt_url: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(SandboxState {
                payments_allowed: true,
                catalog,
                receipt_url: receipt_url.into(),
                settle_state: TransactionState::Purchased,
                listener: None,
                product_fetches: 0,
                submitted: Vec::new(),
                finished_dates: Vec::new(),
            }),
        }
    }

    pub fn with_payments_allowed(self, allowed: bool) -> Self {
        self.state().payments_allowed = allowed;
        self
    }

    /// State of the second batch emitted for an accepted purchase.
    pub fn with_settle_state(self, state: TransactionState) -> Self {
        self.state().settle_state = state;
        self
    }

    pub fn product_fetches(&self) -> usize {
        self.state().product_fetches
    }

    pub fn submitted(&self) -> Vec<(ProductId, u32)> {
        self.state().submitted.clone()
    }

    pub fn finished_dates(&self) -> Vec<String> {
        self.state().finished_dates.clone()
    }

    /// Pushes an arbitrary batch to the registered listener.
    pub fn emit(&self, batch: RawTransactionBatch) -> bool {
        let Some(listener) = self.state().listener.clone() else {
            debug!("sandbox store: no transactions listener registered");
            return false;
        };
        match listener.try_send(batch) {
            Ok(()) => true,
            Err(err) => {
                warn!("sandbox store: dropping transactions batch: {err}");
                false
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, SandboxState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn transaction_record(
    transaction_id: &str,
    state: TransactionState,
    product_id: &ProductId,
    quantity: u32,
) -> serde_json::Value {
    let mut record = json!({
        "transactionIdentifier": transaction_id,
        "transactionState": state.as_str(),
        "payment": { "productIdentifier": product_id, "quantity": quantity },
    });
    if matches!(
        state,
        TransactionState::Purchased | TransactionState::Failed | TransactionState::Restored
    ) {
        record["transactionDate"] = json!(Utc::now().to_rfc3339());
    }
    if state == TransactionState::Failed {
        record["errorCode"] = json!(2);
        record["errorMessage"] = json!("Payment cancelled in sandbox");
    }
    record
}

#[async_trait]
impl NativePurchaseApi for SandboxPurchaseApi {
    async fn can_make_payments(&self) -> anyhow::Result<bool> {
        Ok(self.state().payments_allowed)
    }

    async fn get_products(&self, product_ids: &[ProductId]) -> anyhow::Result<serde_json::Value> {
        let mut state = self.state();
        state.product_fetches += 1;
        let products: Vec<&Product> = state
            .catalog
            .iter()
            .filter(|product| product_ids.contains(&product.product_identifier))
            .collect();
        Ok(serde_json::to_value(products)?)
    }

    async fn purchase_product(&self, product_id: &ProductId, quantity: u32) -> anyhow::Result<bool> {
        let settle_state = {
            let mut state = self.state();
            if !state
                .catalog
                .iter()
                .any(|product| &product.product_identifier == product_id)
            {
                return Ok(false);
            }
            state.submitted.push((product_id.clone(), quantity));
            state.settle_state
        };

        let transaction_id = Uuid::new_v4().to_string();
        self.emit(json!([transaction_record(
            &transaction_id,
            TransactionState::Purchasing,
            product_id,
            quantity
        )]));
        self.emit(json!([transaction_record(
            &transaction_id,
            settle_state,
            product_id,
            quantity
        )]));
        Ok(true)
    }

    async fn receipt_url(&self) -> anyhow::Result<String> {
        Ok(self.state().receipt_url.clone())
    }

    async fn finish_transaction_by_date(&self, date: &str) -> anyhow::Result<()> {
        self.state().finished_dates.push(date.to_string());
        Ok(())
    }

    fn on_transactions_updated(&self, listener: mpsc::Sender<RawTransactionBatch>) {
        self.state().listener = Some(listener);
    }
}
