use std::sync::Arc;

use platform_bridge::{NativePurchaseApi, WindowHost};
use shared::{
    domain::{Product, ProductId, Transaction, TransactionState, UserGuid},
    error::PurchaseError,
    protocol::{RawTransactionBatch, TransactionsUpdatedParams},
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub mod config;
pub mod notify;
pub mod user_context;
pub mod verify;
pub mod worker;

pub use config::PurchaseSettings;
pub use user_context::{InMemoryUserDirectory, UserContext, UserDirectory};
pub use verify::ReceiptVerifier;
pub use worker::{BatchReport, Disposition, TransactionOutcome};

const PURCHASE_QUANTITY: u32 = 1;

/// Bridges the host store, the main window and the verification server.
pub struct PurchaseCoordinator {
    settings: PurchaseSettings,
    store: Arc<dyn NativePurchaseApi>,
    windows: Arc<dyn WindowHost>,
    users: Arc<dyn UserDirectory>,
    user_context: UserContext,
    verifier: ReceiptVerifier,
    reports: broadcast::Sender<BatchReport>,
}

impl PurchaseCoordinator {
    pub fn new(
        settings: PurchaseSettings,
        store: Arc<dyn NativePurchaseApi>,
        windows: Arc<dyn WindowHost>,
        users: Arc<dyn UserDirectory>,
    ) -> Arc<Self> {
        let verifier = ReceiptVerifier::new(&settings);
        Self::new_with_verifier(settings, store, windows, users, verifier)
    }

    pub fn new_with_verifier(
        settings: PurchaseSettings,
        store: Arc<dyn NativePurchaseApi>,
        windows: Arc<dyn WindowHost>,
        users: Arc<dyn UserDirectory>,
        verifier: ReceiptVerifier,
    ) -> Arc<Self> {
        let (reports, _) = broadcast::channel(64);
        Arc::new(Self {
            settings,
            store,
            windows,
            users,
            user_context: UserContext::default(),
            verifier,
            reports,
        })
    }

    pub fn settings(&self) -> &PurchaseSettings {
        &self.settings
    }

    pub fn user_context(&self) -> &UserContext {
        &self.user_context
    }

    /// One report per batch handled by the transaction worker.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<BatchReport> {
        self.reports.subscribe()
    }

    async fn ensure_payments_allowed(&self) -> Result<(), PurchaseError> {
        let allowed = self
            .store
            .can_make_payments()
            .await
            .map_err(|err| PurchaseError::internal(format!("{err:#}")))?;
        if !allowed {
            return Err(PurchaseError::payments_not_allowed());
        }
        Ok(())
    }

    pub async fn query_products(&self) -> Result<Vec<Product>, PurchaseError> {
        self.ensure_payments_allowed().await?;

        let raw = self
            .store
            .get_products(&self.settings.product_ids)
            .await
            .map_err(|err| PurchaseError::internal(format!("{err:#}")))?;

        let products: Vec<Product> = match raw {
            serde_json::Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<Product>(item) {
                    Ok(product) => Some(product),
                    Err(err) => {
                        warn!("skipping undecodable product descriptor: {err}");
                        None
                    }
                })
                .collect(),
            other => {
                warn!("store returned a non-list product result: {other}");
                Vec::new()
            }
        };
        if products.is_empty() {
            return Err(PurchaseError::empty_catalog());
        }

        for product in &products {
            info!(
                product = %product.product_identifier,
                "The price of {} is {}.",
                product.localized_title,
                product.formatted_price
            );
        }
        Ok(products)
    }

    /// Queues a purchase of `product` for `user_guid`. The user becomes the
    /// current purchaser before permissions are checked, so a refused call
    /// still changes who later restorations are attributed to.
    pub async fn purchase_product(
        &self,
        user_guid: &UserGuid,
        product: &Product,
    ) -> Result<bool, PurchaseError> {
        self.user_context.set_current(user_guid.clone()).await;
        self.ensure_payments_allowed().await?;

        let product_id = &product.product_identifier;
        // Recorded before submission: the store may report the transaction
        // before `purchase_product` returns.
        self.user_context
            .record_initiator(product_id.clone(), user_guid.clone())
            .await;

        let accepted = match self
            .store
            .purchase_product(product_id, PURCHASE_QUANTITY)
            .await
        {
            Ok(accepted) => accepted,
            Err(err) => {
                self.user_context.clear_initiator(product_id).await;
                return Err(PurchaseError::internal(format!("{err:#}")));
            }
        };
        if !accepted {
            self.user_context.clear_initiator(product_id).await;
            return Err(PurchaseError::invalid_product());
        }

        info!(product = %product_id, user = %user_guid, "The payment has been added to the payment queue.");
        Ok(true)
    }

    /// Downloads the receipt, posts it for verification and returns the guid
    /// of the account it was verified for.
    pub async fn verify_purchase(
        &self,
        transaction: &Transaction,
        receipt_url: &str,
    ) -> Result<UserGuid, PurchaseError> {
        let receipt = self.verifier.download_receipt(receipt_url).await?;

        let user = self
            .user_context
            .resolve(transaction.product_identifier(), self.users.as_ref())
            .await
            .ok_or_else(PurchaseError::user_unavailable)?;

        let payload = self.verifier.build_payload(&receipt, &user, transaction);
        self.verifier.submit(&payload).await?;
        Ok(user.user_guid)
    }

    pub async fn send_transactions_events(
        &self,
        state: TransactionState,
        product_identifier: ProductId,
        user_guid: Option<UserGuid>,
        message: Option<String>,
    ) -> Result<(), PurchaseError> {
        let params = TransactionsUpdatedParams::new(state, product_identifier)
            .with_user(user_guid)
            .with_message(message);
        notify::notify_main_window(self.windows.as_ref(), &params).await?;
        Ok(())
    }

    /// Handles one `transactions-updated` payload. A payload that is not a
    /// list is ignored; otherwise every record is processed in order and a
    /// failure is confined to its own record.
    pub async fn handle_transactions_updated(&self, batch: RawTransactionBatch) -> BatchReport {
        let serde_json::Value::Array(records) = batch else {
            return BatchReport::ignored();
        };

        let mut report = BatchReport::default();
        for record in records {
            let outcome = match serde_json::from_value::<Transaction>(record) {
                Ok(transaction) => {
                    let result = self.process_transaction(&transaction).await;
                    if let Err(err) = &result {
                        error!(
                            transaction = %transaction.transaction_identifier,
                            product = %transaction.product_identifier(),
                            state = %transaction.transaction_state,
                            "transaction handling failed: {err}"
                        );
                    }
                    TransactionOutcome::processed(&transaction, result)
                }
                Err(err) => {
                    warn!("skipping malformed transaction record: {err}");
                    TransactionOutcome::malformed(err)
                }
            };
            report.outcomes.push(outcome);
        }
        report
    }

    async fn process_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Disposition, PurchaseError> {
        let product_id = transaction.product_identifier().clone();
        let state = transaction.transaction_state;

        match state {
            TransactionState::Purchasing => {
                info!("Purchasing {product_id}...");
                self.send_transactions_events(state, product_id, None, None)
                    .await?;
                Ok(Disposition::Notified)
            }
            TransactionState::Purchased => {
                info!("{product_id} purchased.");
                let user_guid = self.verify_from_store_receipt(transaction).await?;
                self.send_transactions_events(state, product_id.clone(), Some(user_guid), None)
                    .await?;
                let disposition = self.finish_transaction(transaction).await?;
                self.user_context.clear_initiator(&product_id).await;
                Ok(disposition)
            }
            TransactionState::Failed => {
                info!("Failed to purchase {product_id}.");
                self.send_transactions_events(
                    state,
                    product_id.clone(),
                    None,
                    transaction.error_message.clone(),
                )
                .await?;
                let disposition = self.finish_transaction(transaction).await?;
                self.user_context.clear_initiator(&product_id).await;
                Ok(disposition)
            }
            TransactionState::Restored => {
                info!("The purchase of {product_id} has been restored.");
                let user_guid = self.verify_from_store_receipt(transaction).await?;
                self.send_transactions_events(state, product_id, Some(user_guid), None)
                    .await?;
                // Left in the queue so the purchase can be restored again.
                Ok(Disposition::Verified)
            }
            TransactionState::Deferred => {
                info!("The purchase of {product_id} has been deferred.");
                self.send_transactions_events(state, product_id, None, None)
                    .await?;
                Ok(Disposition::Notified)
            }
            TransactionState::Unknown => Ok(Disposition::Ignored),
        }
    }

    async fn verify_from_store_receipt(
        &self,
        transaction: &Transaction,
    ) -> Result<UserGuid, PurchaseError> {
        let receipt_url = self
            .store
            .receipt_url()
            .await
            .map_err(|err| PurchaseError::receipt_download(format!("{err:#}")))?;
        self.verify_purchase(transaction, &receipt_url).await
    }

    async fn finish_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Disposition, PurchaseError> {
        let Some(date) = transaction.transaction_date.as_deref() else {
            warn!(
                transaction = %transaction.transaction_identifier,
                "transaction has no date; cannot finish it"
            );
            return Ok(Disposition::FinishSkipped);
        };
        self.store
            .finish_transaction_by_date(date)
            .await
            .map_err(|err| PurchaseError::internal(format!("{err:#}")))?;
        Ok(Disposition::Finished)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
