//! Single-consumer intake for `transactions-updated` batches and the per-batch
//! report produced for each of them.

use std::sync::Arc;

use shared::{
    domain::{ProductId, Transaction, TransactionState},
    error::PurchaseError,
    protocol::RawTransactionBatch,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, info, warn};

use crate::PurchaseCoordinator;

/// What the coordinator did with one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// UI notified; nothing else to do for this state.
    Notified,
    /// Receipt verified and UI notified; the transaction stays in the queue.
    Verified,
    /// UI notified and the store told to finish the transaction.
    Finished,
    /// UI notified but the record had no date to finish it by.
    FinishSkipped,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub transaction_id: Option<String>,
    pub product_identifier: Option<ProductId>,
    pub state: Option<TransactionState>,
    pub result: Result<Disposition, PurchaseError>,
}

impl TransactionOutcome {
    pub(crate) fn processed(
        transaction: &Transaction,
        result: Result<Disposition, PurchaseError>,
    ) -> Self {
        Self {
            transaction_id: Some(transaction.transaction_identifier.clone()),
            product_identifier: Some(transaction.product_identifier().clone()),
            state: Some(transaction.transaction_state),
            result,
        }
    }

    pub(crate) fn malformed(err: serde_json::Error) -> Self {
        Self {
            transaction_id: None,
            product_identifier: None,
            state: None,
            result: Err(PurchaseError::internal(format!(
                "malformed transaction record: {err}"
            ))),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// The payload was not a list and was dropped untouched.
    pub ignored: bool,
    pub outcomes: Vec<TransactionOutcome>,
}

impl BatchReport {
    pub(crate) fn ignored() -> Self {
        Self {
            ignored: true,
            outcomes: Vec::new(),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransactionOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_ok())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn log(&self) {
        if self.ignored {
            debug!("transactions batch ignored");
            return;
        }
        let failed = self.failures().count();
        if failed == 0 {
            info!(transactions = self.outcomes.len(), "transactions batch processed");
            return;
        }
        for outcome in self.failures() {
            if let Err(err) = &outcome.result {
                warn!(
                    transaction = outcome.transaction_id.as_deref().unwrap_or("-"),
                    state = ?outcome.state,
                    code = ?err.code,
                    "transaction failed: {err}"
                );
            }
        }
        warn!(
            transactions = self.outcomes.len(),
            failed, "transactions batch processed with failures"
        );
    }
}

impl PurchaseCoordinator {
    /// Registers a bounded queue with the store and spawns the task draining
    /// it. The task holds the coordinator; abort the handle to stop it.
    pub fn spawn_transaction_worker(self: &Arc<Self>) -> JoinHandle<usize> {
        let (tx, rx) = mpsc::channel(self.settings.queue_depth);
        self.store.on_transactions_updated(tx);
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.run_transaction_worker(rx).await })
    }

    /// Processes batches one at a time, in arrival order, until every sender
    /// is dropped. Returns the number of batches handled.
    pub async fn run_transaction_worker(&self, rx: mpsc::Receiver<RawTransactionBatch>) -> usize {
        let mut batches = ReceiverStream::new(rx);
        let mut processed = 0;
        while let Some(batch) = batches.next().await {
            let report = self.handle_transactions_updated(batch).await;
            report.log();
            processed += 1;
            // No subscribers is fine.
            let _ = self.reports.send(report);
        }
        info!(processed, "transactions queue closed; worker stopping");
        processed
    }
}
