use serde::{Deserialize, Serialize};

use crate::domain::{ProductId, TransactionState, UserGuid};

/// Raw `transactions-updated` payload as emitted by the store. Kept untyped
/// so a payload that is not a list can be told apart from an empty one.
pub type RawTransactionBatch = serde_json::Value;

/// Request body accepted by the receipt verification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPayload {
    pub receipt: String,
    pub user_guid: UserGuid,
    pub user_id: String,
    pub client_type: String,
    pub api_version: String,
    pub transaction_id: String,
}

/// Argument of `window.onTransactionsUpdated` in the main window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsUpdatedParams {
    pub state: TransactionState,
    pub product_identifier: ProductId,
    pub user_guid: Option<UserGuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TransactionsUpdatedParams {
    pub fn new(state: TransactionState, product_identifier: ProductId) -> Self {
        Self {
            state,
            product_identifier,
            user_guid: None,
            message: None,
        }
    }

    pub fn with_user(mut self, user_guid: Option<UserGuid>) -> Self {
        self.user_guid = user_guid;
        self
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }
}
