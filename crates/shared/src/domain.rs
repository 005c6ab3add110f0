use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(ProductId);
id_newtype!(UserGuid);

/// Product catalog queried when the purchase page opens.
pub const DEFAULT_PRODUCT_IDS: &[&str] = &["cn.wiz.note.lite.year"];

/// Product descriptor as reported by the native store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_identifier: ProductId,
    pub localized_title: String,
    pub formatted_price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    /// Native fields not modelled above (subscription period, discounts, ...),
    /// passed through to the UI untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum TransactionState {
    Purchasing,
    Purchased,
    Failed,
    Restored,
    Deferred,
    Unknown,
}

impl From<String> for TransactionState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "purchasing" => Self::Purchasing,
            "purchased" => Self::Purchased,
            "failed" => Self::Failed,
            "restored" => Self::Restored,
            "deferred" => Self::Deferred,
            _ => Self::Unknown,
        }
    }
}

impl TransactionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchasing => "purchasing",
            Self::Purchased => "purchased",
            Self::Failed => "failed",
            Self::Restored => "restored",
            Self::Deferred => "deferred",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub product_identifier: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// A native transaction record. Only the store creates or mutates these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub transaction_identifier: String,
    pub transaction_state: TransactionState,
    pub payment: Payment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_identifier: Option<String>,
}

impl Transaction {
    pub fn product_identifier(&self) -> &ProductId {
        &self.payment.product_identifier
    }
}

/// Signed-in account as held by the host's user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_guid: UserGuid,
    pub user_id: String,
}
