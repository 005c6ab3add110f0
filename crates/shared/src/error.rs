use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    PaymentsNotAllowed,
    EmptyCatalog,
    InvalidProduct,
    ReceiptDownload,
    Verification,
    UserUnavailable,
    Notification,
    Internal,
}

/// Serializable error shape handed to the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PurchaseError {
    pub code: ErrorCode,
    pub message: String,
}

impl PurchaseError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn payments_not_allowed() -> Self {
        Self::new(
            ErrorCode::PaymentsNotAllowed,
            "In-app purchases are not allowed on this device.",
        )
    }

    pub fn empty_catalog() -> Self {
        Self::new(
            ErrorCode::EmptyCatalog,
            "Failed to receive product information from the store.",
        )
    }

    pub fn invalid_product() -> Self {
        Self::new(ErrorCode::InvalidProduct, "The selected product is not valid.")
    }

    pub fn receipt_download(cause: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::ReceiptDownload,
            format!("Failed to download the purchase receipt: {cause}"),
        )
    }

    pub fn verification(cause: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::Verification,
            format!("Failed to verify the purchase: {cause}"),
        )
    }

    pub fn user_unavailable() -> Self {
        Self::new(
            ErrorCode::UserUnavailable,
            "No signed-in user is available for this purchase.",
        )
    }

    pub fn notification(cause: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::Notification,
            format!("Failed to notify the main window: {cause}"),
        )
    }

    pub fn internal(cause: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::Internal, format!("In-app purchase error: {cause}"))
    }
}

impl From<PurchaseError> for ApiError {
    fn from(value: PurchaseError) -> Self {
        Self {
            code: value.code,
            message: value.message,
        }
    }
}
