use platform_bridge::WindowHost;
use shared::{error::PurchaseError, protocol::TransactionsUpdatedParams};
use tracing::debug;

pub fn transactions_updated_script(
    params: &TransactionsUpdatedParams,
) -> Result<String, PurchaseError> {
    let params_data = serde_json::to_string(params).map_err(PurchaseError::internal)?;
    Ok(format!("window.onTransactionsUpdated({params_data})"))
}

/// Injects the update into the main window. Returns `false` when no main
/// window is open.
pub async fn notify_main_window(
    windows: &dyn WindowHost,
    params: &TransactionsUpdatedParams,
) -> Result<bool, PurchaseError> {
    let Some(main_window) = windows.main_window() else {
        debug!(
            state = %params.state,
            product = %params.product_identifier,
            "no main window; dropping transactions update"
        );
        return Ok(false);
    };

    let script = transactions_updated_script(params)?;
    main_window
        .execute_javascript(&script)
        .await
        .map_err(|err| PurchaseError::notification(format!("{err:#}")))?;
    Ok(true)
}
