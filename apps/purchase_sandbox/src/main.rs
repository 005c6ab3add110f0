use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use platform_bridge::{SandboxPurchaseApi, ScriptTarget, WindowHost};
use purchase_core::{config, InMemoryUserDirectory, PurchaseCoordinator};
use shared::domain::{Product, TransactionState, UserGuid, UserRecord};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs one purchase against the sandbox store and a real verification endpoint.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file; `purchase.toml` in the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `verify_url` from settings.
    #[arg(long)]
    verify_url: Option<String>,
    #[arg(long, default_value = "sandbox-user-guid")]
    user_guid: String,
    #[arg(long, default_value = "sandbox@example.com")]
    user_id: String,
    /// Settle the purchase as `failed` instead of `purchased`.
    #[arg(long)]
    fail: bool,
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

struct LoggingWindow;

#[async_trait]
impl ScriptTarget for LoggingWindow {
    fn is_main_window(&self) -> bool {
        true
    }

    async fn execute_javascript(&self, script: &str) -> Result<()> {
        info!(script, "main window script");
        Ok(())
    }
}

struct SingleWindow(Arc<LoggingWindow>);

impl WindowHost for SingleWindow {
    fn all_windows(&self) -> Vec<Arc<dyn ScriptTarget>> {
        vec![self.0.clone() as Arc<dyn ScriptTarget>]
    }
}

fn sandbox_catalog(settings: &config::PurchaseSettings) -> Vec<Product> {
    settings
        .product_ids
        .iter()
        .map(|id| Product {
            product_identifier: id.clone(),
            localized_title: format!("Sandbox {id}"),
            formatted_price: "$0.00".to_string(),
            localized_description: None,
            price: Some(0.0),
            currency_code: Some("USD".to_string()),
            extra: Default::default(),
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let app_version = env!("CARGO_PKG_VERSION");
    let mut settings = match &args.config {
        Some(path) => config::load_settings_from(path, app_version),
        None => config::load_settings(app_version),
    };
    if let Some(verify_url) = &args.verify_url {
        settings.verify_url = config::validate_verify_url(verify_url)?.to_string();
    }

    let receipt_path = std::env::temp_dir().join("purchase_sandbox_receipt");
    tokio::fs::write(&receipt_path, b"sandbox-receipt")
        .await
        .with_context(|| format!("failed to write {}", receipt_path.display()))?;

    let settle_state = if args.fail {
        TransactionState::Failed
    } else {
        TransactionState::Purchased
    };
    let store = Arc::new(
        SandboxPurchaseApi::new(
            sandbox_catalog(&settings),
            receipt_path.to_string_lossy().to_string(),
        )
        .with_settle_state(settle_state),
    );
    let user_guid = UserGuid::new(args.user_guid);
    let users = InMemoryUserDirectory::new(vec![UserRecord {
        user_guid: user_guid.clone(),
        user_id: args.user_id,
    }]);

    let coordinator = PurchaseCoordinator::new(
        settings,
        store,
        Arc::new(SingleWindow(Arc::new(LoggingWindow))),
        Arc::new(users),
    );
    info!(
        verify_url = %coordinator.settings().verify_url,
        "purchase coordinator ready"
    );
    let mut reports = coordinator.subscribe_reports();
    let worker = coordinator.spawn_transaction_worker();

    let products = coordinator.query_products().await?;
    let product = products.first().context("sandbox catalog is empty")?;
    coordinator.purchase_product(&user_guid, product).await?;

    // One batch for `purchasing`, one for the settled state.
    for _ in 0..2 {
        let report = tokio::time::timeout(
            Duration::from_secs(args.timeout_secs),
            reports.recv(),
        )
        .await
        .context("timed out waiting for transaction updates")??;
        for outcome in &report.outcomes {
            match &outcome.result {
                Ok(disposition) => {
                    info!(state = ?outcome.state, ?disposition, "transaction handled")
                }
                Err(err) => {
                    tracing::error!(state = ?outcome.state, "transaction failed: {err}")
                }
            }
        }
    }

    worker.abort();
    let _ = tokio::fs::remove_file(&receipt_path).await;
    Ok(())
}
