use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use shared::{
    domain::{Transaction, UserRecord},
    error::PurchaseError,
    protocol::VerificationPayload,
};
use tracing::debug;
use url::Url;

use crate::config::PurchaseSettings;

/// Receipt download plus the server-side verification round trip.
#[derive(Debug, Clone)]
pub struct ReceiptVerifier {
    http: Client,
    verify_url: String,
    client_type: String,
    app_version: String,
}

impl ReceiptVerifier {
    pub fn new(settings: &PurchaseSettings) -> Self {
        Self::with_client(Client::new(), settings)
    }

    pub fn with_client(http: Client, settings: &PurchaseSettings) -> Self {
        Self {
            http,
            verify_url: settings.verify_url.clone(),
            client_type: settings.client_type.clone(),
            app_version: settings.app_version.clone(),
        }
    }

    /// Reads the receipt from `location`: http(s) URLs are fetched, `file:`
    /// URLs and bare paths are read from disk.
    pub async fn download_receipt(&self, location: &str) -> Result<Vec<u8>, PurchaseError> {
        self.fetch_receipt_bytes(location)
            .await
            .map_err(|err| PurchaseError::receipt_download(format!("{err:#}")))
    }

    async fn fetch_receipt_bytes(&self, location: &str) -> anyhow::Result<Vec<u8>> {
        let path = match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let response = self.http.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    bail!("unexpected status {status}");
                }
                return Ok(response.bytes().await?.to_vec());
            }
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|()| anyhow!("receipt location '{location}' is not a local path"))?,
            Ok(url) => {
                return Err(anyhow!(
                    "unsupported receipt location scheme '{}'",
                    url.scheme()
                ))
            }
            Err(_) if !location.trim().is_empty() => PathBuf::from(location),
            Err(err) => return Err(err).context("empty receipt location"),
        };

        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read receipt at '{}'", path.display()))
    }

    pub fn build_payload(
        &self,
        receipt: &[u8],
        user: &UserRecord,
        transaction: &Transaction,
    ) -> VerificationPayload {
        VerificationPayload {
            receipt: STANDARD.encode(receipt),
            user_guid: user.user_guid.clone(),
            user_id: user.user_id.clone(),
            client_type: self.client_type.clone(),
            api_version: self.app_version.clone(),
            transaction_id: transaction.transaction_identifier.clone(),
        }
    }

    /// Any 2xx response counts as verified.
    pub async fn submit(&self, payload: &VerificationPayload) -> Result<(), PurchaseError> {
        let response = self
            .http
            .post(&self.verify_url)
            .json(payload)
            .send()
            .await
            .map_err(PurchaseError::verification)?;
        let status = response.status();
        if !status.is_success() {
            return Err(PurchaseError::verification(format!(
                "unexpected status {status}"
            )));
        }
        debug!(
            %status,
            transaction = %payload.transaction_id,
            "receipt verification accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/verify_tests.rs"]
mod tests;
