use std::{collections::HashMap, fs, path::Path};

use anyhow::{bail, Context};
use shared::domain::{ProductId, DEFAULT_PRODUCT_IDS};
use tracing::warn;
use url::Url;

pub const DEFAULT_VERIFY_URL: &str = "https://as.wiz.cn/as/a/pay2/ios";
pub const DEFAULT_CLIENT_TYPE: &str = "lite";
pub const DEFAULT_SETTINGS_FILE: &str = "purchase.toml";
/// Placeholder sent as `apiVersion` until the host supplies its own version.
pub const DEFAULT_APP_VERSION: &str = "0.0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseSettings {
    pub verify_url: String,
    pub client_type: String,
    pub app_version: String,
    pub product_ids: Vec<ProductId>,
    pub queue_depth: usize,
}

impl Default for PurchaseSettings {
    fn default() -> Self {
        Self {
            verify_url: DEFAULT_VERIFY_URL.into(),
            client_type: DEFAULT_CLIENT_TYPE.into(),
            app_version: DEFAULT_APP_VERSION.into(),
            product_ids: DEFAULT_PRODUCT_IDS
                .iter()
                .map(|id| ProductId::new(*id))
                .collect(),
            queue_depth: 64,
        }
    }
}

impl PurchaseSettings {
    /// Defaults for the host application released as `app_version`.
    pub fn for_app(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
            ..Self::default()
        }
    }
}

/// Loads `purchase.toml` from the working directory. `app_version` is the
/// host application's version; the file and env may still override it.
pub fn load_settings(app_version: &str) -> PurchaseSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), app_version)
}

pub fn load_settings_from(path: &Path, app_version: &str) -> PurchaseSettings {
    let mut settings = PurchaseSettings::for_app(app_version);

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

pub(crate) fn apply_file_overrides(settings: &mut PurchaseSettings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!("ignoring malformed purchase settings file: {err}");
            return;
        }
    };

    if let Some(v) = file_cfg.get("verify_url") {
        set_verify_url(settings, v);
    }
    if let Some(v) = file_cfg.get("client_type") {
        settings.client_type = v.clone();
    }
    if let Some(v) = file_cfg.get("app_version") {
        settings.app_version = v.clone();
    }
    if let Some(v) = file_cfg.get("product_ids") {
        set_product_ids(settings, v);
    }
    if let Some(v) = file_cfg.get("queue_depth") {
        set_queue_depth(settings, v);
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut PurchaseSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    for key in ["PURCHASE_VERIFY_URL", "APP__VERIFY_URL"] {
        if let Some(v) = lookup(key) {
            set_verify_url(settings, &v);
        }
    }
    if let Some(v) = lookup("APP__CLIENT_TYPE") {
        settings.client_type = v;
    }
    if let Some(v) = lookup("APP__APP_VERSION") {
        settings.app_version = v;
    }
    if let Some(v) = lookup("APP__PRODUCT_IDS") {
        set_product_ids(settings, &v);
    }
    if let Some(v) = lookup("APP__QUEUE_DEPTH") {
        set_queue_depth(settings, &v);
    }
}

fn set_verify_url(settings: &mut PurchaseSettings, raw: &str) {
    match validate_verify_url(raw) {
        Ok(url) => settings.verify_url = url.to_string(),
        Err(err) => warn!("keeping verify_url {}: {err:#}", settings.verify_url),
    }
}

fn set_product_ids(settings: &mut PurchaseSettings, raw: &str) {
    let ids = parse_product_ids(raw);
    if ids.is_empty() {
        warn!("ignoring empty product_ids override");
        return;
    }
    settings.product_ids = ids;
}

fn set_queue_depth(settings: &mut PurchaseSettings, raw: &str) {
    match raw.trim().parse::<usize>() {
        Ok(depth) if depth > 0 => settings.queue_depth = depth,
        _ => warn!("ignoring invalid queue_depth '{raw}'"),
    }
}

pub fn validate_verify_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim())
        .with_context(|| format!("invalid verification endpoint '{raw}'"))?;
    if !matches!(url.scheme(), "https" | "http") {
        bail!(
            "verification endpoint must be http(s), got scheme '{}'",
            url.scheme()
        );
    }
    Ok(url)
}

pub(crate) fn parse_product_ids(raw: &str) -> Vec<ProductId> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ProductId::new)
        .collect()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
