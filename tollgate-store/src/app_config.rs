use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use tollgate_shared::{products, Offer};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub entitlements: EntitlementsConfig,
    pub overrides: OverridesConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EntitlementsConfig {
    /// Products whose latest transaction decides access
    #[serde(default = "products::default_product_ids")]
    pub tracked_products: BTreeSet<String>,
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for EntitlementsConfig {
    fn default() -> Self {
        Self {
            tracked_products: products::default_product_ids(),
            command_buffer: default_command_buffer(),
        }
    }
}

fn default_command_buffer() -> usize { 64 }

#[derive(Debug, Deserialize, Clone)]
pub struct OverridesConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "products::default_product_ids")]
    pub product_ids: BTreeSet<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            product_ids: products::default_product_ids(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SandboxConfig {
    #[serde(default)]
    pub offers: Vec<Offer>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `TOLLGATE_SERVER__PORT=9000`
            .add_source(config::Environment::with_prefix("TOLLGATE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080

                [overrides]
                path = "data/overrides.json"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: Config = s.try_deserialize().unwrap();

        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.entitlements.command_buffer, 64);
        assert!(cfg.entitlements.tracked_products.contains(products::WEEKLY_SUBSCRIPTION));
        assert!(cfg.catalog.product_ids.contains(products::YEARLY_SUBSCRIPTION));
        assert!(cfg.sandbox.offers.is_empty());
    }

    #[test]
    fn test_sandbox_offers_from_toml() {
        let s = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 8080

                [overrides]
                path = "data/overrides.json"

                [[sandbox.offers]]
                id = "weeklyvibrovibe"
                price = "4.99"
                display_price = "$4.99"
                period = "WEEK"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: Config = s.try_deserialize().unwrap();

        assert_eq!(cfg.sandbox.offers.len(), 1);
        assert_eq!(cfg.sandbox.offers[0].display_price, "$4.99");
        assert!(cfg.sandbox.offers[0].introductory_offer.is_none());
    }
}
