//! Environment configuration.
//!
//! Every integration is optional: a missing key disables that integration and
//! the corresponding routes answer with a vendor error instead of crashing.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::aggregates::ShippingPolicy;

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_ORDER_PREFIX: &str = "DB";
pub const DEFAULT_VENDOR_TIMEOUT_SECS: u64 = 15;
pub const STRIPE_API_URL: &str = "https://api.stripe.com";
pub const PRINTFUL_API_URL: &str = "https://api.printful.com";
pub const RESEND_API_URL: &str = "https://api.resend.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub store: StoreSettings,
    pub stripe: Option<StripeConfig>,
    pub paypal: Option<PaypalConfig>,
    pub printful: Option<PrintfulConfig>,
    pub email: EmailConfig,
    pub vendor_timeout: Duration,
}

/// Pricing and numbering rules shared by carts and checkout.
#[derive(Clone, Debug)]
pub struct StoreSettings {
    pub order_prefix: String,
    pub currency: String,
    pub free_shipping_threshold: Decimal,
    pub standard_shipping: Decimal,
    /// Fraction of the discounted subtotal, `0.08` for 8%.
    pub tax_rate: Decimal,
    pub app_url: String,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub api_url: String,
}

#[derive(Clone, Debug)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_url: String,
}

#[derive(Clone, Debug)]
pub struct PrintfulConfig {
    pub api_key: String,
    pub webhook_secret: Option<String>,
    pub api_url: String,
}

#[derive(Clone, Debug, Default)]
pub struct EmailConfig {
    pub resend_api_key: Option<String>,
    pub from: String,
    pub admin_email: Option<String>,
    /// Every outbound email goes here instead when set.
    pub test_recipient: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            order_prefix: DEFAULT_ORDER_PREFIX.to_string(),
            currency: "USD".to_string(),
            free_shipping_threshold: Decimal::from(50),
            standard_shipping: Decimal::new(599, 2),
            tax_rate: Decimal::ZERO,
            app_url: "http://localhost:3000".to_string(),
        }
    }
}

impl StoreSettings {
    pub fn shipping_policy(&self) -> ShippingPolicy {
        ShippingPolicy { free_shipping_threshold: self.free_shipping_threshold, standard_shipping: self.standard_shipping }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = StoreSettings::default();
        let store = StoreSettings {
            order_prefix: var("ORDER_PREFIX").unwrap_or(defaults.order_prefix),
            currency: var("STORE_CURRENCY").map(|c| c.to_uppercase()).unwrap_or(defaults.currency),
            free_shipping_threshold: parsed("FREE_SHIPPING_THRESHOLD")?.unwrap_or(defaults.free_shipping_threshold),
            standard_shipping: parsed("STANDARD_SHIPPING")?.unwrap_or(defaults.standard_shipping),
            tax_rate: parsed("TAX_RATE")?.unwrap_or(defaults.tax_rate),
            app_url: var("APP_URL").unwrap_or(defaults.app_url),
        };

        let stripe = var("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
            secret_key,
            webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            api_url: var("STRIPE_API_URL").unwrap_or_else(|| STRIPE_API_URL.to_string()),
        });

        let paypal = match (var("PAYPAL_CLIENT_ID"), var("PAYPAL_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => {
                let api_url = match var("PAYPAL_MODE").as_deref() {
                    Some("live") => "https://api-m.paypal.com",
                    None | Some("sandbox") => "https://api-m.sandbox.paypal.com",
                    Some(other) => return Err(ConfigError::Invalid { key: "PAYPAL_MODE", value: other.to_string() }),
                };
                Some(PaypalConfig { client_id, client_secret, api_url: api_url.to_string() })
            }
            _ => None,
        };

        let printful = var("PRINTFUL_API_KEY").map(|api_key| PrintfulConfig {
            api_key,
            webhook_secret: var("PRINTFUL_WEBHOOK_SECRET"),
            api_url: var("PRINTFUL_API_URL").unwrap_or_else(|| PRINTFUL_API_URL.to_string()),
        });

        let email = EmailConfig {
            resend_api_key: var("RESEND_API_KEY"),
            from: var("EMAIL_FROM").unwrap_or_else(|| "orders@localhost".to_string()),
            admin_email: var("ADMIN_EMAIL"),
            test_recipient: var("EMAIL_TEST_RECIPIENT"),
        };

        Ok(Self {
            port: parsed("PORT")?.unwrap_or(DEFAULT_PORT),
            database_url: var("DATABASE_URL"),
            nats_url: var("NATS_URL"),
            store,
            stripe,
            paypal,
            printful,
            email,
            vendor_timeout: Duration::from_secs(parsed("VENDOR_TIMEOUT_SECS")?.unwrap_or(DEFAULT_VENDOR_TIMEOUT_SECS)),
        })
    }
}

/// Non-empty value of an environment variable.
fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    var(key)
        .map(|value| value.parse().map_err(|_| ConfigError::Invalid { key, value }))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_store_defaults() {
        let s = StoreSettings::default();
        assert_eq!(s.order_prefix, "DB");
        assert_eq!(s.free_shipping_threshold, dec!(50));
        assert_eq!(s.standard_shipping, dec!(5.99));
        assert_eq!(s.shipping_policy().standard_shipping, dec!(5.99));
    }

    #[test]
    fn test_parsed_rejects_garbage() {
        std::env::set_var("STOREFRONT_TEST_BAD_NUMBER", "fifty");
        let r: Result<Option<Decimal>, _> = parsed("STOREFRONT_TEST_BAD_NUMBER");
        assert!(matches!(r, Err(ConfigError::Invalid { .. })));
        let missing: Option<u16> = parsed("STOREFRONT_TEST_UNSET_KEY").unwrap();
        assert!(missing.is_none());
    }
}
