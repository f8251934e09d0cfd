//! Storefront - order lifecycle and fulfillment routing service

use anyhow::Result;
use std::sync::Arc;
use storefront::config::Config;
use storefront::notify::{Notifier, ResendMailer};
use storefront::payments::{PaymentGateway, PaypalGateway, StripeGateway};
use storefront::publisher::EventPublisher;
use storefront::services::{AppState, Integrations};
use storefront::store::{MemoryStore, PgStore, Store};
use storefront::vendors::{PrintOnDemandClient, PrintfulClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let timeout = config.vendor_timeout;
    let stripe: Option<Arc<dyn PaymentGateway>> = match config.stripe.clone() {
        Some(c) => Some(Arc::new(StripeGateway::new(c, timeout)?)),
        None => None,
    };
    let paypal: Option<Arc<dyn PaymentGateway>> = match config.paypal.clone() {
        Some(c) => Some(Arc::new(PaypalGateway::new(c, &config.store.app_url, timeout)?)),
        None => None,
    };
    let printful: Option<Arc<dyn PrintOnDemandClient>> = match config.printful.clone() {
        Some(c) => Some(Arc::new(PrintfulClient::new(c, timeout)?)),
        None => None,
    };
    let notifier: Option<Arc<dyn Notifier>> = match config.email.resend_api_key {
        Some(_) => Some(Arc::new(ResendMailer::new(config.email.clone(), timeout)?)),
        None => None,
    };
    tracing::info!(
        stripe = stripe.is_some(), paypal = paypal.is_some(), printful = printful.is_some(), email = notifier.is_some(),
        "integrations configured"
    );

    let integrations = Integrations {
        stripe,
        paypal,
        printful,
        notifier,
        stripe_webhook_secret: config.stripe.as_ref().and_then(|c| c.webhook_secret.clone()),
        printful_webhook_secret: config.printful.as_ref().and_then(|c| c.webhook_secret.clone()),
        admin_email: config.email.admin_email.clone(),
    };

    let nats = match &config.nats_url {
        Some(url) => async_nats::connect(url.as_str()).await.map_err(|e| tracing::warn!(error = %e, "NATS unavailable, events disabled")).ok(),
        None => None,
    };

    let state = AppState::new(store, config.store.clone())
        .with_integrations(integrations)
        .with_publisher(EventPublisher::new(nats));
    let app = storefront::api::router(state);

    tracing::info!("🚀 Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
