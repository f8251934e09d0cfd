//! Application services: the operations behind every route.
//!
//! Services own no state of their own; everything hangs off [`AppState`],
//! which carries the store, pricing settings and the injected integrations.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::StoreSettings;
use crate::domain::aggregates::{Cart, Order};
use crate::domain::events::OrderEvent;
use crate::notify::{Notifier, NotifyError, OutboundEmail};
use crate::payments::PaymentGateway;
use crate::publisher::EventPublisher;
use crate::store::{Store, StoreError};
use crate::vendors::PrintOnDemandClient;
use crate::{Result, StorefrontError};

pub mod cart;
pub mod catalog;
pub mod discounts;
pub mod fulfillment;
pub mod messages;
pub mod orders;
pub mod payments;
pub mod webhooks;

/// Attempts per compare-and-swap before giving up with a conflict.
pub const MAX_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub settings: Arc<StoreSettings>,
    pub integrations: Integrations,
    pub publisher: EventPublisher,
}

/// Outbound clients; `None` means the integration is not configured.
#[derive(Clone, Default)]
pub struct Integrations {
    pub stripe: Option<Arc<dyn PaymentGateway>>,
    pub paypal: Option<Arc<dyn PaymentGateway>>,
    pub printful: Option<Arc<dyn PrintOnDemandClient>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub stripe_webhook_secret: Option<String>,
    pub printful_webhook_secret: Option<String>,
    pub admin_email: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, settings: StoreSettings) -> Self {
        Self { store, settings: Arc::new(settings), integrations: Integrations::default(), publisher: EventPublisher::disabled() }
    }

    pub fn with_integrations(mut self, integrations: Integrations) -> Self {
        self.integrations = integrations;
        self
    }

    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub(crate) async fn send_email(&self, email: &OutboundEmail) -> std::result::Result<(), NotifyError> {
        match &self.integrations.notifier {
            Some(n) => n.send(email).await,
            None => Err(NotifyError::NotConfigured),
        }
    }

    pub(crate) async fn load_order(&self, id: Uuid) -> Result<Order> {
        self.store.get_order(id).await?.ok_or_else(|| StorefrontError::not_found("Order not found"))
    }
}

/// An order write that won its compare-and-swap.
pub struct Saved<T> {
    pub order: Order,
    pub value: T,
    /// Events raised by the winning attempt, already published.
    pub events: Vec<OrderEvent>,
}

/// Re-reads the order and re-applies `apply` until the save wins.
pub(crate) async fn update_order<T, F>(state: &AppState, id: Uuid, mut apply: F) -> Result<Saved<T>>
where
    F: FnMut(&mut Order) -> Result<T>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let mut order = state.load_order(id).await?;
        let value = apply(&mut order)?;
        match state.store.save_order(&mut order).await {
            Ok(()) => {
                let events = order.take_events();
                state.publisher.publish_all(events.clone()).await;
                return Ok(Saved { order, value, events });
            }
            Err(StoreError::VersionConflict) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(order_id = %id, attempt, "order changed concurrently, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StorefrontError::Conflict)
}

/// Locates a shopper's cart: the user's cart first, then the session's.
pub(crate) async fn find_cart(state: &AppState, session_id: &str, user_id: Option<&str>) -> Result<Option<Cart>> {
    if let Some(user) = user_id {
        if let Some(cart) = state.store.find_cart_by_user(user).await? {
            return Ok(Some(cart));
        }
    }
    Ok(state.store.find_cart_by_session(session_id).await?)
}

/// Same retry loop as [`update_order`], creating the cart on first write.
pub(crate) async fn update_cart<T, F>(state: &AppState, session_id: &str, user_id: Option<&str>, mut apply: F) -> Result<(Cart, T)>
where
    F: FnMut(&mut Cart) -> Result<T>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let mut cart = match find_cart(state, session_id, user_id).await? {
            Some(cart) => cart,
            None => Cart::new(session_id, user_id.map(str::to_string), Utc::now()),
        };
        if let Some(user) = user_id {
            if cart.user_id().is_none() { cart.assign_user(user, Utc::now()); }
        }
        let value = apply(&mut cart)?;
        match state.store.save_cart(&mut cart).await {
            Ok(()) => return Ok((cart, value)),
            Err(StoreError::VersionConflict) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(session_id, attempt, "cart changed concurrently, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(StorefrontError::Conflict)
}
