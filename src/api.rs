//! HTTP surface for the checkout page.
//!
//! Every browser session gets its own cart, checkout session and attempt
//! store, addressed by the `:session` path segment. Sessions idle longer than
//! [`SessionPolicy::idle_timeout`] are dropped from memory; with a
//! [`StoreLocation::Directory`] their attempt state is read back on next use.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::coupon::{AttemptGuard, CouponLookup, CouponOutcome, CouponValidator, GuardPolicy, ValidatorOptions};
use crate::domain::aggregates::{
    Cart, CartLineItem, CheckoutOptions, CheckoutSession, CheckoutView, FieldErrors, PaymentRedirect, SelectedVariant, ShippingAddress,
};
use crate::domain::events::CheckoutEvent;
use crate::domain::value_objects::{Quantity, UnitPrice};
use crate::error::{CartError, CheckoutError, StoreError};
use crate::flight::SingleFlight;
use crate::store::{FileStore, MemoryStore, StateStore};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Invalid { message: String, fields: FieldErrors },
    Unavailable(String),
    Internal(String),
}

impl From<CheckoutError> for ApiError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::Store(e) => e.into(),
            CheckoutError::Cart(CartError::ItemNotFound(id)) => Self::NotFound(format!("Cart item not found: {}", id)),
            CheckoutError::Cart(e) => Self::BadRequest(e.to_string()),
            e @ (CheckoutError::AddressLocked | CheckoutError::AddressNotSubmitted | CheckoutError::EmptyCart) => Self::Conflict(e.to_string()),
        }
    }
}

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self { CheckoutError::from(e).into() }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "checkout state store failure");
        Self::Internal("Checkout state is unavailable".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, serde_json::json!({ "error": m })),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": m })),
            Self::Conflict(m) => (StatusCode::CONFLICT, serde_json::json!({ "error": m })),
            Self::Invalid { message, fields } => (StatusCode::UNPROCESSABLE_ENTITY, serde_json::json!({ "error": message, "fields": fields })),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, serde_json::json!({ "error": m })),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({ "error": m })),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// State
// =============================================================================

#[derive(Clone, Debug)]
pub enum StoreLocation {
    Memory,
    /// One `<session>.json` file per browser session under this directory.
    Directory(PathBuf),
}

/// Builds the per-session pieces from shared collaborators.
pub struct SessionFactory {
    pub lookup: Arc<dyn CouponLookup>,
    pub clock: Arc<dyn Clock>,
    pub store: StoreLocation,
    pub guard: GuardPolicy,
    pub validator: ValidatorOptions,
    pub checkout: CheckoutOptions,
}

impl SessionFactory {
    fn open(&self, session: &str) -> Result<Shopper, StoreError> {
        let store: Arc<dyn StateStore> = match &self.store {
            StoreLocation::Memory => Arc::new(MemoryStore::new()),
            StoreLocation::Directory(dir) => Arc::new(FileStore::open(dir.join(format!("{}.json", session)))?),
        };
        let guard = AttemptGuard::new(store, self.clock.clone(), self.guard);
        let validator = CouponValidator::new(self.lookup.clone(), guard, self.clock.clone(), self.validator);
        Ok(Shopper { cart: Cart::new(), checkout: CheckoutSession::new(validator, self.checkout.clone()) })
    }
}

struct Shopper {
    cart: Cart,
    checkout: CheckoutSession,
}

impl Shopper {
    fn view(&self) -> ApiResult<CheckoutView> { Ok(self.checkout.view(&self.cart)?) }
}

/// Bounds on the in-memory session table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
    pub idle_timeout: Duration,
    pub max_sessions: usize,
}

impl Default for SessionPolicy {
    fn default() -> Self { Self { idle_timeout: Duration::from_secs(30 * 60), max_sessions: 10_000 } }
}

struct SessionEntry {
    shopper: Arc<Mutex<Shopper>>,
    last_seen: Instant,
}

impl SessionEntry {
    /// A handler still holds the shopper.
    fn in_use(&self) -> bool { Arc::strong_count(&self.shopper) > 1 }
}

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    policy: SessionPolicy,
    coupon_flights: SingleFlight,
    factory: Arc<SessionFactory>,
    nats: Option<async_nats::Client>,
}

impl AppState {
    pub fn new(factory: SessionFactory, nats: Option<async_nats::Client>) -> Self {
        Self {
            sessions: Arc::default(),
            policy: SessionPolicy::default(),
            coupon_flights: SingleFlight::new(),
            factory: Arc::new(factory),
            nats,
        }
    }

    pub fn with_session_policy(mut self, policy: SessionPolicy) -> Self { self.policy = policy; self }

    pub fn session_policy(&self) -> SessionPolicy { self.policy }

    pub async fn session_count(&self) -> usize { self.sessions.lock().await.len() }

    /// Drops sessions idle for longer than the policy allows. Returns how many went.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, e| e.in_use() || now.duration_since(e.last_seen) < self.policy.idle_timeout);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "evicted idle checkout sessions");
        }
        evicted
    }

    async fn shopper(&self, session: &str) -> ApiResult<Arc<Mutex<Shopper>>> {
        if session.is_empty() || session.len() > 64 || !session.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(ApiError::BadRequest("Invalid session id".into()));
        }
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(session) {
            entry.last_seen = now;
            return Ok(entry.shopper.clone());
        }
        if sessions.len() >= self.policy.max_sessions {
            sessions.retain(|_, e| e.in_use() || now.duration_since(e.last_seen) < self.policy.idle_timeout);
        }
        if sessions.len() >= self.policy.max_sessions {
            let oldest = sessions.iter().filter(|(_, e)| !e.in_use()).min_by_key(|(_, e)| e.last_seen).map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    sessions.remove(&key);
                    tracing::debug!(session = %key, "session table full, evicted least recently used");
                }
                None => return Err(ApiError::Unavailable("Too many active checkout sessions".into())),
            }
        }
        let shopper = Arc::new(Mutex::new(self.factory.open(session)?));
        sessions.insert(session.to_string(), SessionEntry { shopper: shopper.clone(), last_seen: now });
        Ok(shopper)
    }

    async fn publish(&self, events: Vec<CheckoutEvent>) {
        let Some(nats) = &self.nats else { return };
        for event in events {
            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    if let Err(e) = nats.publish(event.subject().to_string(), payload.into()).await {
                        tracing::warn!(error = %e, "failed to publish checkout event");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode checkout event"),
            }
        }
    }
}

// =============================================================================
// Routes
// =============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "skinstore-checkout"})) }))
        .route("/api/v1/checkout/:session", get(get_checkout))
        .route("/api/v1/checkout/:session/cart", post(add_cart_item))
        .route("/api/v1/checkout/:session/cart/:item", put(set_cart_quantity).delete(remove_cart_item))
        .route("/api/v1/checkout/:session/address", put(update_address))
        .route("/api/v1/checkout/:session/address/submit", post(submit_address))
        .route("/api/v1/checkout/:session/address/edit", post(edit_address))
        .route("/api/v1/checkout/:session/coupon", post(apply_coupon).delete(remove_coupon))
        .route("/api/v1/checkout/:session/payment", post(proceed_to_payment))
        .with_state(state)
}

async fn get_checkout(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Json<CheckoutView>> {
    let shopper = s.shopper(&session).await?;
    let shopper = shopper.lock().await;
    Ok(Json(shopper.view()?))
}

/// Cart line as posted by the storefront. Price and quantity are checked on
/// conversion so a bad value is a 400, not an extractor rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub image_ref: String,
    #[serde(default)]
    pub selected_variant: Option<SelectedVariant>,
}

impl TryFrom<AddItemRequest> for CartLineItem {
    type Error = CartError;

    fn try_from(r: AddItemRequest) -> Result<Self, Self::Error> {
        Ok(CartLineItem {
            id: r.id,
            name: r.name,
            unit_price: UnitPrice::new(r.unit_price)?,
            quantity: Quantity::new(r.quantity)?,
            image_ref: r.image_ref,
            selected_variant: r.selected_variant,
        })
    }
}

async fn add_cart_item(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddItemRequest>) -> ApiResult<(StatusCode, Json<CheckoutView>)> {
    let item = CartLineItem::try_from(r)?;
    let shopper = s.shopper(&session).await?;
    let mut shopper = shopper.lock().await;
    shopper.cart.add_item(item)?;
    Ok((StatusCode::CREATED, Json(shopper.view()?)))
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest { pub quantity: u32 }

async fn set_cart_quantity(State(s): State<AppState>, Path((session, item)): Path<(String, String)>, Json(r): Json<QuantityRequest>) -> ApiResult<Json<CheckoutView>> {
    let shopper = s.shopper(&session).await?;
    let mut shopper = shopper.lock().await;
    shopper.cart.update_quantity(&item, r.quantity)?;
    Ok(Json(shopper.view()?))
}

async fn remove_cart_item(State(s): State<AppState>, Path((session, item)): Path<(String, String)>) -> ApiResult<Json<CheckoutView>> {
    let shopper = s.shopper(&session).await?;
    let mut shopper = shopper.lock().await;
    shopper.cart.remove_item(&item)?;
    Ok(Json(shopper.view()?))
}

async fn update_address(State(s): State<AppState>, Path(session): Path<String>, Json(address): Json<ShippingAddress>) -> ApiResult<Json<CheckoutView>> {
    let shopper = s.shopper(&session).await?;
    let mut shopper = shopper.lock().await;
    shopper.checkout.update_address(address)?;
    Ok(Json(shopper.view()?))
}

async fn submit_address(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Json<CheckoutView>> {
    let shopper = s.shopper(&session).await?;
    let mut shopper = shopper.lock().await;
    if let Err(fields) = shopper.checkout.submit_address() {
        return Err(ApiError::Invalid { message: "Please correct the highlighted fields".into(), fields });
    }
    s.publish(shopper.checkout.take_events()).await;
    Ok(Json(shopper.view()?))
}

async fn edit_address(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Json<CheckoutView>> {
    let shopper = s.shopper(&session).await?;
    let mut shopper = shopper.lock().await;
    shopper.checkout.edit_address();
    Ok(Json(shopper.view()?))
}

#[derive(Debug, Deserialize)]
pub struct CouponRequest { pub code: String }

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponResponse {
    pub applied: bool,
    pub message: Option<String>,
    pub checkout: CheckoutView,
}

async fn apply_coupon(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<CouponRequest>) -> ApiResult<Json<CouponResponse>> {
    let shopper = s.shopper(&session).await?;
    let Some(_ticket) = s.coupon_flights.try_begin(&session) else {
        return Err(ApiError::Conflict("A coupon is already being checked".into()));
    };
    let mut shopper = shopper.lock().await;
    let outcome = shopper.checkout.apply_coupon(&r.code).await?;
    s.publish(shopper.checkout.take_events()).await;
    let message = match &outcome {
        CouponOutcome::Applied { .. } => None,
        CouponOutcome::Rejected { reason, .. } => Some(reason.user_message()),
    };
    Ok(Json(CouponResponse { applied: outcome.is_applied(), message, checkout: shopper.view()? }))
}

async fn remove_coupon(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Json<CheckoutView>> {
    let shopper = s.shopper(&session).await?;
    let mut shopper = shopper.lock().await;
    shopper.checkout.remove_coupon();
    s.publish(shopper.checkout.take_events()).await;
    Ok(Json(shopper.view()?))
}

async fn proceed_to_payment(State(s): State<AppState>, Path(session): Path<String>) -> ApiResult<Json<PaymentRedirect>> {
    let shopper = s.shopper(&session).await?;
    let mut guard = shopper.lock().await;
    let Shopper { cart, checkout } = &mut *guard;
    let redirect = checkout.proceed_to_payment(cart)?;
    s.publish(checkout.take_events()).await;
    Ok(Json(redirect))
}
