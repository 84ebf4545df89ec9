use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use skinstore_checkout::{
    AttemptGuard, Cart, CartLineItem, CheckoutError, CheckoutOptions, CheckoutSession, Clock, Coupon, CouponRejection, CouponValidator,
    FileStore, FormMode, GuardPolicy, GuardState, ManualClock, Quantity, SelectedVariant, ShippingAddress, StateStore, StaticCampaigns,
    UnitPrice, ValidatorOptions,
};

fn start() -> chrono::DateTime<Utc> { Utc.with_ymd_and_hms(2026, 8, 15, 18, 0, 0).unwrap() }

fn campaigns() -> Arc<StaticCampaigns> {
    Arc::new(StaticCampaigns::new(vec![Coupon {
        code: "MONSOON20".into(),
        discount_percent: Decimal::from(20),
        active: true,
        start_date: start() - Duration::days(1),
        end_date: start() + Duration::days(30),
    }]))
}

fn cart() -> Cart {
    let mut cart = Cart::new();
    cart.add_item(CartLineItem {
        id: "ps5-skin".into(),
        name: "Marble PS5 skin".into(),
        unit_price: UnitPrice::new(Decimal::from(500)).unwrap(),
        quantity: Quantity::new(2).unwrap(),
        image_ref: "/img/ps5-marble.webp".into(),
        selected_variant: Some(SelectedVariant { brand: "Sony".into(), model: "PS5 Slim".into() }),
    })
    .unwrap();
    cart
}

fn checkout(store: Arc<dyn StateStore>, clock: Arc<ManualClock>, lookup: Arc<StaticCampaigns>) -> CheckoutSession {
    let guard = AttemptGuard::new(store, clock.clone(), GuardPolicy::default());
    let validator = CouponValidator::new(lookup, guard, clock, ValidatorOptions::default());
    CheckoutSession::new(validator, CheckoutOptions::default())
}

fn state_file(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("skinstore-flow-{}-{}.json", name, uuid::Uuid::new_v4()))
}

#[tokio::test]
async fn lockout_survives_reload_and_expires() {
    let path = state_file("lockout");
    let clock = Arc::new(ManualClock::new(start()));
    let lookup = campaigns();

    {
        let mut page = checkout(Arc::new(FileStore::open(&path).unwrap()), clock.clone(), lookup.clone());
        for _ in 0..5 {
            page.apply_coupon("guess").await.unwrap();
        }
        assert_eq!(page.coupon_section().unwrap().state, GuardState::Blocked);
    }

    // page reload: fresh session over the same persisted state
    let mut page = checkout(Arc::new(FileStore::open(&path).unwrap()), clock.clone(), lookup.clone());
    let outcome = page.apply_coupon("MONSOON20").await.unwrap();
    assert!(!outcome.is_applied());
    assert!(matches!(page.coupon_section().unwrap().state, GuardState::Blocked));
    assert_eq!(outcome.guard().attempt_count, 5);
    assert_eq!(lookup.calls(), 5);

    clock.advance(Duration::minutes(10));
    let outcome = page.apply_coupon("monsoon20").await.unwrap();
    assert!(outcome.is_applied());
    assert_eq!(lookup.calls(), 6);
    assert_eq!(page.pricing(&cart()).total, Decimal::from(944));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn sixth_attempt_is_refused_before_lookup() {
    let clock = Arc::new(ManualClock::new(start()));
    let lookup = campaigns();
    let mut page = checkout(Arc::new(skinstore_checkout::MemoryStore::new()), clock.clone(), lookup.clone());
    for _ in 0..5 {
        page.apply_coupon("WRONG").await.unwrap();
    }
    clock.advance(Duration::minutes(3));
    let sixth = page.apply_coupon("WRONG").await.unwrap();
    match sixth {
        skinstore_checkout::CouponOutcome::Rejected { reason: CouponRejection::Blocked { until, retry_after_secs }, guard } => {
            assert_eq!(until, start() + Duration::minutes(10));
            assert_eq!(retry_after_secs, 7 * 60);
            assert_eq!(guard.attempt_count, 5);
        }
        other => panic!("expected lockout, got {:?}", other),
    }
    assert_eq!(lookup.calls(), 5);
    assert!(clock.now() < start() + Duration::minutes(10));
}

#[tokio::test]
async fn whole_page_flow() {
    let clock = Arc::new(ManualClock::new(start()));
    let mut page = checkout(Arc::new(skinstore_checkout::MemoryStore::new()), clock, campaigns());
    let cart = cart();

    let view = page.view(&cart).unwrap();
    assert_eq!(view.address.mode, FormMode::Editing);
    assert_eq!(view.pricing.total, Decimal::from(1180));
    assert!(!view.can_proceed);

    page.apply_coupon("MONSOON20").await.unwrap();
    page.apply_coupon("EXPIRED-GUESS").await.unwrap();
    let view = page.view(&cart).unwrap();
    assert_eq!(view.pricing.discounted_subtotal, Decimal::from(800));
    assert_eq!(view.pricing.tax, Decimal::from(144));
    assert_eq!(view.coupon.error.as_deref(), Some("Invalid coupon code"));
    assert_eq!(view.coupon.remaining_attempts, 4);

    let entered = ShippingAddress {
        email: "dev@example.in".into(),
        first_name: "Dev".into(),
        last_name: "Menon".into(),
        address: "7 Marine Drive".into(),
        apartment: None,
        city: "Kochi".into(),
        zip: "68203".into(),
        country: "India".into(),
        phone: "9847012345".into(),
        customer_note: Some("Leave with security".into()),
    };
    page.update_address(entered.clone()).unwrap();
    let errors = page.submit_address().unwrap_err();
    assert!(errors.contains_key("zip"));
    assert!(matches!(page.proceed_to_payment(&cart), Err(CheckoutError::AddressNotSubmitted)));

    let fixed = ShippingAddress { zip: "682031".into(), ..entered };
    page.update_address(fixed.clone()).unwrap();
    page.submit_address().unwrap();
    page.edit_address();
    assert_eq!(page.address_form().address(), &fixed);
    page.submit_address().unwrap();

    let redirect = page.proceed_to_payment(&cart).unwrap();
    assert_eq!(redirect.total, Decimal::from(944));
    assert_eq!(redirect.route, "/payment");
    assert!(!page.take_events().is_empty());
}
