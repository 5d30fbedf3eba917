//! Checkout Demo
//!
//! Walks one purchaser through a complete checkout:
//! - Tier and quantity selection
//! - Coupon validation, including an edit that resets the discount
//! - Purchase with the applied coupon
//! - A second checkout cancelled mid-validation, then a purchase that a
//!   late cancel cannot abandon
//!
//! # Usage
//!
//! ```bash
//! # Against in-memory collaborators
//! cargo run --bin demo
//!
//! # Against a running backend (BACKEND_URL, DEMO_EMAIL, DEMO_PASSWORD, DEMO_EVENT_ID)
//! cargo run --bin demo -- --remote
//! ```

use anyhow::Context;
use checkout_core::environment::{Clock, SystemClock};
use metrics_exporter_prometheus::PrometheusBuilder;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use ticketing::{
    checkout_store,
    checkout::CheckoutPhase,
    coupon::{Coupon, InMemoryCouponBook},
    gateway::{BackendClient, MockPurchaseGateway},
    metrics::register_business_metrics,
    session::{FileSessionStore, InMemorySessionStore, Session, SessionManager},
    types::{DiscountPercentage, Event, EventId, Money, UserProfile},
    CheckoutAction, CheckoutEnvironment, CheckoutError, CheckoutStore, Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

type Backend = (Event, CheckoutEnvironment, Session);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},ticketing=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate().context("invalid configuration")?;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;
    register_business_metrics();

    println!("\n🎫 ============================================");
    println!("   Ticket Checkout - Live Demo");
    println!("============================================\n");

    let remote = std::env::args().any(|arg| arg == "--remote");

    let backend = if remote {
        let credentials = std::env::var("DEMO_EMAIL")
            .ok()
            .zip(std::env::var("DEMO_PASSWORD").ok());
        let event_id = std::env::var("DEMO_EVENT_ID").context("DEMO_EVENT_ID is not set")?;
        remote_backend(&config, credentials, EventId::new(event_id)).await
    } else {
        in_memory_backend().await
    };
    let (event, environment, session) = match backend {
        Ok(backend) => backend,
        Err(error) if error.is_retryable() => {
            return Err(anyhow::Error::new(error).context("backend unavailable, try again shortly"));
        },
        Err(error) => return Err(error.into()),
    };

    println!("📋 Event: {} ({})", event.title(), event.id());
    println!("   Regular: {}", event.regular_price());
    if let Some(member) = event.member_price() {
        println!("   IEEE member: {member}");
    }
    println!("   Purchaser: {}\n", session.user().email);

    // ========== Checkout ==========

    let store = checkout_store(event.clone(), Some(session.clone()), environment);

    println!("1️⃣  Selecting two regular tickets...");
    send(&store, CheckoutAction::SelectTier(ticketing::Tier::Regular)).await?;
    send(&store, CheckoutAction::QuantityInput("2".to_string())).await?;
    print_quote(&store).await;

    println!("2️⃣  Applying coupon SAVE10...");
    send(&store, CheckoutAction::EditCouponCode("SAVE10".to_string())).await?;
    send(&store, CheckoutAction::ApplyCoupon).await?;
    print_notice(&store).await;
    print_quote(&store).await;

    println!("3️⃣  Editing the coupon field drops the discount...");
    send(&store, CheckoutAction::EditCouponCode("SAVE1".to_string())).await?;
    print_quote(&store).await;
    send(&store, CheckoutAction::EditCouponCode("SAVE10".to_string())).await?;
    send(&store, CheckoutAction::ApplyCoupon).await?;
    print_quote(&store).await;

    println!("4️⃣  Purchasing...");
    send(&store, CheckoutAction::ProceedToCheckout).await?;
    send(&store, CheckoutAction::SubmitPurchase).await?;
    print_notice(&store).await;
    match store.state(|s| s.phase.clone()).await {
        CheckoutPhase::Completed { ticket_id } => println!("   ✓ Ticket: {ticket_id}\n"),
        phase => println!("   ✗ Checkout ended in {}\n", phase.name()),
    }
    store.teardown().await;

    // ========== Cancelled checkout ==========

    if !remote {
        println!("5️⃣  Cancelling a checkout while a coupon is being checked...");
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let book = InMemoryCouponBook::new(Arc::clone(&clock))
            .with_latency(Duration::from_millis(300));
        book.insert(Coupon::new(
            "SAVE10",
            DiscountPercentage::new(Decimal::from(10)),
            clock.now() - chrono::Duration::days(1),
        ));
        let slow = CheckoutEnvironment::new(
            clock,
            Arc::new(book.clone()),
            Arc::new(
                MockPurchaseGateway::new()
                    .with_coupons(book)
                    .with_latency(Duration::from_millis(300)),
            ),
        );
        let store = checkout_store(event, Some(session), slow);
        send(&store, CheckoutAction::ProceedToCheckout).await?;
        send(&store, CheckoutAction::EditCouponCode("SAVE10".to_string())).await?;
        let _in_flight = store.send(CheckoutAction::ApplyCoupon).await?;
        send(&store, CheckoutAction::Cancel).await?;
        tokio::time::sleep(Duration::from_millis(400)).await;
        let (phase, coupon) = store.state(|s| (s.phase.clone(), s.coupon.clone())).await;
        println!("   ✓ Checkout is back to {}, coupon {coupon:?}\n", phase.name());

        println!("6️⃣  Cancelling after submitting has no effect...");
        send(&store, CheckoutAction::ProceedToCheckout).await?;
        let mut purchase = store.send(CheckoutAction::SubmitPurchase).await?;
        send(&store, CheckoutAction::Cancel).await?;
        purchase.wait_with_timeout(RESPONSE_TIMEOUT).await?;
        match store.state(|s| s.phase.clone()).await {
            CheckoutPhase::Completed { ticket_id } => println!("   ✓ Ticket: {ticket_id}\n"),
            phase => println!("   ✗ Checkout ended in {}\n", phase.name()),
        }
        store.teardown().await;
    }

    println!("📈 Metrics:\n{}", prometheus.render());

    Ok(())
}

/// Sends an action and waits until every effect it started has fed back
async fn send(store: &CheckoutStore, action: CheckoutAction) -> Result<(), CheckoutError> {
    let mut handle = store.send(action).await?;
    handle.wait_with_timeout(RESPONSE_TIMEOUT).await?;
    Ok(())
}

async fn print_quote(store: &CheckoutStore) {
    match store.state(ticketing::CheckoutState::quote).await {
        Ok(quote) => {
            let discount = quote
                .discount
                .map_or_else(|| "none".to_string(), |d| d.to_string());
            println!(
                "   {} × {} = {}, discount {}, total {}\n",
                quote.unit_price, quote.quantity, quote.subtotal, discount, quote.total
            );
        },
        Err(error) => println!("   ✗ {error}\n"),
    }
}

async fn print_notice(store: &CheckoutStore) {
    if let Some(notice) = store.state(|s| s.notice.clone()).await {
        println!("   [{:?}] {}", notice.level, notice.message);
    }
}

/// In-memory collaborators seeded with a sample event, coupons and purchaser
async fn in_memory_backend() -> Result<Backend, CheckoutError> {
    let sessions = SessionManager::new(Arc::new(InMemorySessionStore::new()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let event = Event::new(
        EventId::new("ieee-gala-2025"),
        "IEEE Winter Gala",
        Money::from_dollars(50),
        Some(Money::from_dollars(40)),
    )?;

    let book = InMemoryCouponBook::new(Arc::clone(&clock))
        .with_latency(Duration::from_millis(50));
    let since = clock.now() - chrono::Duration::days(1);
    book.insert(Coupon::new("SAVE10", DiscountPercentage::new(Decimal::from(10)), since));
    book.insert(
        Coupon::new("GALA25", DiscountPercentage::new(Decimal::from(25)), since)
            .for_event(event.id().clone())
            .with_max_uses(1),
    );

    let session = match sessions.hydrate().await? {
        Some(session) => session,
        None => {
            let session = Session::new(
                "demo-token",
                UserProfile {
                    id: "demo-user".to_string(),
                    email: "demo@example.org".to_string(),
                    first_name: "Demo".to_string(),
                    last_name: "Purchaser".to_string(),
                    ieee_member: true,
                    ieee_verified: true,
                },
            );
            sessions.begin(session.clone()).await?;
            session
        },
    };

    let environment = CheckoutEnvironment::new(
        clock,
        Arc::new(book.clone()),
        Arc::new(
            MockPurchaseGateway::new()
                .with_coupons(book)
                .with_latency(Duration::from_millis(50)),
        ),
    );
    Ok((event, environment, session))
}

/// Collaborators backed by the ticketing API
///
/// The signed-in session is kept in `SESSION_FILE`, so only the first run
/// needs credentials (`DEMO_EMAIL`, `DEMO_PASSWORD`).
async fn remote_backend(
    config: &Config,
    credentials: Option<(String, String)>,
    event_id: EventId,
) -> Result<Backend, CheckoutError> {
    let sessions = SessionManager::new(Arc::new(FileSessionStore::new(&config.session.file)));
    let client = BackendClient::from_config(&config.backend)?;

    let session = match sessions.hydrate().await? {
        Some(session) => session,
        None => {
            let (email, password) = credentials.ok_or(CheckoutError::SignInRequired)?;
            let session = client.login(&email, &password).await?;
            sessions.begin(session.clone()).await?;
            session
        },
    };

    let event = client.fetch_event(&event_id).await?;

    let client = Arc::new(client);
    let environment = CheckoutEnvironment::new(Arc::new(SystemClock), client.clone(), client);
    Ok((event, environment, session))
}
