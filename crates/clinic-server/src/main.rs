//! Clinic Directory Membership Server
//!
//! Axum server for the membership checkout endpoints. Stripe is optional:
//! without `STRIPE_SECRET_KEY` the checkout endpoints answer 503.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_billing::{
    ClientReferenceCodec, MemoryUserStore, PlanCatalog, PostgrestUserStore, StripeProvider,
    UserRecordStore,
};

use crate::config::ServerConfig;
use crate::state::{AppState, Billing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let checkout_routes = config.routes();

    let catalog = Arc::new(PlanCatalog::standard().with_price_overrides(|key| std::env::var(key).ok()));
    tracing::info!("Loaded {} membership plans", catalog.plans().len());

    // User records
    let records: Arc<dyn UserRecordStore> = match PostgrestUserStore::from_env() {
        Ok(store) => {
            tracing::info!("✓ Record store configured");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!("⚠ {e} - using in-memory user records");
            tracing::warn!("  Set RECORD_STORE_URL and RECORD_STORE_KEY in .env");
            Arc::new(MemoryUserStore::new())
        }
    };

    // Client reference signing
    let codec = ClientReferenceCodec::from_env();
    if !codec.is_signed() {
        tracing::warn!("⚠ CLIENT_REFERENCE_SECRET not set - session client references are unsigned");
    }

    // Payments
    let billing = match StripeProvider::from_env() {
        Ok(stripe) => {
            tracing::info!("✓ Stripe configured");
            Some(Arc::new(Billing::new(
                Arc::new(stripe),
                records.clone(),
                catalog.clone(),
                codec,
                checkout_routes.clone(),
            )))
        }
        Err(e) => {
            tracing::warn!("⚠ {e} - payments disabled");
            None
        }
    };

    let state = AppState {
        catalog,
        records,
        routes: checkout_routes,
        billing,
    };

    let app = routes::app(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Clinic membership server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                      - Health check");
    tracing::info!("  GET  /api/plans                   - Membership plans");
    tracing::info!("  POST /api/create-checkout-session - Start checkout");
    tracing::info!("  POST /api/checkout/session        - Start checkout by email");
    tracing::info!("  GET  /api/checkout-success        - Stripe success redirect");
    tracing::info!("  POST /api/verify-session          - Verify a paid session");
    tracing::info!("  POST /api/cancel-subscription     - Cancel at period end");
    tracing::info!("  GET  /api/membership/{{uid}}        - Membership status");

    axum::serve(listener, app).await?;

    Ok(())
}
