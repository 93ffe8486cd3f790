use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use order_service_api::{
    clients::{
        HttpInventoryClient, IdentityClient, InventoryClient, JwtIdentityClient,
        RemoteIdentityClient,
    },
    config::AppConfig,
    db::{create_pool, orm_from_pool, run_migrations},
    events::{EventEmitter, EventPublisher, KafkaRestPublisher, LogPublisher},
    routes::create_app,
    services::order_service::OrderService,
    state::AppState,
    store::{OrderStore, SeaOrmOrderStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,order_service_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let store: Arc<dyn OrderStore> = Arc::new(SeaOrmOrderStore::new(orm_from_pool(pool)));

    let inventory: Arc<dyn InventoryClient> = Arc::new(
        HttpInventoryClient::new(
            config.inventory_service_url.as_str(),
            config.remote_connect_timeout,
            config.remote_timeout,
        )
        .context("inventory client")?,
    );

    let identity: Arc<dyn IdentityClient> = match (
        &config.identity_service_url,
        &config.jwt_secret,
    ) {
        (Some(url), _) => {
            tracing::info!(%url, "validating tokens with the user service");
            Arc::new(
                RemoteIdentityClient::new(
                    url.as_str(),
                    config.remote_connect_timeout,
                    config.remote_timeout,
                )
                .context("identity client")?,
            )
        }
        (None, Some(secret)) => {
            tracing::info!("validating tokens locally");
            Arc::new(JwtIdentityClient::new(secret))
        }
        (None, None) => anyhow::bail!("either IDENTITY_SERVICE_URL or JWT_SECRET must be set"),
    };

    let publisher: Arc<dyn EventPublisher> = match &config.event_bus_url {
        Some(url) => {
            tracing::info!(%url, "publishing events to the event bus");
            Arc::new(
                KafkaRestPublisher::new(url.as_str(), config.remote_timeout)
                    .context("event publisher")?,
            )
        }
        None => {
            tracing::warn!("EVENT_BUS_URL not set, events will only be logged");
            Arc::new(LogPublisher)
        }
    };
    let events = EventEmitter::new(publisher, config.topics.clone());

    let state = AppState::new(OrderService::new(store, inventory, events), identity);
    let app = create_app(state);

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    tracing::info!("listening on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;

    Ok(())
}
