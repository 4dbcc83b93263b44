use crate::config::{InvoicingConfig, StorageBackend};
use crate::handlers;
use crate::services::{Database, InvoiceIssuer, LocalStorage, S3Storage, Storage};
use axum::{
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub storage: Arc<dyn Storage>,
    pub issuer: InvoiceIssuer,
}

pub struct Application {
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: InvoicingConfig) -> Result<Self, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to PostgreSQL: {}", e);
            e
        })?;
        db.run_migrations().await?;

        let storage: Arc<dyn Storage> = match config.storage.backend {
            StorageBackend::Local => Arc::new(
                LocalStorage::new(&config.storage.local_path, config.app.base_url.clone())
                    .await
                    .map_err(|e| {
                        tracing::error!(
                            "Failed to initialize local storage at {}: {}",
                            config.storage.local_path,
                            e
                        );
                        e
                    })?,
            ),
            StorageBackend::S3 => {
                let aws_config = aws_config::load_defaults(
                    aws_config::BehaviorVersion::latest(),
                )
                .await;
                let client = aws_sdk_s3::Client::new(&aws_config);
                Arc::new(S3Storage::new(
                    client,
                    config.storage.s3_bucket.clone(),
                    config.storage.s3_region.clone(),
                ))
            }
        };

        let issuer = InvoiceIssuer::new(db.clone(), storage.clone(), config.app.base_url.clone());

        let state = AppState {
            db,
            storage,
            issuer,
        };

        let app = Router::new()
            .route("/health", get(handlers::health::health))
            .route("/metrics", get(handlers::health::metrics))
            .route("/subscriptions", post(handlers::subscriptions::record_subscription))
            .route("/invoices/generate", post(handlers::invoices::generate_invoice))
            .route("/invoices/validate-folio", post(handlers::invoices::validate_folio))
            .route("/invoices", get(handlers::invoices::list_invoices))
            .route("/invoices/verify/:uuid", get(handlers::invoices::verify_invoice))
            .route("/invoices/download", get(handlers::invoices::download_artifact))
            .route(
                "/fiscal-data",
                put(handlers::fiscal::save_fiscal_data).get(handlers::fiscal::get_fiscal_data),
            )
            .layer(axum::middleware::from_fn(
                crate::middleware::metrics::track_requests,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;

        tracing::info!("Listening on {}", listener.local_addr()?.port());

        let server = axum::serve(listener, app);

        Ok(Self {
            server: Box::new(server.into_future()),
        })
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
