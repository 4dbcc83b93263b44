//! Database service for invoicing-service.

use crate::models::{FiscalProfile, Invoice, Subscription};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "invoice_id, user_id, subscription_id, folio, serie, fiscal_uuid, \
     fecha, rfc, razon_social, regimen_fiscal, uso_cfdi, codigo_postal, domicilio, forma_pago, \
     metodo_pago, subtotal, iva, total, xml_url, pdf_url, status, created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoicing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Folio Operations
    // -------------------------------------------------------------------------

    /// Allocate the next folio. The sequence hands each caller a distinct
    /// value, so two concurrent issuers can never collide.
    #[instrument(skip(self))]
    pub async fn next_folio(&self) -> Result<String, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["next_folio"])
            .start_timer();

        let folio: String = sqlx::query_scalar("SELECT next_folio()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to allocate folio: {}", e))
            })?;

        timer.observe_duration();
        Ok(folio)
    }

    // -------------------------------------------------------------------------
    // Subscription Operations
    // -------------------------------------------------------------------------

    /// Record a paid subscription coming out of the payment flow.
    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.subscription_id))]
    pub async fn create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subscription"])
            .start_timer();

        let row = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (subscription_id, user_id, invoice_number, plan_name,
                plan_price, price_includes_tax, payment_method, payment_reference, status,
                invoice_issued, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING subscription_id, user_id, invoice_number, plan_name, plan_price,
                price_includes_tax, payment_method, payment_reference, status, invoice_issued,
                created_utc
            "#,
        )
        .bind(subscription.subscription_id)
        .bind(subscription.user_id)
        .bind(&subscription.invoice_number)
        .bind(&subscription.plan_name)
        .bind(subscription.plan_price)
        .bind(subscription.price_includes_tax)
        .bind(&subscription.payment_method)
        .bind(&subscription.payment_reference)
        .bind(&subscription.status)
        .bind(subscription.invoice_issued)
        .bind(subscription.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::BadRequest(anyhow::anyhow!(
                    "Invoice number '{}' is already registered",
                    subscription.invoice_number
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create subscription: {}", e)),
        })?;

        timer.observe_duration();

        info!(subscription_id = %row.subscription_id, "Subscription recorded");
        Ok(row)
    }

    /// Look up a subscription by its invoicing token.
    #[instrument(skip(self))]
    pub async fn get_subscription_by_invoice_number(
        &self,
        invoice_number: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription_by_invoice_number"])
            .start_timer();

        let row = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT subscription_id, user_id, invoice_number, plan_name, plan_price,
                price_includes_tax, payment_method, payment_reference, status, invoice_issued,
                created_utc
            FROM subscriptions
            WHERE invoice_number = $1
            "#,
        )
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch subscription: {}", e))
        })?;

        timer.observe_duration();
        Ok(row)
    }

    /// Latch the idempotency flag once the invoice exists.
    #[instrument(skip(self))]
    pub async fn mark_subscription_invoiced(
        &self,
        subscription_id: Uuid,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_subscription_invoiced"])
            .start_timer();

        sqlx::query("UPDATE subscriptions SET invoice_issued = TRUE WHERE subscription_id = $1")
            .bind(subscription_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to mark subscription invoiced: {}",
                    e
                ))
            })?;

        timer.observe_duration();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Persist an issued invoice. A unique violation on `subscription_id`
    /// means a concurrent request won the race; surface it as a conflict.
    #[instrument(skip(self, invoice), fields(folio = %invoice.folio))]
    pub async fn create_invoice(&self, invoice: &Invoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let row = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (invoice_id, user_id, subscription_id, folio, serie,
                fiscal_uuid, fecha, rfc, razon_social, regimen_fiscal, uso_cfdi, codigo_postal,
                domicilio, forma_pago, metodo_pago, subtotal, iva, total, xml_url, pdf_url,
                status, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22)
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice.invoice_id)
        .bind(invoice.user_id)
        .bind(invoice.subscription_id)
        .bind(&invoice.folio)
        .bind(&invoice.serie)
        .bind(invoice.fiscal_uuid)
        .bind(invoice.fecha)
        .bind(&invoice.rfc)
        .bind(&invoice.razon_social)
        .bind(&invoice.regimen_fiscal)
        .bind(&invoice.uso_cfdi)
        .bind(&invoice.codigo_postal)
        .bind(&invoice.domicilio)
        .bind(&invoice.forma_pago)
        .bind(&invoice.metodo_pago)
        .bind(invoice.subtotal)
        .bind(invoice.iva)
        .bind(invoice.total)
        .bind(&invoice.xml_url)
        .bind(&invoice.pdf_url)
        .bind(&invoice.status)
        .bind(invoice.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::AlreadyInvoiced(anyhow::anyhow!(
                    "An invoice already exists for this subscription"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        timer.observe_duration();

        info!(invoice_id = %row.invoice_id, folio = %row.folio, "Invoice persisted");
        Ok(row)
    }

    /// Public verification lookup by fiscal UUID.
    #[instrument(skip(self))]
    pub async fn get_invoice_by_uuid(
        &self,
        fiscal_uuid: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_by_uuid"])
            .start_timer();

        let row = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE fiscal_uuid = $1",
            INVOICE_COLUMNS
        ))
        .bind(fiscal_uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice: {}", e)))?;

        timer.observe_duration();
        Ok(row)
    }

    /// Ownership lookup used by the artifact download path.
    #[instrument(skip(self))]
    pub async fn get_invoice_by_folio(&self, folio: &str) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_by_folio"])
            .start_timer();

        let row = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE folio = $1",
            INVOICE_COLUMNS
        ))
        .bind(folio)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice: {}", e)))?;

        timer.observe_duration();
        Ok(row)
    }

    /// All invoices issued to one user, newest first.
    #[instrument(skip(self))]
    pub async fn list_invoices_for_user(&self, user_id: Uuid) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices_for_user"])
            .start_timer();

        let rows = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE user_id = $1 ORDER BY created_utc DESC",
            INVOICE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Fiscal Profile Operations
    // -------------------------------------------------------------------------

    /// Save or refresh the user's fiscal identity.
    #[instrument(skip(self, profile), fields(user_id = %profile.user_id))]
    pub async fn upsert_fiscal_profile(
        &self,
        profile: &FiscalProfile,
    ) -> Result<FiscalProfile, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_fiscal_profile"])
            .start_timer();

        let row = sqlx::query_as::<_, FiscalProfile>(
            r#"
            INSERT INTO fiscal_profiles (user_id, rfc, razon_social, regimen_fiscal, uso_cfdi,
                codigo_postal, calle, numero_exterior, numero_interior, colonia, municipio,
                estado, pais, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                rfc = EXCLUDED.rfc,
                razon_social = EXCLUDED.razon_social,
                regimen_fiscal = EXCLUDED.regimen_fiscal,
                uso_cfdi = EXCLUDED.uso_cfdi,
                codigo_postal = EXCLUDED.codigo_postal,
                calle = EXCLUDED.calle,
                numero_exterior = EXCLUDED.numero_exterior,
                numero_interior = EXCLUDED.numero_interior,
                colonia = EXCLUDED.colonia,
                municipio = EXCLUDED.municipio,
                estado = EXCLUDED.estado,
                pais = EXCLUDED.pais,
                updated_utc = NOW()
            RETURNING user_id, rfc, razon_social, regimen_fiscal, uso_cfdi, codigo_postal,
                calle, numero_exterior, numero_interior, colonia, municipio, estado, pais,
                updated_utc
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.rfc)
        .bind(&profile.razon_social)
        .bind(&profile.regimen_fiscal)
        .bind(&profile.uso_cfdi)
        .bind(&profile.codigo_postal)
        .bind(&profile.calle)
        .bind(&profile.numero_exterior)
        .bind(&profile.numero_interior)
        .bind(&profile.colonia)
        .bind(&profile.municipio)
        .bind(&profile.estado)
        .bind(&profile.pais)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to save fiscal profile: {}", e))
        })?;

        timer.observe_duration();
        Ok(row)
    }

    #[instrument(skip(self))]
    pub async fn get_fiscal_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<FiscalProfile>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_fiscal_profile"])
            .start_timer();

        let row = sqlx::query_as::<_, FiscalProfile>(
            r#"
            SELECT user_id, rfc, razon_social, regimen_fiscal, uso_cfdi, codigo_postal,
                calle, numero_exterior, numero_interior, colonia, municipio, estado, pais,
                updated_utc
            FROM fiscal_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch fiscal profile: {}", e))
        })?;

        timer.observe_duration();
        Ok(row)
    }
}
