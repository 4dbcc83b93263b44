use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Saved fiscal identity, keyed by user. Upserted on every invoice request
/// so the next request starts pre-filled.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FiscalProfile {
    pub user_id: Uuid,
    pub rfc: String,
    pub razon_social: String,
    pub regimen_fiscal: String,
    pub uso_cfdi: String,
    pub codigo_postal: String,
    pub calle: String,
    pub numero_exterior: String,
    pub numero_interior: Option<String>,
    pub colonia: String,
    pub municipio: String,
    pub estado: String,
    pub pais: String,
    pub updated_utc: DateTime<Utc>,
}
