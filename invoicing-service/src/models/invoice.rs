use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Issued invoice row. The fiscal snapshot (receptor identity, amounts,
/// folio) is frozen here at issuance; later profile edits never touch it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub folio: String,
    pub serie: String,
    pub fiscal_uuid: Uuid,
    pub fecha: DateTime<Utc>,
    pub rfc: String,
    pub razon_social: String,
    pub regimen_fiscal: String,
    pub uso_cfdi: String,
    pub codigo_postal: String,
    pub domicilio: String,
    pub forma_pago: String,
    pub metodo_pago: String,
    pub subtotal: Decimal,
    pub iva: Decimal,
    pub total: Decimal,
    pub xml_url: String,
    pub pdf_url: String,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Issued,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "issued" => Some(InvoiceStatus::Issued),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        assert_eq!(
            InvoiceStatus::from_string(InvoiceStatus::Issued.as_str()),
            Some(InvoiceStatus::Issued)
        );
        assert_eq!(InvoiceStatus::from_string("void"), None);
    }
}
