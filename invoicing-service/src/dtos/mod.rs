//! Request/response bodies for the HTTP surface.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Invoice, Subscription};

/// Fiscal identity submitted with an invoice request. Field-level checks
/// here; RFC charset and postal digits are enforced in the CFDI layer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FiscalDataDto {
    #[validate(length(min = 12, max = 13))]
    pub rfc: String,
    #[validate(length(min = 1, max = 254))]
    pub razon_social: String,
    #[validate(length(min = 3, max = 3))]
    pub regimen_fiscal: String,
    #[validate(length(min = 3, max = 4))]
    pub uso_cfdi: String,
    #[validate(length(min = 5, max = 5))]
    pub codigo_postal: String,
    #[validate(length(min = 1, max = 128))]
    pub calle: String,
    #[validate(length(min = 1, max = 16))]
    pub numero_exterior: String,
    #[validate(length(max = 16))]
    pub numero_interior: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub colonia: String,
    #[validate(length(min = 1, max = 128))]
    pub municipio: String,
    #[validate(length(min = 1, max = 64))]
    pub estado: String,
    #[validate(length(max = 64))]
    pub pais: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateInvoiceRequest {
    #[validate(length(min = 1, max = 32))]
    pub invoice_number: String,
    #[validate(nested)]
    pub fiscal_data: FiscalDataDto,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateFolioRequest {
    #[validate(length(min = 1, max = 32))]
    pub invoice_number: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateFolioResponse {
    pub valid: bool,
    pub already_invoiced: bool,
    pub plan_name: Option<String>,
    pub amount: Option<Decimal>,
}

/// Payment-completion event recorded as a subscription.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordSubscriptionRequest {
    #[validate(length(min = 1, max = 32))]
    pub invoice_number: String,
    #[validate(length(min = 1, max = 128))]
    pub plan_name: String,
    #[validate(range(min = 0.01))]
    pub amount: f64,
    pub price_includes_tax: Option<bool>,
    #[validate(length(max = 32))]
    pub payment_method: Option<String>,
    #[validate(length(max = 128))]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionSummary {
    pub subscription_id: Uuid,
    pub invoice_number: String,
    pub plan_name: String,
    pub status: String,
    pub invoice_issued: bool,
}

impl From<Subscription> for SubscriptionSummary {
    fn from(s: Subscription) -> Self {
        Self {
            subscription_id: s.subscription_id,
            invoice_number: s.invoice_number,
            plan_name: s.plan_name,
            status: s.status,
            invoice_issued: s.invoice_issued,
        }
    }
}

/// Invoice as returned to its owner, artifact URLs included.
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice_id: Uuid,
    pub folio: String,
    pub serie: String,
    pub fiscal_uuid: Uuid,
    pub fecha: DateTime<Utc>,
    pub rfc: String,
    pub razon_social: String,
    pub subtotal: Decimal,
    pub iva: Decimal,
    pub total: Decimal,
    pub forma_pago: String,
    pub metodo_pago: String,
    pub xml_url: String,
    pub pdf_url: String,
    pub status: String,
}

impl From<Invoice> for InvoiceResponse {
    fn from(i: Invoice) -> Self {
        Self {
            invoice_id: i.invoice_id,
            folio: i.folio,
            serie: i.serie,
            fiscal_uuid: i.fiscal_uuid,
            fecha: i.fecha,
            rfc: i.rfc,
            razon_social: i.razon_social,
            subtotal: i.subtotal,
            iva: i.iva,
            total: i.total,
            forma_pago: i.forma_pago,
            metodo_pago: i.metodo_pago,
            xml_url: i.xml_url,
            pdf_url: i.pdf_url,
            status: i.status,
        }
    }
}

/// Public verification payload: the full fiscal presentation of the
/// invoice plus download links, so anyone scanning the printed QR can
/// check the document and fetch both artifacts.
#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<VerifiedInvoice>,
}

#[derive(Debug, Serialize)]
pub struct VerifiedInvoice {
    pub folio: String,
    pub serie: String,
    pub fiscal_uuid: Uuid,
    pub fecha: DateTime<Utc>,
    pub rfc: String,
    pub razon_social: String,
    pub domicilio: String,
    pub codigo_postal: String,
    pub subtotal: Decimal,
    pub iva: Decimal,
    pub total: Decimal,
    pub xml_url: String,
    pub pdf_url: String,
    pub status: String,
}

impl From<Invoice> for VerifiedInvoice {
    fn from(i: Invoice) -> Self {
        Self {
            folio: i.folio,
            serie: i.serie,
            fiscal_uuid: i.fiscal_uuid,
            fecha: i.fecha,
            rfc: i.rfc,
            razon_social: i.razon_social,
            domicilio: i.domicilio,
            codigo_postal: i.codigo_postal,
            subtotal: i.subtotal,
            iva: i.iva,
            total: i.total,
            xml_url: i.xml_url,
            pdf_url: i.pdf_url,
            status: i.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn issued_invoice() -> Invoice {
        Invoice {
            invoice_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            subscription_id: None,
            folio: "000009".to_string(),
            serie: "A".to_string(),
            fiscal_uuid: Uuid::new_v4(),
            fecha: Utc::now(),
            rfc: "XAXX010101000".to_string(),
            razon_social: "PUBLICO EN GENERAL".to_string(),
            regimen_fiscal: "616".to_string(),
            uso_cfdi: "S01".to_string(),
            codigo_postal: "06600".to_string(),
            domicilio: "Calle 1 100, Centro, Cuauhtémoc, CDMX, CP 06600".to_string(),
            forma_pago: "04".to_string(),
            metodo_pago: "PUE".to_string(),
            subtotal: Decimal::new(8621, 2),
            iva: Decimal::new(1379, 2),
            total: Decimal::new(10000, 2),
            xml_url: "http://localhost:8080/invoices/download?name=invoices/000009.xml"
                .to_string(),
            pdf_url: "http://localhost:8080/invoices/download?name=invoices/000009.pdf"
                .to_string(),
            status: "issued".to_string(),
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn verified_invoice_carries_full_fiscal_presentation() {
        let invoice = issued_invoice();
        let verified = VerifiedInvoice::from(invoice.clone());

        assert_eq!(verified.domicilio, invoice.domicilio);
        assert_eq!(verified.codigo_postal, invoice.codigo_postal);
        assert_eq!(verified.subtotal, invoice.subtotal);
        assert_eq!(verified.iva, invoice.iva);
        assert_eq!(verified.total, invoice.total);
        assert_eq!(verified.xml_url, invoice.xml_url);
        assert_eq!(verified.pdf_url, invoice.pdf_url);
    }
}
