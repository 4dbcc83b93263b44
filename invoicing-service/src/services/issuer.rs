//! Invoice issuance orchestration: guard checks, folio allocation, CFDI
//! rendering, artifact upload and persistence.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::cfdi::amounts::Amounts;
use crate::cfdi::pdf::render_invoice_pdf;
use crate::cfdi::qr::build_verify_url;
use crate::cfdi::xml::encode_cfdi;
use crate::cfdi::{
    self, InvoiceData, EMISOR_NOMBRE, EMISOR_REGIMEN, EMISOR_RFC, METODO_PAGO_PUE, SERIE,
};
use crate::dtos::FiscalDataDto;
use crate::models::{FiscalProfile, Invoice, InvoiceStatus, Subscription, SubscriptionStatus};
use crate::services::database::Database;
use crate::services::metrics::{ARTIFACTS_STORED_TOTAL, INVOICES_ISSUED_TOTAL, RENDER_DURATION};
use crate::services::storage::Storage;

#[derive(Clone)]
pub struct InvoiceIssuer {
    db: Database,
    storage: Arc<dyn Storage>,
    base_url: String,
}

impl InvoiceIssuer {
    pub fn new(db: Database, storage: Arc<dyn Storage>, base_url: String) -> Self {
        Self {
            db,
            storage,
            base_url,
        }
    }

    /// Issue the CFDI for a paid subscription. Fails with a conflict if one
    /// was already issued, and leaves no invoice row behind when rendering
    /// or upload fails partway.
    #[instrument(skip(self, fiscal), fields(invoice_number = %invoice_number))]
    pub async fn issue_for_subscription(
        &self,
        user_id: Uuid,
        invoice_number: &str,
        fiscal: &FiscalDataDto,
    ) -> Result<Invoice, AppError> {
        fiscal.validate()?;
        let rfc = fiscal.rfc.trim().to_uppercase();
        cfdi::validate_rfc(&rfc)?;

        let subscription = self
            .db
            .get_subscription_by_invoice_number(invoice_number)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!("No subscription found for that invoice number"))
            })?;

        ensure_issuable(&subscription, user_id)?;

        let amounts = if subscription.price_includes_tax {
            Amounts::from_total(subscription.plan_price)?
        } else {
            Amounts::from_subtotal(subscription.plan_price)?
        };

        let folio = self.db.next_folio().await?;
        let fiscal_uuid = Uuid::new_v4();
        let fecha = Utc::now();

        let domicilio = cfdi::build_domicilio(
            &fiscal.calle,
            &fiscal.numero_exterior,
            fiscal.numero_interior.as_deref(),
            &fiscal.colonia,
            &fiscal.municipio,
            &fiscal.estado,
            &fiscal.codigo_postal,
        );
        let forma_pago = cfdi::forma_pago_sat(subscription.payment_method.as_deref());

        let data = InvoiceData {
            folio: folio.clone(),
            serie: SERIE.to_string(),
            fiscal_uuid,
            fecha,
            emisor_rfc: EMISOR_RFC.to_string(),
            emisor_nombre: EMISOR_NOMBRE.to_string(),
            emisor_regimen: EMISOR_REGIMEN.to_string(),
            receptor_rfc: rfc,
            receptor_nombre: fiscal.razon_social.clone(),
            receptor_regimen: fiscal.regimen_fiscal.clone(),
            receptor_uso_cfdi: fiscal.uso_cfdi.clone(),
            receptor_codigo_postal: fiscal.codigo_postal.clone(),
            receptor_domicilio: domicilio,
            concepto_descripcion: format!("Suscripción mensual Velion {}", subscription.plan_name),
            forma_pago: forma_pago.to_string(),
            metodo_pago: METODO_PAGO_PUE.to_string(),
            subtotal: amounts.subtotal,
            iva: amounts.iva,
            total: amounts.total,
        };

        // Render both artifacts before touching storage so a failure can't
        // leave a half-issued invoice.
        let verify_url = build_verify_url(&self.base_url, &fiscal_uuid);
        let xml_timer = RENDER_DURATION.with_label_values(&["xml"]).start_timer();
        let xml = encode_cfdi(&data)?;
        xml_timer.observe_duration();
        let pdf_timer = RENDER_DURATION.with_label_values(&["pdf"]).start_timer();
        let pdf = render_invoice_pdf(&data, &verify_url)?;
        pdf_timer.observe_duration();

        let xml_key = format!("invoices/{}.xml", folio);
        let pdf_key = format!("invoices/{}.pdf", folio);
        let xml_url = self
            .storage
            .put(&xml_key, xml.into_bytes(), "application/xml")
            .await?;
        ARTIFACTS_STORED_TOTAL.with_label_values(&["xml"]).inc();
        let pdf_url = self.storage.put(&pdf_key, pdf, "application/pdf").await?;
        ARTIFACTS_STORED_TOTAL.with_label_values(&["pdf"]).inc();

        if let Err(e) = self
            .db
            .upsert_fiscal_profile(&profile_from_dto(user_id, fiscal))
            .await
        {
            // Profile storage is convenience, not part of the fiscal record.
            warn!(error = %e, "Failed to save fiscal profile, continuing");
        }

        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            user_id,
            subscription_id: Some(subscription.subscription_id),
            folio,
            serie: data.serie.clone(),
            fiscal_uuid,
            fecha,
            rfc: data.receptor_rfc.clone(),
            razon_social: data.receptor_nombre.clone(),
            regimen_fiscal: data.receptor_regimen.clone(),
            uso_cfdi: data.receptor_uso_cfdi.clone(),
            codigo_postal: data.receptor_codigo_postal.clone(),
            domicilio: data.receptor_domicilio.clone(),
            forma_pago: data.forma_pago.clone(),
            metodo_pago: data.metodo_pago.clone(),
            subtotal: amounts.subtotal,
            iva: amounts.iva,
            total: amounts.total,
            xml_url,
            pdf_url,
            status: InvoiceStatus::Issued.as_str().to_string(),
            created_utc: fecha,
        };

        let invoice = self.db.create_invoice(&invoice).await?;
        self.db
            .mark_subscription_invoiced(subscription.subscription_id)
            .await?;

        INVOICES_ISSUED_TOTAL
            .with_label_values(&[invoice.forma_pago.as_str()])
            .inc();
        info!(
            folio = %invoice.folio,
            fiscal_uuid = %invoice.fiscal_uuid,
            total = %invoice.total,
            "Invoice issued"
        );

        Ok(invoice)
    }
}

/// Guard checks run before any folio is minted. The `invoice_issued` latch
/// makes a repeat request fail here; a concurrent race past it is caught by
/// the unique `subscription_id` constraint in `create_invoice`, so a second
/// row can never land.
fn ensure_issuable(subscription: &Subscription, user_id: Uuid) -> Result<(), AppError> {
    if subscription.user_id != user_id {
        return Err(AppError::Forbidden(anyhow!(
            "Subscription belongs to a different account"
        )));
    }
    if subscription.invoice_issued {
        return Err(AppError::AlreadyInvoiced(anyhow!(
            "An invoice was already issued for this subscription"
        )));
    }
    if subscription.status == SubscriptionStatus::Pending.as_str() {
        return Err(AppError::PaymentPending(anyhow!(
            "Payment has not been confirmed for this subscription"
        )));
    }
    Ok(())
}

fn profile_from_dto(user_id: Uuid, fiscal: &FiscalDataDto) -> FiscalProfile {
    FiscalProfile {
        user_id,
        rfc: fiscal.rfc.trim().to_uppercase(),
        razon_social: fiscal.razon_social.clone(),
        regimen_fiscal: fiscal.regimen_fiscal.clone(),
        uso_cfdi: fiscal.uso_cfdi.clone(),
        codigo_postal: fiscal.codigo_postal.clone(),
        calle: fiscal.calle.clone(),
        numero_exterior: fiscal.numero_exterior.clone(),
        numero_interior: fiscal.numero_interior.clone(),
        colonia: fiscal.colonia.clone(),
        municipio: fiscal.municipio.clone(),
        estado: fiscal.estado.clone(),
        pais: fiscal.pais.clone().unwrap_or_else(|| "México".to_string()),
        updated_utc: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn paid_subscription(user_id: Uuid) -> Subscription {
        Subscription {
            subscription_id: Uuid::new_v4(),
            user_id,
            invoice_number: "INV-2026-0001".to_string(),
            plan_name: "Premium".to_string(),
            plan_price: Decimal::new(14900, 2),
            price_includes_tax: true,
            payment_method: Some("card".to_string()),
            payment_reference: Some("ch_123".to_string()),
            status: SubscriptionStatus::Active.as_str().to_string(),
            invoice_issued: false,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn paid_uninvoiced_subscription_is_issuable() {
        let user_id = Uuid::new_v4();
        assert!(ensure_issuable(&paid_subscription(user_id), user_id).is_ok());
    }

    #[test]
    fn second_issuance_attempt_is_rejected() {
        let user_id = Uuid::new_v4();
        let mut subscription = paid_subscription(user_id);
        subscription.invoice_issued = true;

        let err = ensure_issuable(&subscription, user_id).unwrap_err();
        assert!(matches!(err, AppError::AlreadyInvoiced(_)));
    }

    #[test]
    fn pending_payment_is_rejected() {
        let user_id = Uuid::new_v4();
        let mut subscription = paid_subscription(user_id);
        subscription.status = SubscriptionStatus::Pending.as_str().to_string();

        let err = ensure_issuable(&subscription, user_id).unwrap_err();
        assert!(matches!(err, AppError::PaymentPending(_)));
    }

    #[test]
    fn foreign_subscription_is_rejected() {
        let subscription = paid_subscription(Uuid::new_v4());

        let err = ensure_issuable(&subscription, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
