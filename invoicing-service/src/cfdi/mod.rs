//! CFDI 4.0 document assembly: amounts, folio format, XML body, QR
//! verification link and the printable PDF rendition.

pub mod amounts;
pub mod folio;
pub mod pdf;
pub mod qr;
pub mod xml;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// Issuer identity stamped on every comprobante.
pub const EMISOR_RFC: &str = "VEL010101AAA";
pub const EMISOR_NOMBRE: &str = "VELION DIGITAL SA DE CV";
pub const EMISOR_REGIMEN: &str = "601";
pub const LUGAR_EXPEDICION: &str = "06600";

/// Certification provider and SAT certificate used in the simulated stamp.
pub const PAC_RFC: &str = "SPR190613I52";
pub const SAT_CERT_NO: &str = "00001000000504465028";

/// SAT product/service key for software subscriptions.
pub const CLAVE_PROD_SERV: &str = "81161701";
pub const SERIE: &str = "A";
pub const METODO_PAGO_PUE: &str = "PUE";

/// Everything needed to encode the XML and render the PDF for one invoice.
/// Built once at issuance time; both renditions read the same snapshot so
/// they can never disagree on amounts or identifiers.
#[derive(Debug, Clone)]
pub struct InvoiceData {
    pub folio: String,
    pub serie: String,
    pub fiscal_uuid: Uuid,
    pub fecha: DateTime<Utc>,
    pub emisor_rfc: String,
    pub emisor_nombre: String,
    pub emisor_regimen: String,
    pub receptor_rfc: String,
    pub receptor_nombre: String,
    pub receptor_regimen: String,
    pub receptor_uso_cfdi: String,
    pub receptor_codigo_postal: String,
    pub receptor_domicilio: String,
    pub concepto_descripcion: String,
    pub forma_pago: String,
    pub metodo_pago: String,
    pub subtotal: Decimal,
    pub iva: Decimal,
    pub total: Decimal,
}

impl InvoiceData {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_rfc(&self.receptor_rfc)?;
        if self.receptor_nombre.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow!(
                "Receptor name must not be empty"
            )));
        }
        if self.folio.is_empty() {
            return Err(AppError::BadRequest(anyhow!("Folio must not be empty")));
        }
        if self.receptor_codigo_postal.len() != 5
            || !self
                .receptor_codigo_postal
                .chars()
                .all(|c| c.is_ascii_digit())
        {
            return Err(AppError::BadRequest(anyhow!(
                "Postal code must be 5 digits"
            )));
        }
        if self.subtotal <= Decimal::ZERO
            || self.total <= Decimal::ZERO
            || self.iva < Decimal::ZERO
        {
            return Err(AppError::BadRequest(anyhow!(
                "Invoice amounts must be positive"
            )));
        }
        Ok(())
    }
}

/// Maps an internal payment method tag to its SAT forma de pago code.
/// Unknown or absent methods fall back to "99" (por definir).
pub fn forma_pago_sat(payment_method: Option<&str>) -> &'static str {
    match payment_method {
        Some("card") => "04",
        Some("oxxo") => "01",
        Some("spei") => "03",
        _ => "99",
    }
}

/// Assembles the single-line fiscal address printed on the PDF.
#[allow(clippy::too_many_arguments)]
pub fn build_domicilio(
    calle: &str,
    numero_exterior: &str,
    numero_interior: Option<&str>,
    colonia: &str,
    municipio: &str,
    estado: &str,
    codigo_postal: &str,
) -> String {
    let interior = match numero_interior {
        Some(int) if !int.trim().is_empty() => format!(" Int. {}", int),
        _ => String::new(),
    };
    format!(
        "{} {}{}, {}, {}, {}, CP {}",
        calle, numero_exterior, interior, colonia, municipio, estado, codigo_postal
    )
}

/// RFC shape check: 12 characters for personas morales, 13 for físicas,
/// restricted to the SAT alphabet.
pub fn validate_rfc(rfc: &str) -> Result<(), AppError> {
    if rfc.chars().count() < 12 || rfc.chars().count() > 13 {
        return Err(AppError::BadRequest(anyhow!(
            "RFC must be 12 or 13 characters, got {}",
            rfc.chars().count()
        )));
    }
    if !rfc
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == 'Ñ' || c == '&')
    {
        return Err(AppError::BadRequest(anyhow!(
            "RFC contains invalid characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forma_pago_maps_known_methods() {
        assert_eq!(forma_pago_sat(Some("card")), "04");
        assert_eq!(forma_pago_sat(Some("oxxo")), "01");
        assert_eq!(forma_pago_sat(Some("spei")), "03");
    }

    #[test]
    fn forma_pago_defaults_to_por_definir() {
        assert_eq!(forma_pago_sat(Some("paypal")), "99");
        assert_eq!(forma_pago_sat(None), "99");
    }

    #[test]
    fn domicilio_includes_interior_when_present() {
        let d = build_domicilio(
            "Av. Reforma",
            "100",
            Some("4B"),
            "Juárez",
            "Cuauhtémoc",
            "CDMX",
            "06600",
        );
        assert_eq!(
            d,
            "Av. Reforma 100 Int. 4B, Juárez, Cuauhtémoc, CDMX, CP 06600"
        );
    }

    #[test]
    fn domicilio_skips_blank_interior() {
        let d = build_domicilio(
            "Av. Reforma",
            "100",
            Some("  "),
            "Juárez",
            "Cuauhtémoc",
            "CDMX",
            "06600",
        );
        assert_eq!(d, "Av. Reforma 100, Juárez, Cuauhtémoc, CDMX, CP 06600");
    }

    #[test]
    fn rfc_accepts_moral_and_fisica() {
        assert!(validate_rfc("XAXX010101000").is_ok());
        assert!(validate_rfc("VEL010101AAA").is_ok());
        assert!(validate_rfc("Ñ&A010101AB1").is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_amounts() {
        let base = InvoiceData {
            folio: "000001".to_string(),
            serie: SERIE.to_string(),
            fiscal_uuid: Uuid::new_v4(),
            fecha: Utc::now(),
            emisor_rfc: EMISOR_RFC.to_string(),
            emisor_nombre: EMISOR_NOMBRE.to_string(),
            emisor_regimen: EMISOR_REGIMEN.to_string(),
            receptor_rfc: "XAXX010101000".to_string(),
            receptor_nombre: "PUBLICO EN GENERAL".to_string(),
            receptor_regimen: "616".to_string(),
            receptor_uso_cfdi: "S01".to_string(),
            receptor_codigo_postal: "06600".to_string(),
            receptor_domicilio: "Calle 1, Centro, CDMX, CP 06600".to_string(),
            concepto_descripcion: "Suscripción mensual Velion Premium".to_string(),
            forma_pago: "04".to_string(),
            metodo_pago: METODO_PAGO_PUE.to_string(),
            subtotal: Decimal::new(8621, 2),
            iva: Decimal::new(1379, 2),
            total: Decimal::new(10000, 2),
        };
        assert!(base.validate().is_ok());

        let mut negative = base.clone();
        negative.subtotal = Decimal::new(-8621, 2);
        negative.total = Decimal::new(-10000, 2);
        assert!(negative.validate().is_err());

        let mut zero_total = base.clone();
        zero_total.total = Decimal::ZERO;
        assert!(zero_total.validate().is_err());

        let mut negative_iva = base;
        negative_iva.iva = Decimal::new(-1, 2);
        assert!(negative_iva.validate().is_err());
    }

    #[test]
    fn rfc_rejects_bad_length_and_charset() {
        assert!(validate_rfc("SHORT").is_err());
        assert!(validate_rfc("xaxx010101000").is_err());
        assert!(validate_rfc("XAXX0101010001X").is_err());
    }
}
