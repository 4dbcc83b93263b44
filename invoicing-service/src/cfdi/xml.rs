//! CFDI 4.0 XML encoder. Produces a deterministic, indented document with
//! one concept line, the 16% IVA traslado and a simulated
//! TimbreFiscalDigital complement.

use std::io::Cursor;

use anyhow::anyhow;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use service_core::error::AppError;

use super::{InvoiceData, CLAVE_PROD_SERV, PAC_RFC, SAT_CERT_NO};

const CFDI_NS: &str = "http://www.sat.gob.mx/cfd/4";
const TFD_NS: &str = "http://www.sat.gob.mx/TimbreFiscalDigital";
const FECHA_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn encode_cfdi(data: &InvoiceData) -> Result<String, AppError> {
    data.validate()?;

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    let fecha = data.fecha.format(FECHA_FORMAT).to_string();
    let subtotal = format!("{:.2}", data.subtotal);
    let iva = format!("{:.2}", data.iva);
    let total = format!("{:.2}", data.total);
    let uuid = data.fiscal_uuid.to_string();

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut comprobante = BytesStart::new("cfdi:Comprobante");
    comprobante.push_attribute(("xmlns:cfdi", CFDI_NS));
    comprobante.push_attribute(("Version", "4.0"));
    comprobante.push_attribute(("Serie", data.serie.as_str()));
    comprobante.push_attribute(("Folio", data.folio.as_str()));
    comprobante.push_attribute(("Fecha", fecha.as_str()));
    comprobante.push_attribute(("FormaPago", data.forma_pago.as_str()));
    comprobante.push_attribute(("SubTotal", subtotal.as_str()));
    comprobante.push_attribute(("Moneda", "MXN"));
    comprobante.push_attribute(("Total", total.as_str()));
    comprobante.push_attribute(("TipoDeComprobante", "I"));
    comprobante.push_attribute(("Exportacion", "01"));
    comprobante.push_attribute(("MetodoPago", data.metodo_pago.as_str()));
    comprobante.push_attribute(("LugarExpedicion", super::LUGAR_EXPEDICION));
    write(&mut writer, Event::Start(comprobante))?;

    let mut emisor = BytesStart::new("cfdi:Emisor");
    emisor.push_attribute(("Rfc", data.emisor_rfc.as_str()));
    emisor.push_attribute(("Nombre", data.emisor_nombre.as_str()));
    emisor.push_attribute(("RegimenFiscal", data.emisor_regimen.as_str()));
    write(&mut writer, Event::Empty(emisor))?;

    let mut receptor = BytesStart::new("cfdi:Receptor");
    receptor.push_attribute(("Rfc", data.receptor_rfc.as_str()));
    receptor.push_attribute(("Nombre", data.receptor_nombre.as_str()));
    receptor.push_attribute(("DomicilioFiscalReceptor", data.receptor_codigo_postal.as_str()));
    receptor.push_attribute(("RegimenFiscalReceptor", data.receptor_regimen.as_str()));
    receptor.push_attribute(("UsoCFDI", data.receptor_uso_cfdi.as_str()));
    write(&mut writer, Event::Empty(receptor))?;

    write(&mut writer, Event::Start(BytesStart::new("cfdi:Conceptos")))?;

    let mut concepto = BytesStart::new("cfdi:Concepto");
    concepto.push_attribute(("ClaveProdServ", CLAVE_PROD_SERV));
    concepto.push_attribute(("Cantidad", "1"));
    concepto.push_attribute(("ClaveUnidad", "E48"));
    concepto.push_attribute(("Descripcion", data.concepto_descripcion.as_str()));
    concepto.push_attribute(("ValorUnitario", subtotal.as_str()));
    concepto.push_attribute(("Importe", subtotal.as_str()));
    concepto.push_attribute(("ObjetoImp", "02"));
    write(&mut writer, Event::Start(concepto))?;

    write(&mut writer, Event::Start(BytesStart::new("cfdi:Impuestos")))?;
    write(&mut writer, Event::Start(BytesStart::new("cfdi:Traslados")))?;
    let mut traslado = BytesStart::new("cfdi:Traslado");
    traslado.push_attribute(("Base", subtotal.as_str()));
    traslado.push_attribute(("Impuesto", "002"));
    traslado.push_attribute(("TipoFactor", "Tasa"));
    traslado.push_attribute(("TasaOCuota", "0.160000"));
    traslado.push_attribute(("Importe", iva.as_str()));
    write(&mut writer, Event::Empty(traslado))?;
    write(&mut writer, Event::End(BytesEnd::new("cfdi:Traslados")))?;
    write(&mut writer, Event::End(BytesEnd::new("cfdi:Impuestos")))?;

    write(&mut writer, Event::End(BytesEnd::new("cfdi:Concepto")))?;
    write(&mut writer, Event::End(BytesEnd::new("cfdi:Conceptos")))?;

    let mut impuestos = BytesStart::new("cfdi:Impuestos");
    impuestos.push_attribute(("TotalImpuestosTrasladados", iva.as_str()));
    write(&mut writer, Event::Start(impuestos))?;
    write(&mut writer, Event::Start(BytesStart::new("cfdi:Traslados")))?;
    let mut traslado = BytesStart::new("cfdi:Traslado");
    traslado.push_attribute(("Base", subtotal.as_str()));
    traslado.push_attribute(("Impuesto", "002"));
    traslado.push_attribute(("TipoFactor", "Tasa"));
    traslado.push_attribute(("TasaOCuota", "0.160000"));
    traslado.push_attribute(("Importe", iva.as_str()));
    write(&mut writer, Event::Empty(traslado))?;
    write(&mut writer, Event::End(BytesEnd::new("cfdi:Traslados")))?;
    write(&mut writer, Event::End(BytesEnd::new("cfdi:Impuestos")))?;

    write(&mut writer, Event::Start(BytesStart::new("cfdi:Complemento")))?;
    let mut timbre = BytesStart::new("tfd:TimbreFiscalDigital");
    timbre.push_attribute(("xmlns:tfd", TFD_NS));
    timbre.push_attribute(("Version", "1.1"));
    timbre.push_attribute(("UUID", uuid.as_str()));
    timbre.push_attribute(("FechaTimbrado", fecha.as_str()));
    timbre.push_attribute(("RfcProvCertif", PAC_RFC));
    timbre.push_attribute(("SelloCFD", "SIMULADO"));
    timbre.push_attribute(("NoCertificadoSAT", SAT_CERT_NO));
    timbre.push_attribute(("SelloSAT", "SIMULADO"));
    write(&mut writer, Event::Empty(timbre))?;
    write(&mut writer, Event::End(BytesEnd::new("cfdi:Complemento")))?;

    write(&mut writer, Event::End(BytesEnd::new("cfdi:Comprobante")))?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes)
        .map_err(|e| AppError::RenderError(anyhow!("CFDI XML is not valid UTF-8: {}", e)))
}

fn write(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    event: Event<'_>,
) -> Result<(), AppError> {
    writer
        .write_event(event)
        .map_err(|e| AppError::RenderError(anyhow!("CFDI XML write failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn sample() -> InvoiceData {
        InvoiceData {
            folio: "000042".to_string(),
            serie: "A".to_string(),
            fiscal_uuid: Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000001").unwrap(),
            fecha: Utc.with_ymd_and_hms(2026, 3, 15, 12, 30, 0).unwrap(),
            emisor_rfc: super::super::EMISOR_RFC.to_string(),
            emisor_nombre: super::super::EMISOR_NOMBRE.to_string(),
            emisor_regimen: super::super::EMISOR_REGIMEN.to_string(),
            receptor_rfc: "XAXX010101000".to_string(),
            receptor_nombre: "PUBLICO EN GENERAL".to_string(),
            receptor_regimen: "616".to_string(),
            receptor_uso_cfdi: "S01".to_string(),
            receptor_codigo_postal: "06600".to_string(),
            receptor_domicilio: "Calle 1, Centro, CDMX, CP 06600".to_string(),
            concepto_descripcion: "Suscripción mensual Velion Premium".to_string(),
            forma_pago: "04".to_string(),
            metodo_pago: "PUE".to_string(),
            subtotal: Decimal::new(8621, 2),
            iva: Decimal::new(1379, 2),
            total: Decimal::new(10000, 2),
        }
    }

    #[test]
    fn encodes_key_fields() {
        let xml = encode_cfdi(&sample()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("Rfc=\"XAXX010101000\""));
        assert!(xml.contains("Folio=\"000042\""));
        assert!(xml.contains("Total=\"100.00\""));
        assert!(xml.contains("SubTotal=\"86.21\""));
        assert!(xml.contains("TasaOCuota=\"0.160000\""));
        assert!(xml.contains("Fecha=\"2026-03-15T12:30:00\""));
        assert!(xml.contains("UUID=\"a1b2c3d4-0000-4000-8000-000000000001\""));
        assert!(xml.contains("RfcProvCertif=\"SPR190613I52\""));
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode_cfdi(&sample()).unwrap();
        let b = encode_cfdi(&sample()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn escapes_attribute_text() {
        let mut data = sample();
        data.receptor_nombre = "TORRES & VILLA \"SA\"".to_string();
        let xml = encode_cfdi(&data).unwrap();
        assert!(xml.contains("TORRES &amp; VILLA"));
        assert!(!xml.contains("TORRES & VILLA"));
    }

    #[test]
    fn rejects_negative_amounts() {
        let mut data = sample();
        data.subtotal = Decimal::new(-8621, 2);
        data.iva = Decimal::new(-1379, 2);
        data.total = Decimal::new(-10000, 2);
        assert!(encode_cfdi(&data).is_err());
    }

    #[test]
    fn rejects_invalid_receptor_rfc() {
        let mut data = sample();
        data.receptor_rfc = "bad".to_string();
        assert!(encode_cfdi(&data).is_err());
    }
}
