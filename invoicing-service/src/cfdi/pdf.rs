//! Printable invoice rendition. Single letter-size page with the Velion
//! header, receptor block, concept table, totals, fiscal stamp block and a
//! scannable verification QR drawn as vector rectangles.

use std::io::BufWriter;

use anyhow::anyhow;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Rect,
    Rgb,
};
use service_core::error::AppError;

use super::qr::{encode_qr, QrMatrix};
use super::InvoiceData;

const PAGE_W: f32 = 215.9;
const PAGE_H: f32 = 279.4;
const MARGIN: f32 = 18.0;

// Velion brand green, matching the web checkout.
const GREEN: (f32, f32, f32) = (0.086, 0.639, 0.290);
const BLACK: (f32, f32, f32) = (0.0, 0.0, 0.0);
const WHITE: (f32, f32, f32) = (1.0, 1.0, 1.0);
const GRAY: (f32, f32, f32) = (0.35, 0.35, 0.35);

const QR_SIZE_MM: f32 = 32.0;
const ADDRESS_MAX_CHARS: usize = 70;

pub fn render_invoice_pdf(data: &InvoiceData, verify_url: &str) -> Result<Vec<u8>, AppError> {
    data.validate()?;
    // Encode first so a QR failure aborts before any drawing happens.
    let qr = encode_qr(verify_url)?;

    let (doc, page, layer) = PdfDocument::new(
        format!("Factura {}-{}", data.serie, data.folio),
        Mm(PAGE_W),
        Mm(PAGE_H),
        "Layer 1",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| AppError::RenderError(anyhow!("font load failed: {}", e)))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| AppError::RenderError(anyhow!("font load failed: {}", e)))?;
    let layer = doc.get_page(page).get_layer(layer);

    draw_header(&layer, &bold, &regular, data);
    let mut y = draw_receptor(&layer, &bold, &regular, data, 228.0);
    y = draw_conceptos(&layer, &bold, &regular, data, y - 8.0);
    y = draw_totales(&layer, &bold, &regular, data, y - 6.0);
    draw_timbre(&layer, &bold, &regular, data, y - 10.0);
    draw_qr(&layer, &regular, &qr, verify_url);
    draw_footer(&layer, &regular);

    let mut bytes = Vec::new();
    doc.save(&mut BufWriter::new(&mut bytes))
        .map_err(|e| AppError::RenderError(anyhow!("PDF save failed: {}", e)))?;
    Ok(bytes)
}

fn draw_header(
    layer: &PdfLayerReference,
    bold: &IndirectFontRef,
    regular: &IndirectFontRef,
    data: &InvoiceData,
) {
    fill_rect(layer, 0.0, PAGE_H - 26.0, PAGE_W, PAGE_H, GREEN);
    set_fill(layer, WHITE);
    layer.use_text("VELION", 22.0, Mm(MARGIN), Mm(PAGE_H - 16.0), bold);
    layer.use_text(
        "FACTURA ELECTRÓNICA (CFDI 4.0)",
        9.0,
        Mm(MARGIN),
        Mm(PAGE_H - 22.5),
        regular,
    );
    layer.use_text(
        format!("Serie {}  Folio {}", data.serie, data.folio),
        11.0,
        Mm(PAGE_W - 70.0),
        Mm(PAGE_H - 14.0),
        bold,
    );
    layer.use_text(
        format!("Fecha: {}", data.fecha.format("%Y-%m-%d %H:%M UTC")),
        9.0,
        Mm(PAGE_W - 70.0),
        Mm(PAGE_H - 21.0),
        regular,
    );

    set_fill(layer, BLACK);
    layer.use_text(&data.emisor_nombre, 10.0, Mm(MARGIN), Mm(PAGE_H - 35.0), bold);
    layer.use_text(
        format!("RFC: {}   Régimen fiscal: {}", data.emisor_rfc, data.emisor_regimen),
        9.0,
        Mm(MARGIN),
        Mm(PAGE_H - 40.5),
        regular,
    );
}

fn draw_receptor(
    layer: &PdfLayerReference,
    bold: &IndirectFontRef,
    regular: &IndirectFontRef,
    data: &InvoiceData,
    top: f32,
) -> f32 {
    set_fill(layer, GREEN);
    layer.use_text("DATOS DEL CLIENTE", 11.0, Mm(MARGIN), Mm(top), bold);
    hline(layer, MARGIN, PAGE_W - MARGIN, top - 2.0, GREEN);

    set_fill(layer, BLACK);
    let mut y = top - 8.0;
    for line in [
        format!("Razón social: {}", data.receptor_nombre),
        format!("RFC: {}", data.receptor_rfc),
        format!(
            "Régimen fiscal: {}   Uso CFDI: {}",
            data.receptor_regimen, data.receptor_uso_cfdi
        ),
        format!(
            "Domicilio: {}",
            truncate_chars(&data.receptor_domicilio, ADDRESS_MAX_CHARS)
        ),
        format!("Código postal: {}", data.receptor_codigo_postal),
    ] {
        layer.use_text(line, 9.0, Mm(MARGIN), Mm(y), regular);
        y -= 5.5;
    }
    y
}

fn draw_conceptos(
    layer: &PdfLayerReference,
    bold: &IndirectFontRef,
    regular: &IndirectFontRef,
    data: &InvoiceData,
    top: f32,
) -> f32 {
    set_fill(layer, GREEN);
    layer.use_text("CONCEPTOS", 11.0, Mm(MARGIN), Mm(top), bold);

    let band_top = top - 4.0;
    fill_rect(layer, MARGIN, band_top - 7.0, PAGE_W - MARGIN, band_top, GREEN);
    set_fill(layer, WHITE);
    layer.use_text("Cant.", 9.0, Mm(MARGIN + 2.0), Mm(band_top - 5.0), bold);
    layer.use_text("Descripción", 9.0, Mm(MARGIN + 18.0), Mm(band_top - 5.0), bold);
    layer.use_text("P. Unitario", 9.0, Mm(PAGE_W - 80.0), Mm(band_top - 5.0), bold);
    layer.use_text("Importe", 9.0, Mm(PAGE_W - 45.0), Mm(band_top - 5.0), bold);

    set_fill(layer, BLACK);
    let row_y = band_top - 13.0;
    layer.use_text("1", 9.0, Mm(MARGIN + 2.0), Mm(row_y), regular);
    layer.use_text(&data.concepto_descripcion, 9.0, Mm(MARGIN + 18.0), Mm(row_y), regular);
    layer.use_text(
        format!("${:.2}", data.subtotal),
        9.0,
        Mm(PAGE_W - 80.0),
        Mm(row_y),
        regular,
    );
    layer.use_text(
        format!("${:.2}", data.subtotal),
        9.0,
        Mm(PAGE_W - 45.0),
        Mm(row_y),
        regular,
    );
    set_fill(layer, GRAY);
    layer.use_text(
        format!("Clave de producto/servicio SAT: {}", super::CLAVE_PROD_SERV),
        7.0,
        Mm(MARGIN + 18.0),
        Mm(row_y - 4.5),
        regular,
    );
    hline(layer, MARGIN, PAGE_W - MARGIN, row_y - 8.0, GRAY);
    row_y - 8.0
}

fn draw_totales(
    layer: &PdfLayerReference,
    bold: &IndirectFontRef,
    regular: &IndirectFontRef,
    data: &InvoiceData,
    top: f32,
) -> f32 {
    let label_x = PAGE_W - 80.0;
    let value_x = PAGE_W - 45.0;
    let mut y = top;
    set_fill(layer, BLACK);
    layer.use_text("Subtotal:", 9.0, Mm(label_x), Mm(y), regular);
    layer.use_text(format!("${:.2}", data.subtotal), 9.0, Mm(value_x), Mm(y), regular);
    y -= 5.5;
    layer.use_text("IVA (16%):", 9.0, Mm(label_x), Mm(y), regular);
    layer.use_text(format!("${:.2}", data.iva), 9.0, Mm(value_x), Mm(y), regular);
    y -= 6.5;
    set_fill(layer, GREEN);
    layer.use_text("TOTAL:", 11.0, Mm(label_x), Mm(y), bold);
    layer.use_text(format!("${:.2} MXN", data.total), 11.0, Mm(value_x), Mm(y), bold);
    y -= 4.0;
    y
}

fn draw_timbre(
    layer: &PdfLayerReference,
    bold: &IndirectFontRef,
    regular: &IndirectFontRef,
    data: &InvoiceData,
    top: f32,
) {
    set_fill(layer, GREEN);
    layer.use_text("TIMBRE FISCAL DIGITAL", 11.0, Mm(MARGIN), Mm(top), bold);
    hline(layer, MARGIN, PAGE_W - MARGIN, top - 2.0, GREEN);

    set_fill(layer, BLACK);
    let mut y = top - 8.0;
    for line in [
        format!("Folio fiscal (UUID): {}", data.fiscal_uuid),
        format!("Fecha de timbrado: {}", data.fecha.format("%Y-%m-%dT%H:%M:%S")),
        format!("RFC proveedor de certificación: {}", super::PAC_RFC),
        format!("No. certificado SAT: {}", super::SAT_CERT_NO),
        format!(
            "Forma de pago: {}   Método de pago: {}",
            data.forma_pago, data.metodo_pago
        ),
    ] {
        layer.use_text(line, 8.0, Mm(MARGIN), Mm(y), regular);
        y -= 4.5;
    }
}

fn draw_qr(layer: &PdfLayerReference, regular: &IndirectFontRef, qr: &QrMatrix, verify_url: &str) {
    let x0 = PAGE_W - MARGIN - QR_SIZE_MM;
    let y0 = 22.0;
    let module = QR_SIZE_MM / qr.width as f32;

    fill_rect(layer, x0, y0, x0 + QR_SIZE_MM, y0 + QR_SIZE_MM, WHITE);
    set_fill(layer, BLACK);
    for row in 0..qr.width {
        for col in 0..qr.width {
            if qr.is_dark(col, row) {
                // PDF y axis grows upward; QR rows grow downward.
                let mx = x0 + col as f32 * module;
                let my = y0 + QR_SIZE_MM - (row as f32 + 1.0) * module;
                fill_rect(layer, mx, my, mx + module, my + module, BLACK);
            }
        }
    }

    set_fill(layer, GRAY);
    layer.use_text("Verifique esta factura en:", 7.0, Mm(MARGIN), Mm(y0 + 10.0), regular);
    layer.use_text(verify_url, 7.0, Mm(MARGIN), Mm(y0 + 6.0), regular);
}

fn draw_footer(layer: &PdfLayerReference, regular: &IndirectFontRef) {
    set_fill(layer, GRAY);
    layer.use_text(
        "Documento de demostración. Este CFDI es una simulación y carece de validez fiscal.",
        7.0,
        Mm(MARGIN),
        Mm(12.0),
        regular,
    );
}

fn set_fill(layer: &PdfLayerReference, (r, g, b): (f32, f32, f32)) {
    layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
}

fn fill_rect(
    layer: &PdfLayerReference,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    color: (f32, f32, f32),
) {
    set_fill(layer, color);
    let rect = Rect::new(Mm(x1), Mm(y1), Mm(x2), Mm(y2)).with_mode(PaintMode::Fill);
    layer.add_rect(rect);
}

fn hline(layer: &PdfLayerReference, x1: f32, x2: f32, y: f32, color: (f32, f32, f32)) {
    layer.set_outline_color(Color::Rgb(Rgb::new(color.0, color.1, color.2, None)));
    layer.set_outline_thickness(0.6);
    let line = Line {
        points: vec![
            (Point::new(Mm(x1), Mm(y)), false),
            (Point::new(Mm(x2), Mm(y)), false),
        ],
        is_closed: false,
    };
    layer.add_line(line);
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn sample() -> InvoiceData {
        InvoiceData {
            folio: "000001".to_string(),
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
            receptor_domicilio: "Calle 1 100, Centro, Cuauhtémoc, CDMX, CP 06600".to_string(),
            concepto_descripcion: "Suscripción mensual Velion Premium".to_string(),
            forma_pago: "04".to_string(),
            metodo_pago: "PUE".to_string(),
            subtotal: Decimal::new(8621, 2),
            iva: Decimal::new(1379, 2),
            total: Decimal::new(10000, 2),
        }
    }

    #[test]
    fn renders_a_pdf_document() {
        let bytes =
            render_invoice_pdf(&sample(), "https://velion.mx/invoices/verify/a1b2c3d4").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 1000);
    }

    #[test]
    fn long_address_is_truncated() {
        let long = "x".repeat(200);
        let t = truncate_chars(&long, 70);
        assert_eq!(t.chars().count(), 70);
        assert!(t.ends_with("..."));
    }

    #[test]
    fn invalid_data_aborts_render() {
        let mut data = sample();
        data.receptor_rfc = "nope".to_string();
        assert!(render_invoice_pdf(&data, "https://velion.mx/v/x").is_err());
    }
}
