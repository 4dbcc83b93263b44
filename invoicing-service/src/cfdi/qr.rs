//! Verification link and its QR module matrix. The matrix is rendered as
//! vector rectangles by the PDF layer, no raster image involved.

use anyhow::anyhow;
use qrcode::{EcLevel, QrCode};
use service_core::error::AppError;
use uuid::Uuid;

/// Public URL where anyone scanning the printed invoice can confirm it.
/// The UUID always serializes lowercase hyphenated.
pub fn build_verify_url(base_url: &str, fiscal_uuid: &Uuid) -> String {
    format!(
        "{}/invoices/verify/{}",
        base_url.trim_end_matches('/'),
        fiscal_uuid
    )
}

/// Square grid of dark/light modules, row-major.
#[derive(Debug, Clone)]
pub struct QrMatrix {
    pub width: usize,
    pub modules: Vec<bool>,
}

impl QrMatrix {
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.modules[y * self.width + x]
    }
}

pub fn encode_qr(payload: &str) -> Result<QrMatrix, AppError> {
    let code = QrCode::with_error_correction_level(payload, EcLevel::M)
        .map_err(|e| AppError::RenderError(anyhow!("QR encoding failed: {}", e)))?;
    let width = code.width();
    let modules = code
        .to_colors()
        .into_iter()
        .map(|c| c == qrcode::Color::Dark)
        .collect();
    Ok(QrMatrix { width, modules })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_url_is_lowercase_and_trimmed() {
        let uuid = Uuid::parse_str("A1B2C3D4-0000-4000-8000-000000000001").unwrap();
        let url = build_verify_url("https://velion.mx/", &uuid);
        assert_eq!(
            url,
            "https://velion.mx/invoices/verify/a1b2c3d4-0000-4000-8000-000000000001"
        );
    }

    #[test]
    fn qr_matrix_is_square() {
        let m = encode_qr("https://velion.mx/invoices/verify/abc").unwrap();
        assert!(m.width >= 21);
        assert_eq!(m.modules.len(), m.width * m.width);
    }

    #[test]
    fn oversized_payload_fails() {
        let huge = "x".repeat(8000);
        assert!(encode_qr(&huge).is_err());
    }
}
