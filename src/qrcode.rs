use base64::Engine;
use image::{DynamicImage, ImageFormat, Luma};
use ::qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use thiserror::Error;

pub const QR_DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Error)]
pub enum QrRenderError {
    #[error("could not encode QR code: {0}")]
    Encode(#[from] ::qrcode::types::QrError),
    #[error("could not write QR image: {0}")]
    Image(#[from] image::ImageError),
}

/// Renders a pairing code as a PNG and returns it as a base64 data URL.
pub fn render_data_url(code: &str, size: u32) -> Result<String, QrRenderError> {
    let qr = QrCode::with_error_correction_level(code.as_bytes(), EcLevel::M)?;
    let pixels = qr
        .render::<Luma<u8>>()
        .min_dimensions(size, size)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(pixels).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(format!(
        "{QR_DATA_URL_PREFIX}{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}
