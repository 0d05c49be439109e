//! Terminal rendering for login QR codes.

use qrcode::{QrCode, render::unicode};

use crate::error::{Error, Result};

/// Render `data` as a compact QR code made of Unicode half blocks.
pub fn render_terminal(data: &str) -> Result<String> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| Error::message(format!("failed to encode QR code: {e}")))?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}
