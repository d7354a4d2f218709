//! QR login payloads and their rendering as embeddable images.

use super::errors::{AuthError, AuthResult};
use super::models::Role;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use qrcode::{QrCode, render::svg};
use serde::{Deserialize, Serialize};

/// Minimum rendered edge length in pixels
const QR_MIN_DIMENSION: u32 = 240;

/// JSON document encoded into a login QR code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub username: String,
    pub role: Role,
    pub qr_token: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub password: Option<String>,
}

impl QrPayload {
    pub fn login(role: Role, username: &str, qr_token: &str) -> Self {
        Self {
            kind: format!("{role}_login"),
            username: username.to_string(),
            role,
            qr_token: qr_token.to_string(),
            password: None,
        }
    }

    /// Embed the plaintext password. Only used when explicitly configured.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Render as a `data:image/svg+xml;base64,...` URL
    pub fn to_data_url(&self) -> AuthResult<String> {
        let json = serde_json::to_vec(self).map_err(|e| AuthError::QrCode(e.to_string()))?;
        let code = QrCode::new(&json).map_err(|e| AuthError::QrCode(e.to_string()))?;

        let image = code
            .render::<svg::Color>()
            .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build();

        Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
    }
}
