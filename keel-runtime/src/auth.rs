//! Registry authorization encoding
//!
//! The runtime expects registry credentials as the `X-Registry-Auth` value:
//! URL-safe base64 (with padding) of a JSON object holding the username and
//! password.

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

#[derive(Debug, Serialize, Deserialize)]
struct AuthConfig {
    username: String,
    password: String,
}

/// Encodes registry credentials for a pull or create request
pub fn encode(username: &str, password: &str) -> String {
    let payload = serde_json::json!({
        "username": username,
        "password": password,
    });
    general_purpose::URL_SAFE.encode(payload.to_string())
}

/// Decodes an encoded registry auth value into `(username, password)`
pub fn decode(encoded: &str) -> Result<(String, String)> {
    let raw = general_purpose::URL_SAFE
        .decode(encoded.trim())
        .map_err(|e| RuntimeError::InvalidRequest(format!("invalid registry auth: {}", e)))?;
    let config: AuthConfig = serde_json::from_slice(&raw)?;
    Ok((config.username, config.password))
}
