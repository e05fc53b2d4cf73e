//! Service-account credential bundle.
//!
//! Secrets stores commonly hold the PEM private key on one line with `\n`
//! escapes (backslash + `n`). Those are turned back into real newlines
//! before the key is parsed.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::IdentityError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountCredentials {
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountCredentials {
    pub fn from_json(text: &str) -> Result<Self, IdentityError> {
        let parsed: Self = serde_json::from_str(text)
            .map_err(|e| IdentityError::Credentials(format!("invalid JSON: {e}")))?;
        parsed.normalized()
    }

    pub fn from_json_file(path: &Path) -> Result<Self, IdentityError> {
        let text = std::fs::read_to_string(path).map_err(|source| IdentityError::CredentialsFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Normalizes the private key and checks required fields. Bundles that
    /// arrive through other deserializers (e.g. a TOML secrets table) must
    /// pass through here too.
    pub fn normalized(mut self) -> Result<Self, IdentityError> {
        self.private_key = normalize_private_key(&self.private_key);

        for (field, value) in [
            ("project_id", &self.project_id),
            ("client_email", &self.client_email),
            ("token_uri", &self.token_uri),
        ] {
            if value.trim().is_empty() {
                return Err(IdentityError::Credentials(format!("`{field}` is empty")));
            }
        }
        if !self.private_key.contains("-----BEGIN") {
            return Err(IdentityError::Credentials(
                "`private_key` is not a PEM block".to_string(),
            ));
        }
        if let Some(kind) = self.account_type.as_deref() {
            if kind != "service_account" {
                tracing::warn!(kind, "credential bundle type is not `service_account`");
            }
        }
        Ok(self)
    }
}

/// Replaces literal `\n` escape sequences with newlines.
pub fn normalize_private_key(raw: &str) -> String {
    raw.replace("\\n", "\n")
}
