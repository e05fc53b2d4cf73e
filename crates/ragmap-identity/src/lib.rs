//! Ragmap access gate.
//!
//! Decides whether an operator may use the mapping page:
//! - a service-account credential bundle authenticates us to the identity
//!   directory,
//! - the directory is asked whether an account with the submitted email exists,
//! - existence alone grants the session access.
//!
//! Known limitation
//! ----------------
//! No password or token supplied by the operator is checked. Anyone who knows
//! a registered email address passes the gate. The server logs this at
//! startup whenever the gate is enabled.

pub mod credentials;
pub mod directory;
pub mod gate;

pub use credentials::{normalize_private_key, ServiceAccountCredentials, DEFAULT_TOKEN_URI};
pub use directory::{GoogleIdentityDirectory, IdentityDirectory};
pub use gate::{AccessGate, SessionAuth};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid credential bundle: {0}")]
    Credentials(String),

    #[error("failed to read credential bundle `{path}`: {source}")]
    CredentialsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to sign service-account assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("identity request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}
