//! Access gate and per-session authentication state.

use std::sync::Arc;

use crate::IdentityDirectory;

/// Existence-only gate: an email that the directory knows is let in.
///
/// A gate without a directory is disabled and admits every session.
#[derive(Clone, Default)]
pub struct AccessGate {
    directory: Option<Arc<dyn IdentityDirectory>>,
}

impl AccessGate {
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self {
            directory: Some(directory),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.directory.is_some()
    }

    /// Never fails: directory errors deny access and are logged.
    pub fn verify(&self, email: &str) -> bool {
        let Some(directory) = self.directory.as_ref() else {
            return true;
        };
        let email = email.trim();
        if email.is_empty() {
            return false;
        }

        match directory.account_exists(email) {
            Ok(true) => {
                tracing::info!(email, "access granted");
                true
            }
            Ok(false) => {
                tracing::warn!(email, "access denied: no such account");
                false
            }
            Err(e) => {
                tracing::warn!(email, error = %e, "access denied: identity lookup failed");
                false
            }
        }
    }
}

/// Binary authentication state for one operator session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionAuth {
    authenticated: bool,
    email: Option<String>,
}

impl SessionAuth {
    /// Fresh session state: authenticated only when the gate is disabled.
    pub fn for_gate(gate: &AccessGate) -> Self {
        Self {
            authenticated: !gate.is_enabled(),
            email: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns whether the session is now authenticated. A failed attempt
    /// leaves an already-authenticated session untouched.
    pub fn login(&mut self, gate: &AccessGate, email: &str) -> bool {
        if gate.verify(email) {
            self.authenticated = true;
            self.email = Some(email.trim().to_string());
        }
        self.authenticated
    }

    pub fn logout(&mut self, gate: &AccessGate) {
        *self = Self::for_gate(gate);
    }
}
