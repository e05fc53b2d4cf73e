//! Request-independent application core.
//!
//! Every action takes the caller's session id and, for form posts, the
//! decoded form fields. Actions never fail: their outcome is written to the
//! session's flash and the caller redirects back to `/`. All methods block
//! on the store and the identity directory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ragmap_identity::AccessGate;
use ragmap_storage::{
    MappingError, MappingSnapshot, MappingStore, MutationDispatcher, SnapshotCache, TenantId,
};

use crate::page::{self, Viewer};
use crate::session::{Flash, SessionTable};

pub type Form = HashMap<String, String>;

pub fn parse_form(body: &[u8]) -> Form {
    url::form_urlencoded::parse(body).into_owned().collect()
}

fn field<'f>(form: &'f Form, name: &str) -> &'f str {
    form.get(name).map(String::as_str).unwrap_or("")
}

fn is_checked(form: &Form, name: &str) -> bool {
    matches!(field(form, name), "yes" | "on" | "true")
}

pub struct App {
    store: Arc<dyn MappingStore>,
    cache: SnapshotCache,
    sessions: SessionTable,
}

impl App {
    pub fn new(store: Arc<dyn MappingStore>, cache_ttl: Duration, gate: AccessGate) -> Self {
        Self {
            store,
            cache: SnapshotCache::new(cache_ttl),
            sessions: SessionTable::new(gate),
        }
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    fn gate(&self) -> &AccessGate {
        self.sessions.gate()
    }

    fn snapshot(&self) -> Result<Arc<MappingSnapshot>, MappingError> {
        self.cache.get_or_refresh(self.store.as_ref())
    }

    fn dispatcher(&self) -> MutationDispatcher<'_> {
        MutationDispatcher::new(self.store.as_ref(), &self.cache)
    }

    /// `GET /`: the mapping page, or the login form for signed-out sessions.
    pub fn index(&self, sid: &str) -> String {
        let auth = self.sessions.auth(sid);
        let flash = self.sessions.take_flash(sid);
        if !auth.is_authenticated() {
            return page::render_login(flash.as_ref());
        }

        let viewer = Viewer {
            gate_enabled: self.gate().is_enabled(),
            email: auth.email(),
        };
        match self.snapshot() {
            Ok(snapshot) => page::render_index(&viewer, flash.as_ref(), Ok(&snapshot)),
            Err(e) => {
                tracing::warn!(error = %e, "mapping load failed");
                page::render_index(&viewer, flash.as_ref(), Err(e.to_string()))
            }
        }
    }

    pub fn login(&self, sid: &str, form: &Form) {
        let email = field(form, "email");
        let mut auth = self.sessions.auth(sid);
        // The directory call happens outside the session lock.
        let granted = auth.login(self.gate(), email);
        self.sessions.with(sid, |s| {
            s.auth = auth;
            if !granted {
                s.flash = Some(Flash::error("Access denied: unknown operator email."));
            }
        });
    }

    pub fn logout(&self, sid: &str) {
        let gate = self.gate().clone();
        self.sessions.with(sid, |s| {
            s.auth.logout(&gate);
            s.flash = Some(Flash::info("Signed out."));
        });
    }

    /// Flashes a rejection and returns false for signed-out sessions.
    fn authorized(&self, sid: &str) -> bool {
        if self.sessions.auth(sid).is_authenticated() {
            return true;
        }
        tracing::warn!("rejected action from signed-out session");
        self.sessions
            .set_flash(sid, Flash::error("Sign in before changing mappings."));
        false
    }

    fn report(&self, sid: &str, outcome: Result<(), MappingError>, success: &str) {
        let flash = match outcome {
            Ok(()) => Flash::success(success),
            Err(e) => {
                tracing::debug!(kind = e.kind(), "action rejected");
                Flash::error(e.to_string())
            }
        };
        self.sessions.set_flash(sid, flash);
    }

    pub fn create(&self, sid: &str, form: &Form) {
        if !self.authorized(sid) {
            return;
        }
        let (contact, source) = (field(form, "contact"), field(form, "source"));
        // Input errors are reported before any store read.
        let outcome = MutationDispatcher::validate_create(contact, source)
            .and_then(|()| self.snapshot())
            .and_then(|snapshot| {
                self.dispatcher()
                    .create(contact, source, &snapshot.catalog)
                    .map(|_| ())
            });
        self.report(sid, outcome, "Added!");
    }

    pub fn update(&self, sid: &str, form: &Form) {
        if !self.authorized(sid) {
            return;
        }
        let id = TenantId::new(field(form, "id"));
        let source = field(form, "source");
        let outcome = MutationDispatcher::validate_update(&id, source)
            .and_then(|()| self.snapshot())
            .and_then(|snapshot| self.dispatcher().update(&id, source, &snapshot.catalog));
        self.report(sid, outcome, "Updated!");
    }

    pub fn delete(&self, sid: &str, form: &Form) {
        if !self.authorized(sid) {
            return;
        }
        let id = TenantId::new(field(form, "id"));
        let outcome = self.dispatcher().delete(&id, is_checked(form, "confirm"));
        self.report(sid, outcome, "Deleted!");
    }

    /// Drops the cached snapshot on operator request.
    pub fn refresh(&self, sid: &str) {
        if !self.authorized(sid) {
            return;
        }
        self.cache.invalidate();
        tracing::info!("snapshot cache cleared by operator");
        self.sessions.set_flash(sid, Flash::info("Reloaded from the store."));
    }
}
