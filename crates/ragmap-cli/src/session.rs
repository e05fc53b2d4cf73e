//! Operator sessions: cookie id → auth state + one-shot flash message.
//!
//! Sessions live in process memory only; a restart signs everyone out.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use ragmap_identity::{AccessGate, SessionAuth};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "ragmap_session";
const SESSION_IDLE_LIMIT: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
    Info,
}

impl FlashKind {
    pub fn css_class(self) -> &'static str {
        match self {
            Self::Success => "flash success",
            Self::Error => "flash error",
            Self::Info => "flash info",
        }
    }
}

/// Message shown once on the next page render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub text: String,
}

impl Flash {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Info,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub auth: SessionAuth,
    pub flash: Option<Flash>,
    last_seen: Instant,
}

impl Session {
    fn new(gate: &AccessGate) -> Self {
        Self {
            auth: SessionAuth::for_gate(gate),
            flash: None,
            last_seen: Instant::now(),
        }
    }
}

pub struct SessionTable {
    gate: AccessGate,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionTable {
    pub fn new(gate: AccessGate) -> Self {
        Self {
            gate,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    /// Returns the session id for this request and whether it is new (so
    /// the caller must set the cookie). Unknown or expired ids are replaced
    /// with fresh ones. A new id is not stored until something is written
    /// to its session.
    pub fn resolve(&self, cookie_id: Option<&str>) -> (String, bool) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) < SESSION_IDLE_LIMIT);

        if let Some(id) = cookie_id {
            if let Some(session) = sessions.get_mut(id) {
                session.last_seen = now;
                return (id.to_string(), false);
            }
        }
        (Uuid::new_v4().simple().to_string(), true)
    }

    /// Runs `f` against the session, storing it first if needed.
    /// Keep `f` short: the whole table is locked while it runs.
    pub fn with<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(&self.gate));
        f(session)
    }

    /// Auth state of a stored session, or the gate's default for an
    /// unstored one.
    pub fn auth(&self, id: &str) -> SessionAuth {
        self.sessions
            .lock()
            .get(id)
            .map(|s| s.auth.clone())
            .unwrap_or_else(|| SessionAuth::for_gate(&self.gate))
    }

    pub fn set_flash(&self, id: &str, flash: Flash) {
        self.with(id, |s| s.flash = Some(flash));
    }

    pub fn take_flash(&self, id: &str) -> Option<Flash> {
        self.sessions.lock().get_mut(id).and_then(|s| s.flash.take())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Session id from a `Cookie` request header, if present.
pub fn session_id_from_cookie_header(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
    })
}

pub fn session_cookie(id: &str) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}
