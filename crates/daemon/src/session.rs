//! Session-scoped view preference storage.
//!
//! Sort and filter choices are sticky per browser session. The session is
//! identified by a random id carried in a cookie; the preferences live
//! only in memory.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use access::view::ViewPreferences;
use axum::http::{header, HeaderMap};
use dashmap::DashMap;
use uuid::Uuid;

/// Opaque session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Extract the session id from the `Cookie` headers, if present and valid.
pub fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// `Set-Cookie` value for a session id.
pub fn session_cookie(cookie_name: &str, id: &SessionId) -> String {
    format!("{cookie_name}={id}; HttpOnly; SameSite=Lax; Path=/")
}

#[derive(Debug, Clone)]
struct StoredPreferences {
    preferences: ViewPreferences,
    last_seen: Instant,
}

/// Thread-safe preference store keyed by session id.
#[derive(Debug, Default)]
pub struct PreferenceStore {
    sessions: DashMap<SessionId, StoredPreferences>,
}

impl PreferenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Continue a known session or mint a new id.
    ///
    /// Returns the id to use and whether the client must be sent a cookie.
    /// A new id occupies no memory until [`store`](Self::store) is called.
    pub fn resume(&self, presented: Option<SessionId>) -> (SessionId, bool) {
        match presented {
            Some(id) if self.sessions.contains_key(&id) => (id, false),
            _ => {
                let id = SessionId::new();
                tracing::debug!(session_id = %id, "Minted session id");
                (id, true)
            }
        }
    }

    /// Snapshot of a session's preferences; defaults when unknown.
    pub fn load(&self, id: &SessionId) -> ViewPreferences {
        match self.sessions.get_mut(id) {
            Some(mut stored) => {
                stored.last_seen = Instant::now();
                stored.preferences
            }
            None => ViewPreferences::default(),
        }
    }

    /// Persist preferences for a session.
    pub fn store(&self, id: SessionId, preferences: ViewPreferences) {
        self.sessions.insert(
            id,
            StoredPreferences {
                preferences,
                last_seen: Instant::now(),
            },
        );
    }

    /// Drop sessions idle for longer than `idle_timeout`.
    ///
    /// A zero timeout keeps sessions forever. Returns the number removed.
    pub fn cleanup(&self, idle_timeout: Duration) -> usize {
        if idle_timeout.is_zero() {
            return 0;
        }

        let before = self.sessions.len();
        self.sessions
            .retain(|_, stored| stored.last_seen.elapsed() <= idle_timeout);
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            tracing::info!(removed, "Cleaned up idle preference sessions");
        }
        removed
    }

    /// Starts a background task that periodically drops idle sessions.
    ///
    /// # Arguments
    /// * `idle_timeout_secs` - Idle lifetime of a session; 0 disables the task.
    pub fn start_cleanup_task(self: &Arc<Self>, idle_timeout_secs: u64) {
        if idle_timeout_secs == 0 {
            return;
        }

        let store = Arc::clone(self);
        let idle_timeout = Duration::from_secs(idle_timeout_secs);
        let interval = Duration::from_secs(idle_timeout_secs.clamp(1, 300));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                store.cleanup(idle_timeout);
            }
        });
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use access::view::SortColumn;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_session_id_from_headers() {
        let id = SessionId::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; homeshare_session={id}; x=1")).unwrap(),
        );

        assert_eq!(session_id_from_headers(&headers, "homeshare_session"), Some(id));
        assert_eq!(session_id_from_headers(&headers, "other"), None);
    }

    #[test]
    fn test_session_id_from_headers_invalid_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("homeshare_session=garbage"),
        );
        assert_eq!(session_id_from_headers(&headers, "homeshare_session"), None);
        assert_eq!(session_id_from_headers(&HeaderMap::new(), "homeshare_session"), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let id = SessionId::new();
        let cookie = session_cookie("hs", &id);
        assert!(cookie.starts_with(&format!("hs={id}")));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
    }

    #[test]
    fn test_resume_known_and_unknown() {
        let store = PreferenceStore::new();

        let (id, is_new) = store.resume(None);
        assert!(is_new);
        assert!(store.is_empty());

        store.store(id, ViewPreferences::default());
        let (same, is_new) = store.resume(Some(id));
        assert_eq!(same, id);
        assert!(!is_new);

        let (other, is_new) = store.resume(Some(SessionId::new()));
        assert_ne!(other, id);
        assert!(is_new);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_resume_without_store_allocates_nothing() {
        let store = PreferenceStore::new();
        for _ in 0..1000 {
            let (id, is_new) = store.resume(None);
            assert!(is_new);
            assert_eq!(store.load(&id), ViewPreferences::default());
        }
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_load_and_store() {
        let store = PreferenceStore::new();
        let (id, _) = store.resume(None);
        assert_eq!(store.load(&id), ViewPreferences::default());

        let prefs = ViewPreferences {
            sort_column: SortColumn::Size,
            hide_dotfiles: false,
            ..ViewPreferences::default()
        };
        store.store(id, prefs);
        assert_eq!(store.load(&id), prefs);

        assert_eq!(store.load(&SessionId::new()), ViewPreferences::default());
    }

    #[test]
    fn test_cleanup_removes_idle_sessions() {
        let store = PreferenceStore::new();
        store.store(SessionId::new(), ViewPreferences::default());
        store.store(SessionId::new(), ViewPreferences::default());

        assert_eq!(store.cleanup(Duration::ZERO), 0);
        assert_eq!(store.len(), 2);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.cleanup(Duration::from_millis(5)), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_cleanup_keeps_active_sessions() {
        let store = PreferenceStore::new();
        store.store(SessionId::new(), ViewPreferences::default());
        assert_eq!(store.cleanup(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 1);
    }
}
