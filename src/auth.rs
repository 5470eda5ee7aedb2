//! Anonymous sessions and the current-user seam used by clone mutations.

#[cfg(feature = "web")]
use std::sync::Arc;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

#[cfg(feature = "web")]
use axum::{Json, extract::State, response::IntoResponse};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, CookieJar};
#[cfg(feature = "web")]
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

#[cfg(feature = "web")]
use crate::app::AppState;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

/// Identity seam: who, if anyone, is performing the current action
pub trait AuthProvider: Send + Sync {
    fn current_user_id(&self) -> Option<Uuid>;
}

/// A provider that always answers with the same user (or nobody).
///
/// Used by the command-line tool and by request handlers once the session
/// cookie has been resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedUser(pub Option<Uuid>);

impl FixedUser {
    pub fn anonymous() -> Self {
        FixedUser(None)
    }

    pub fn signed_in(user_id: Uuid) -> Self {
        FixedUser(Some(user_id))
    }
}

impl AuthProvider for FixedUser {
    fn current_user_id(&self) -> Option<Uuid> {
        self.0
    }
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Anonymous user id minted at sign-in
    pub user_id: Uuid,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// In-process session table keyed by session id
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create an anonymous user and a session for it.
    ///
    /// # Returns
    /// * `(String, Uuid)` - The session id and the new user id
    pub fn sign_in_anonymously(&self) -> (String, Uuid) {
        let session_id = Uuid::new_v4().to_string();
        let user_id = Uuid::new_v4();
        let session = Session {
            user_id,
            expires_at: SystemTime::now() + self.ttl,
        };

        if let Ok(mut sessions) = self.sessions.write() {
            sessions.retain(|_, s| s.expires_at > SystemTime::now());
            sessions.insert(session_id.clone(), session);
        }

        info!("Anonymous sign-in for user {user_id}");
        (session_id, user_id)
    }

    /// The user behind a session, if it exists and has not expired.
    pub fn validate(&self, session_id: &str) -> Option<Uuid> {
        let sessions = self.sessions.read().ok()?;
        sessions
            .get(session_id)
            .filter(|session| session.expires_at > SystemTime::now())
            .map(|session| session.user_id)
    }

    /// Forget a session. Returns whether it existed.
    pub fn sign_out(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .map(|mut sessions| sessions.remove(session_id).is_some())
            .unwrap_or(false);
        if removed {
            debug!("Session {session_id} signed out");
        }
        removed
    }

    /// Resolve the request's session cookie to a user id.
    #[cfg(feature = "web")]
    pub fn user_from_jar(&self, jar: &CookieJar) -> Option<Uuid> {
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| self.validate(cookie.value()))
    }

    /// Provider for the user behind the request's session cookie.
    #[cfg(feature = "web")]
    pub fn provider(&self, jar: &CookieJar) -> FixedUser {
        FixedUser(self.user_from_jar(jar))
    }
}

/// Handle anonymous sign-in
///
/// Sets the session cookie and returns the new user id.
#[cfg(feature = "web")]
pub async fn handle_sign_in(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (session_id, user_id) = state.sessions.sign_in_anonymously();
    let mut cookie = Cookie::new(SESSION_COOKIE, session_id);
    cookie.set_path("/");
    cookie.set_http_only(true);

    (
        jar.add(cookie),
        Json(json!({ "user_id": user_id, "anonymous": true })),
    )
}

/// Handle sign-out
///
/// Drops the server-side session and clears the cookie.
#[cfg(feature = "web")]
pub async fn handle_sign_out(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.sign_out(cookie.value());
    }

    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");

    (jar.remove(cookie), Json(json!({ "signed_out": true })))
}

/// Report whether the caller is signed in
#[cfg(feature = "web")]
pub async fn handle_me(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    match state.sessions.user_from_jar(&jar) {
        Some(user_id) => Json(json!({ "signed_in": true, "user_id": user_id })),
        None => Json(json!({ "signed_in": false, "user_id": null })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_then_out() {
        let store = SessionStore::new(Duration::from_secs(60));
        let (session, user) = store.sign_in_anonymously();

        assert_eq!(store.validate(&session), Some(user));
        assert!(store.sign_out(&session));
        assert_eq!(store.validate(&session), None);
        assert!(!store.sign_out(&session));
    }

    #[test]
    fn expired_sessions_are_rejected() {
        let store = SessionStore::new(Duration::ZERO);
        let (session, _) = store.sign_in_anonymously();
        assert_eq!(store.validate(&session), None);
    }

    #[test]
    fn each_sign_in_is_a_new_user() {
        let store = SessionStore::new(Duration::from_secs(60));
        let (_, first) = store.sign_in_anonymously();
        let (_, second) = store.sign_in_anonymously();
        assert_ne!(first, second);
    }

    #[test]
    fn fixed_user_reports_identity() {
        let id = Uuid::new_v4();
        assert_eq!(FixedUser::signed_in(id).current_user_id(), Some(id));
        assert_eq!(FixedUser::anonymous().current_user_id(), None);
    }
}
