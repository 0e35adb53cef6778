//! Per-user login registry for the chat front end.
//!
//! A user has at most one [`UserSession`]. It records who logged in and the
//! outcome the portal reported; it does not hold a live HTTP session, since
//! every portal operation opens its own.

use std::collections::HashMap;

use schools_portal::AuthOutcome;

/// Chat user identifier.
pub type UserId = u64;

/// A successful login remembered for one chat user.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub username: String,
    pub authenticated: bool,
    pub auth: AuthOutcome,
}

/// Registry of logged-in chat users.
#[derive(Debug, Default)]
pub struct UserSessions {
    sessions: HashMap<UserId, UserSession>,
}

impl UserSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a login. Returns `false` (and keeps the existing entry) when
    /// the user already has a session.
    pub fn insert(&mut self, user_id: UserId, session: UserSession) -> bool {
        if self.sessions.contains_key(&user_id) {
            return false;
        }
        tracing::info!(user_id, username = %session.username, "user session created");
        self.sessions.insert(user_id, session);
        true
    }

    pub fn get(&self, user_id: UserId) -> Option<&UserSession> {
        self.sessions.get(&user_id)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.sessions.contains_key(&user_id)
    }

    /// Whether the user holds an authenticated session.
    pub fn is_authenticated(&self, user_id: UserId) -> bool {
        self.sessions
            .get(&user_id)
            .is_some_and(|s| s.authenticated)
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<UserSession> {
        let removed = self.sessions.remove(&user_id);
        if removed.is_some() {
            tracing::info!(user_id, "user session removed");
        }
        removed
    }

    /// Number of logged-in users.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
