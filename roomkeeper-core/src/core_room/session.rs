//! Room-scoped session tokens
//!
//! Tokens are issued only after a (user, room) pair has been verified. The
//! core never inspects a token; it hands it to the caller as an opaque string.

use super::types::{RoomId, Timestamp, UserId};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use uuid::Uuid;

/// Token issuance errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token store poisoned")]
    Poisoned,

    #[error("token issuer unavailable: {0}")]
    Unavailable(String),
}

/// Turns a verified (user, room) pair into a bearer token
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: UserId, room_id: RoomId) -> Result<String, TokenError>;

    /// Invalidate every token issued for a room; returns how many were live
    fn revoke_room(&self, room_id: RoomId) -> Result<usize, TokenError>;
}

/// What a token was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: UserId,
    pub room_id: RoomId,
    pub issued_at: Timestamp,
}

/// In-memory issuer handing out random UUID tokens
pub struct SessionTokenIssuer {
    sessions: RwLock<HashMap<String, SessionClaims>>,
    ttl: Option<Duration>,
}

impl SessionTokenIssuer {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: None,
        }
    }

    /// Tokens older than `ttl` stop resolving
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Claims behind a live token
    pub fn resolve(&self, token: &str) -> Result<Option<SessionClaims>, TokenError> {
        let sessions = self.sessions.read().map_err(|_| TokenError::Poisoned)?;
        Ok(sessions
            .get(token)
            .copied()
            .filter(|claims| !self.is_expired(claims, Timestamp::now())))
    }

    /// Returns whether the token was live
    pub fn revoke(&self, token: &str) -> Result<bool, TokenError> {
        let mut sessions = self.sessions.write().map_err(|_| TokenError::Poisoned)?;
        Ok(sessions.remove(token).is_some())
    }

    fn is_expired(&self, claims: &SessionClaims, now: Timestamp) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = now.as_millis().saturating_sub(claims.issued_at.as_millis());
                age > ttl.as_millis() as i64
            }
            None => false,
        }
    }
}

impl Default for SessionTokenIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenIssuer for SessionTokenIssuer {
    fn issue(&self, user_id: UserId, room_id: RoomId) -> Result<String, TokenError> {
        let token = Uuid::new_v4().to_string();
        let now = Timestamp::now();
        let claims = SessionClaims {
            user_id,
            room_id,
            issued_at: now,
        };

        let mut sessions = self.sessions.write().map_err(|_| TokenError::Poisoned)?;
        // Expired tokens never resolve again; drop them while the lock is held
        if self.ttl.is_some() {
            sessions.retain(|_, existing| !self.is_expired(existing, now));
        }
        sessions.insert(token.clone(), claims);

        Ok(token)
    }

    fn revoke_room(&self, room_id: RoomId) -> Result<usize, TokenError> {
        let mut sessions = self.sessions.write().map_err(|_| TokenError::Poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, claims| claims.room_id != room_id);
        Ok(before - sessions.len())
    }
}
