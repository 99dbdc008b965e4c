//! Operator sessions for the management surface
//!
//! A single operator credential guards the administrative API. The password
//! is hashed once at startup and never kept in plaintext. Login attempts are
//! subject to the same lockout policy as update requests, keyed by
//! `login:<client address>`.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::credential::CredentialHasher;
use crate::error::{Error, Result};
use crate::traits::AbuseLimiter;

/// How long a session stays valid after login
pub const SESSION_LIFETIME_HOURS: i64 = 24;

/// An authenticated operator session
#[derive(Clone)]
pub struct Session {
    /// Opaque session identifier (the cookie value)
    pub id: String,
    /// Operator name
    pub username: String,
    /// Login time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &"<redacted>")
            .field("username", &self.username)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Login, validation and logout for the operator
pub struct SessionManager {
    username: String,
    password_hash: String,
    hasher: CredentialHasher,
    limiter: Arc<dyn AbuseLimiter>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    /// Create a manager for the operator `username`/`password`
    pub async fn new(
        username: impl Into<String>,
        password: &str,
        hasher: CredentialHasher,
        limiter: Arc<dyn AbuseLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let username = username.into();
        if username.is_empty() || password.is_empty() {
            return Err(Error::config("Operator username and password are required"));
        }

        let password_hash = hasher.hash(password).await?;

        Ok(Self {
            username,
            password_hash,
            hasher,
            limiter,
            clock,
            lifetime: Duration::hours(SESSION_LIFETIME_HOURS),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Authenticate and open a session
    ///
    /// # Errors
    ///
    /// - `RateLimited`: the client address is locked out
    /// - `Authentication`: wrong username or password
    pub async fn login(&self, username: &str, password: &str, client_addr: &str) -> Result<Session> {
        let key = format!("login:{}", client_addr);

        match self.limiter.is_locked_out(&key).await {
            Ok(status) if status.locked => {
                warn!("Login from {} refused: locked out", client_addr);
                return Err(Error::rate_limited(match status.locked_until {
                    Some(until) => format!("too many failed logins, retry after {}", until),
                    None => "too many failed logins".to_string(),
                }));
            }
            Ok(_) => {}
            Err(e) => warn!("Lockout check unavailable, allowing login: {}", e),
        }

        // Always pay for the hash so a wrong username costs the same
        let password_ok = self.hasher.verify(password, &self.password_hash).await;
        if !(password_ok && username == self.username) {
            warn!("Failed login from {}", client_addr);
            if let Err(e) = self.limiter.record_auth_failure(&key).await {
                warn!("Failed to record login failure: {}", e);
            }
            return Err(Error::auth("invalid username or password"));
        }

        if let Err(e) = self.limiter.record_auth_success(&key).await {
            warn!("Failed to record login success: {}", e);
        }

        let now = self.clock.now();
        let session = Session {
            id: CredentialHasher::generate_token(),
            username: self.username.clone(),
            created_at: now,
            expires_at: now + self.lifetime,
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session.id.clone(), session.clone());
        info!("Operator {} logged in from {}", session.username, client_addr);

        Ok(session)
    }

    /// The live session for `session_id`, if any
    pub async fn validate(&self, session_id: &str) -> Option<Session> {
        let now = self.clock.now();
        let session = self.sessions.read().await.get(session_id).cloned()?;

        if session.expires_at <= now {
            debug!("Session for {} expired", session.username);
            self.sessions.write().await.remove(session_id);
            return None;
        }
        Some(session)
    }

    /// End a session; unknown identifiers are ignored
    pub async fn logout(&self, session_id: &str) {
        if let Some(session) = self.sessions.write().await.remove(session_id) {
            info!("Operator {} logged out", session.username);
        }
    }
}
