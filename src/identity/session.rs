use std::collections::HashMap;
use std::str::FromStr;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tprintln;

use super::context::SecurityContext;

pub type SessionToken = String;

/// Gate on server-side session creation. Read-only after startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionCreationPolicy {
    /// Cache every successfully resolved identity.
    Always,
    /// Create only when the caller explicitly marks the creation as required.
    IfRequired,
    /// Never create; any attempt is a wiring bug and fails loudly.
    Never,
}

impl FromStr for SessionCreationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "always" => Ok(SessionCreationPolicy::Always),
            "if_required" => Ok(SessionCreationPolicy::IfRequired),
            "never" => Ok(SessionCreationPolicy::Never),
            other => Err(format!("unknown session creation policy: {}", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionCreateError {
    #[error("session creation forbidden under policy '{policy}'")]
    PolicyViolation { policy: String },
    #[error("generated session token collides with a live entry")]
    TokenCollision,
    #[error("entropy source failed: {0}")]
    Entropy(String),
}

/// One cached security context, keyed by its token. Owned exclusively by
/// [`SessionStore`]; the only way one comes into existence is `create`.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub token: SessionToken,
    pub context: SecurityContext,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

fn gen_token() -> Result<SessionToken, SessionCreateError> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| SessionCreateError::Entropy(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Passive token -> context cache with an explicit creation gate. The store
/// never writes as a side effect of a read; the only mutation paths are
/// `create` and `invalidate` (plus expiry pruning, which only removes).
pub struct SessionStore {
    policy: SessionCreationPolicy,
    ttl: Option<Duration>,
    entries: RwLock<HashMap<SessionToken, SessionEntry>>,
}

impl SessionStore {
    /// `ttl_secs == 0` disables expiry.
    pub fn new(policy: SessionCreationPolicy, ttl_secs: u64) -> Self {
        Self {
            policy,
            ttl: (ttl_secs > 0).then(|| Duration::seconds(ttl_secs as i64)),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> SessionCreationPolicy {
        self.policy
    }

    /// Cache a resolved context under a fresh token. Fails under `Never`,
    /// and under `IfRequired` unless the caller marked the creation as
    /// required. A duplicate generated token is a fatal allocation fault,
    /// never an overwrite.
    pub fn create(
        &self,
        context: &SecurityContext,
        required: bool,
    ) -> Result<SessionToken, SessionCreateError> {
        match self.policy {
            SessionCreationPolicy::Never => {
                return Err(SessionCreateError::PolicyViolation { policy: "never".into() });
            }
            SessionCreationPolicy::IfRequired if !required => {
                return Err(SessionCreateError::PolicyViolation { policy: "if_required".into() });
            }
            _ => {}
        }
        let token = gen_token()?;
        let now = Utc::now();
        let entry = SessionEntry {
            token: token.clone(),
            context: context.clone(),
            created_at: now,
            expires_at: self.ttl.map(|ttl| now + ttl),
        };
        {
            let mut map = self.entries.write();
            if map.contains_key(&token) {
                return Err(SessionCreateError::TokenCollision);
            }
            map.insert(token.clone(), entry);
        }
        tprintln!("session.create user={} ttl={:?}", context.principal.name, self.ttl);
        Ok(token)
    }

    /// Read an entry. Expired entries are pruned and reported as absent.
    pub fn get(&self, token: &str) -> Option<SessionEntry> {
        let now = Utc::now();
        let mut drop_key: Option<String> = None;
        let out = {
            let map = self.entries.read();
            map.get(token).and_then(|ent| match ent.expires_at {
                Some(exp) if exp <= now => {
                    drop_key = Some(token.to_string());
                    None
                }
                _ => Some(ent.clone()),
            })
        };
        if let Some(k) = drop_key {
            self.entries.write().remove(&k);
        }
        out
    }

    /// Drop the entry for `token`. Idempotent; an absent or already-dropped
    /// token is a no-op. Returns whether an entry was actually removed.
    pub fn invalidate(&self, token: &str) -> bool {
        let removed = self.entries.write().remove(token).is_some();
        if removed {
            tprintln!("session.invalidate token_prefix={}", &token[..token.len().min(8)]);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[cfg(test)]
    fn force_expire(&self, token: &str) {
        if let Some(ent) = self.entries.write().get_mut(token) {
            ent.expires_at = Some(Utc::now() - Duration::seconds(1));
        }
    }
}
