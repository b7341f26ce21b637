use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::principal::Principal;
use super::session::SessionEntry;

/// Where the effective identity of a request came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// Freshly resolved from the trusted proxy header.
    Header,
    /// Restored from a server-side session entry.
    Session,
}

/// The security context attached to one request. Immutable once built;
/// re-resolution on a later request produces a new value rather than
/// mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityContext {
    pub principal: Principal,
    pub established_at: DateTime<Utc>,
    pub source: ContextSource,
}

impl SecurityContext {
    pub fn from_header(principal: Principal) -> Self {
        Self { principal, established_at: Utc::now(), source: ContextSource::Header }
    }

    /// Restore a cached context. Keeps the original establishment time and
    /// marks the source as the session cache.
    pub fn from_session(entry: &SessionEntry) -> Self {
        Self {
            principal: entry.context.principal.clone(),
            established_at: entry.context.established_at,
            source: ContextSource::Session,
        }
    }
}
