use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AppError;

use super::context::SecurityContext;
use super::directory::UserDirectory;
use super::session::{SessionCreationPolicy, SessionStore, SessionToken};

/// Outcome of resolving one request. `issued` is set only when the store
/// actually created an entry for this request, so the pipeline can emit the
/// session cookie exactly then and never otherwise. `cleared` is set when
/// the presented token was invalidated and nothing replaced it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub context: Option<SecurityContext>,
    pub issued: Option<SessionToken>,
    pub cleared: bool,
}

impl Resolution {
    fn anonymous() -> Self {
        Self { context: None, issued: None, cleared: false }
    }
}

/// Per-request identity decision. Holds no mutable state of its own; the
/// session store is the only shared mutable resource it touches.
///
/// The header is always authoritative: a cached session principal is never
/// consulted to decide who the caller is while a header is present, and a
/// cached entry that disagrees with the header is invalidated on the spot.
pub struct IdentityResolver {
    directory: Arc<dyn UserDirectory>,
    sessions: Arc<SessionStore>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn UserDirectory>, sessions: Arc<SessionStore>) -> Self {
        Self { directory, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Resolve the effective security context for a request carrying an
    /// optional trusted header value and an optional session token.
    pub fn resolve(
        &self,
        header: Option<&str>,
        token: Option<&str>,
    ) -> Result<Resolution, AppError> {
        match (header, token) {
            (None, None) => Ok(Resolution::anonymous()),
            (Some(name), token) => self.resolve_from_header(name, token),
            (None, Some(token)) => Ok(self.resolve_from_session(token)),
        }
    }

    /// Header present: the proxy vouches for `name`, so identity comes from
    /// the directory and nowhere else. The token, if any, is only a cache
    /// slot to reconcile.
    fn resolve_from_header(
        &self,
        name: &str,
        token: Option<&str>,
    ) -> Result<Resolution, AppError> {
        let Some(principal) = self.directory.lookup(name) else {
            // The proxy vouched for a name the directory does not know. Any
            // cached entry under the presented token no longer has a header
            // agreeing with it, so it must not survive this request.
            let mut cleared = false;
            if let Some(t) = token {
                cleared = self.sessions.invalidate(t);
            }
            warn!(target: "identity", principal = name, cleared_stale_session = cleared,
                "trusted header named an unknown principal");
            return Err(AppError::auth(
                "unknown_principal".into(),
                format!("principal '{}' is not known to the user directory", name),
            ));
        };

        let context = SecurityContext::from_header(principal);

        // Reconcile the cache with the freshly resolved identity.
        let cached = token.and_then(|t| self.sessions.get(t));
        let mut cleared = false;
        if let (Some(t), Some(entry)) = (token, cached.as_ref()) {
            if entry.context.principal != context.principal {
                self.sessions.invalidate(t);
                cleared = true;
                warn!(target: "identity",
                    cached = %entry.context.principal.name,
                    header = %context.principal.name,
                    "cached session principal disagrees with trusted header, entry invalidated");
            }
        }

        let bound = cached.is_some() && !cleared;
        let issued = if self.sessions.policy() == SessionCreationPolicy::Always && !bound {
            Some(self.sessions.create(&context, false)?)
        } else {
            None
        };

        debug!(target: "identity", principal = %context.principal.name,
            issued = issued.is_some(), "resolved identity from trusted header");
        Ok(Resolution { context: Some(context), cleared: cleared && issued.is_none(), issued })
    }

    /// Token without a header: the proxy is no longer vouching for anyone,
    /// so under `Never` and `IfRequired` the cached identity must not be
    /// used and the request is anonymous. Only `Always`, the explicit
    /// opt-in to session caching, restores the cached context.
    fn resolve_from_session(&self, token: &str) -> Resolution {
        match self.sessions.policy() {
            SessionCreationPolicy::Always => match self.sessions.get(token) {
                Some(entry) => {
                    let context = SecurityContext::from_session(&entry);
                    debug!(target: "identity", principal = %context.principal.name,
                        "restored identity from session cache");
                    Resolution { context: Some(context), issued: None, cleared: false }
                }
                None => Resolution::anonymous(),
            },
            SessionCreationPolicy::Never | SessionCreationPolicy::IfRequired => {
                debug!(target: "identity", "bare session token ignored, no header to vouch for it");
                Resolution::anonymous()
            }
        }
    }
}
