//! Request identity resolution and session binding for proxied deployments.
//! Keep the public surface thin and split implementation across sub-modules.

mod context;
mod directory;
mod principal;
mod request_context;
mod resolver;
mod session;

pub use context::{ContextSource, SecurityContext};
pub use directory::{StaticDirectory, UserDirectory};
pub use principal::Principal;
pub use request_context::RequestContext;
pub use resolver::{IdentityResolver, Resolution};
pub use session::{
    SessionCreateError, SessionCreationPolicy, SessionEntry, SessionStore, SessionToken,
};
