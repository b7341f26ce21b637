use uuid::Uuid;

use super::context::SecurityContext;
use super::principal::Principal;

/// What the pipeline attaches to a request's processing scope: the resolved
/// context (if any) plus a request id for log correlation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub context: Option<SecurityContext>,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(context: Option<SecurityContext>) -> Self {
        Self { context, request_id: Uuid::new_v4().to_string() }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.context.as_ref().map(|c| &c.principal)
    }

    pub fn is_authenticated(&self) -> bool {
        self.context.is_some()
    }
}
