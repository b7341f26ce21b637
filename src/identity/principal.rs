use serde::{Deserialize, Serialize};

/// A resolved identity: the name the upstream proxy vouched for plus the
/// roles the directory knows for it. Never mutated after lookup; a new
/// resolution always produces a fresh value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    /// Roles are kept sorted so derived equality behaves like set equality.
    pub fn new<S: Into<String>>(name: S, display_name: Option<String>, roles: Vec<String>) -> Self {
        let mut roles = roles;
        roles.sort();
        roles.dedup();
        Self { name: name.into(), display_name, roles }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
