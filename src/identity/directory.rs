use std::collections::HashMap;

use super::principal::Principal;

/// Maps a principal name (as vouched for by the upstream proxy) to a user
/// record. Lookups are pure and side-effect free; any caching of resolved
/// identity lives behind the session store, never here.
pub trait UserDirectory: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Principal>;
}

/// In-memory directory backed by a static table.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: HashMap<String, Principal>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self { users: HashMap::new() }
    }

    pub fn with_users<I: IntoIterator<Item = Principal>>(users: I) -> Self {
        let mut dir = Self::new();
        for p in users {
            dir.insert(p);
        }
        dir
    }

    pub fn insert(&mut self, principal: Principal) {
        self.users.insert(principal.name.clone(), principal);
    }

    /// Directory seeded with the stock demo accounts used by the bundled
    /// server binary and the test suites.
    pub fn demo() -> Self {
        Self::with_users([
            Principal::new("admin", Some("Administrator".into()), vec!["admin".into()]),
            Principal::new("user", Some("Regular User".into()), vec!["user".into()]),
        ])
    }
}

impl UserDirectory for StaticDirectory {
    fn lookup(&self, name: &str) -> Option<Principal> {
        self.users.get(name).cloned()
    }
}
