//! Store-level integration tests: the creation gate across policies and
//! the visibility of invalidation across threads.

use std::sync::Arc;

use headgate::identity::{
    Principal, SecurityContext, SessionCreateError, SessionCreationPolicy, SessionStore,
};

fn ctx(name: &str) -> SecurityContext {
    SecurityContext::from_header(Principal::new(name, None, vec!["user".into()]))
}

#[test]
fn creation_gate_across_policies() {
    let never = SessionStore::new(SessionCreationPolicy::Never, 0);
    assert!(matches!(
        never.create(&ctx("admin"), false),
        Err(SessionCreateError::PolicyViolation { .. })
    ));

    let if_required = SessionStore::new(SessionCreationPolicy::IfRequired, 0);
    assert!(if_required.create(&ctx("admin"), false).is_err());
    assert!(if_required.create(&ctx("admin"), true).is_ok());

    let always = SessionStore::new(SessionCreationPolicy::Always, 0);
    assert!(always.create(&ctx("admin"), false).is_ok());
}

#[test]
fn invalidation_is_visible_across_threads() {
    let store = Arc::new(SessionStore::new(SessionCreationPolicy::Always, 0));
    let token = store.create(&ctx("admin"), false).unwrap();

    let store2 = Arc::clone(&store);
    let tok = token.clone();
    let handle = std::thread::spawn(move || {
        assert!(store2.invalidate(&tok));
    });
    handle.join().unwrap();

    // Once the invalidation commits, no reader may observe the entry.
    assert!(store.get(&token).is_none());
    assert!(store.is_empty());
}

#[test]
fn concurrent_creates_yield_distinct_tokens() {
    let store = Arc::new(SessionStore::new(SessionCreationPolicy::Always, 0));
    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(std::thread::spawn(move || {
            store.create(&ctx(&format!("user{}", i)), false).unwrap()
        }));
    }
    let mut tokens: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    tokens.sort();
    tokens.dedup();
    assert_eq!(tokens.len(), 8);
    assert_eq!(store.len(), 8);
}
