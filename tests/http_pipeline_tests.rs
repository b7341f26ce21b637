//! End-to-end pipeline tests over a real listener: trusted-header
//! resolution, session cookie emission, and the cross-principal
//! invalidation guarantees.

use std::sync::Arc;

use anyhow::Result;

use headgate::identity::{SessionCreationPolicy, StaticDirectory};
use headgate::server::{build_router, AppState, ServerConfig};

const HEADER: &str = "x-auth-user";
const COOKIE: &str = "headgate_session";

/// Bind an ephemeral port and serve the demo router with the given policy.
async fn spawn_server(policy: SessionCreationPolicy) -> String {
    let config = ServerConfig {
        http_port: 0,
        trusted_header: HEADER.to_string(),
        session_policy: policy,
        session_ttl_secs: 0,
    };
    let state = AppState::new(&config, Arc::new(StaticDirectory::demo()));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}", addr)
}

/// Pull the session token out of a Set-Cookie header, if one was sent.
fn issued_token(resp: &reqwest::Response) -> Option<String> {
    let raw = resp.headers().get("set-cookie")?.to_str().ok()?;
    let rest = raw.strip_prefix(&format!("{}=", COOKIE))?;
    let token = rest.split(';').next()?.to_string();
    (token != "deleted").then_some(token)
}

fn cookie_header(token: &str) -> String {
    format!("{}={}", COOKIE, token)
}

#[tokio::test]
async fn never_policy_resolves_header_and_emits_no_cookie() -> Result<()> {
    let base = spawn_server(SessionCreationPolicy::Never).await;
    let client = reqwest::Client::new();

    let resp = client.get(&base).header(HEADER, "admin").send().await?;
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("set-cookie").is_none(), "no session header under Never");
    assert_eq!(resp.text().await?, "Username=admin");

    let resp = client.get(format!("{}/whoami", base)).header(HEADER, "admin").send().await?;
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("set-cookie").is_none());
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["context"]["principal"]["name"], "admin");
    assert_eq!(body["context"]["source"], "header");
    Ok(())
}

#[tokio::test]
async fn never_policy_ignores_bare_session_cookie() -> Result<()> {
    let base = spawn_server(SessionCreationPolicy::Never).await;
    let client = reqwest::Client::new();

    // A leftover cookie with the header stripped must not resurrect an identity.
    let resp = client
        .get(format!("{}/whoami", base))
        .header("cookie", cookie_header("stale-token-from-before"))
        .send()
        .await?;
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(&base)
        .header("cookie", cookie_header("stale-token-from-before"))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await?, "Username=anonymous");
    Ok(())
}

#[tokio::test]
async fn unknown_principal_is_rejected_with_401() -> Result<()> {
    let base = spawn_server(SessionCreationPolicy::Never).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/whoami", base)).header(HEADER, "ghost").send().await?;
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().get("set-cookie").is_none(), "no cookie traffic without a token");
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["type"], "auth");

    // With a cookie presented, the rejection also clears it.
    let resp = client
        .get(format!("{}/whoami", base))
        .header(HEADER, "ghost")
        .header("cookie", cookie_header("whatever"))
        .send()
        .await?;
    assert_eq!(resp.status(), 401);
    let set_cookie = resp.headers().get("set-cookie").expect("clearing cookie").to_str()?;
    assert!(set_cookie.contains(&format!("{}=deleted", COOKIE)));
    Ok(())
}

#[tokio::test]
async fn always_policy_issues_session_and_survives_replay_with_new_principal() -> Result<()> {
    let base = spawn_server(SessionCreationPolicy::Always).await;
    let client = reqwest::Client::new();

    // First request as admin gets a session cookie.
    let resp1 = client.get(format!("{}/whoami", base)).header(HEADER, "admin").send().await?;
    assert_eq!(resp1.status(), 200);
    let token1 = issued_token(&resp1).expect("session issued under Always");

    // Same cookie replayed with a different trusted header: the header
    // wins, and the old binding is replaced.
    let resp2 = client
        .get(format!("{}/whoami", base))
        .header(HEADER, "user")
        .header("cookie", cookie_header(&token1))
        .send()
        .await?;
    assert_eq!(resp2.status(), 200);
    let token2 = issued_token(&resp2).expect("fresh session for the new principal");
    assert_ne!(token2, token1);
    let body: serde_json::Value = resp2.json().await?;
    assert_eq!(body["context"]["principal"]["name"], "user");

    // The old token is dead: without a header it resolves to nobody.
    let resp3 = client
        .get(format!("{}/whoami", base))
        .header("cookie", cookie_header(&token1))
        .send()
        .await?;
    assert_eq!(resp3.status(), 401);

    // The new token restores the new principal from the cache.
    let resp4 = client
        .get(format!("{}/whoami", base))
        .header("cookie", cookie_header(&token2))
        .send()
        .await?;
    assert_eq!(resp4.status(), 200);
    let body: serde_json::Value = resp4.json().await?;
    assert_eq!(body["context"]["principal"]["name"], "user");
    assert_eq!(body["context"]["source"], "session");
    Ok(())
}

#[tokio::test]
async fn always_policy_reuses_matching_binding_without_reissue() -> Result<()> {
    let base = spawn_server(SessionCreationPolicy::Always).await;
    let client = reqwest::Client::new();

    let resp = client.get(&base).header(HEADER, "admin").send().await?;
    let token = issued_token(&resp).expect("session issued");

    let resp = client
        .get(&base)
        .header(HEADER, "admin")
        .header("cookie", cookie_header(&token))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("set-cookie").is_none(), "agreeing binding is kept as-is");
    Ok(())
}

#[tokio::test]
async fn logout_invalidates_and_clears() -> Result<()> {
    let base = spawn_server(SessionCreationPolicy::Always).await;
    let client = reqwest::Client::new();

    let resp = client.get(&base).header(HEADER, "admin").send().await?;
    let token = issued_token(&resp).expect("session issued");

    let resp = client
        .post(format!("{}/logout", base))
        .header("cookie", cookie_header(&token))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let set_cookie = resp.headers().get("set-cookie").expect("clearing cookie").to_str()?;
    assert!(set_cookie.contains(&format!("{}=deleted", COOKIE)));

    // Logging out twice is harmless.
    let resp = client
        .post(format!("{}/logout", base))
        .header("cookie", cookie_header(&token))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/whoami", base))
        .header("cookie", cookie_header(&token))
        .send()
        .await?;
    assert_eq!(resp.status(), 401);
    Ok(())
}
