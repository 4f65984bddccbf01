//! Gateway client end-to-end tests
//!
//! Each test runs a mock gateway on a random local port; no external
//! services are needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chat_cache::CacheOptions;
use chat_client::{Client, ClientError};
use chat_core::Snowflake;
use chat_gateway::{ConnectionStatus, GatewayError, SessionState};
use integration_tests::*;
use reqwest::StatusCode;
use serde_json::json;

fn counter(client: &Client, event: &str) -> Result<Arc<AtomicUsize>> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    client.on(event, move |_, _| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })?;
    Ok(count)
}

/// Start a login in the background and complete the handshake for it
async fn logged_in(gateway: &mut MockGateway, client: &Arc<Client>) -> Result<MockConnection> {
    let login = tokio::spawn({
        let client = Arc::clone(client);
        async move { client.login(TOKEN).await }
    });
    let connection = gateway.handshake("session-1").await?;
    login.await??;
    Ok(connection)
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_identifies_and_waits_for_ready() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());

    let login = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.login(TOKEN).await }
    });

    let mut connection = gateway.accept().await?;
    assert_eq!(connection.path, "/ws");
    let query = connection.query.clone().unwrap_or_default();
    assert!(query.contains("v=10"), "{query}");
    assert!(query.contains("encoding=json"), "{query}");

    connection.hello(HEARTBEAT_INTERVAL).await?;
    let identify = connection.expect_op(2).await?;
    assert_eq!(identify["d"]["token"], TOKEN);
    assert!(identify["d"]["intents"].is_u64());
    assert!(identify["d"]["properties"]["os"].is_string());

    assert!(!login.is_finished());
    connection
        .dispatch("READY", 1, ready("session-1", &gateway.resume_url()))
        .await?;
    login.await??;

    let session = client.session().expect("logged in");
    assert_eq!(session.session_id.as_deref(), Some("session-1"));
    assert_eq!(session.resume_url, Some(gateway.resume_url()));
    assert_eq!(session.sequence, Some(1));
    assert!(!session.resuming);
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert!(client.is_ready());
    assert_eq!(gateway.bootstrap_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_login_twice_is_rejected() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let _connection = logged_in(&mut gateway, &client).await?;

    assert!(matches!(
        client.login(TOKEN).await,
        Err(ClientError::AlreadyLoggedIn)
    ));
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_rejects_bad_token() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client();

    let err = client.login("bad-token").await.unwrap_err();
    assert!(err.is_authentication(), "{err}");
    gateway.expect_no_connection(Duration::from_millis(200)).await?;
    assert!(client.gateway().is_none());
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_endpoint_requires_bot_token() -> Result<()> {
    let gateway = MockGateway::start().await?;
    let http = reqwest::Client::new();
    let url = format!("{}/gateway/bot", gateway.api_base_url());

    let response = http.get(&url).send().await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let client = gateway.client();
    let metadata: serde_json::Value = client.rest().get("/gateway/bot").await?;
    assert_eq!(metadata["url"], gateway.gateway_url());
    Ok(())
}

// ============================================================================
// Ready signal and listeners
// ============================================================================

#[tokio::test]
async fn test_ready_fires_once_with_once_and_persistent_listeners() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());

    let setup = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&setup);
    client.once("READY", move |_, _| {
        s.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })?;
    let every = counter(&client, "READY")?;

    let mut connection = logged_in(&mut gateway, &client).await?;
    eventually(|| every.load(Ordering::SeqCst) == 1).await?;

    // Non-resumable invalid session: fresh Identify and a second READY
    connection.send(json!({ "op": 9, "d": false })).await?;
    assert_eq!(connection.expect_close().await?, Some(3000));

    let mut connection = gateway.accept().await?;
    assert_eq!(connection.path, "/ws");
    connection.hello(HEARTBEAT_INTERVAL).await?;
    connection.expect_op(2).await?;
    connection
        .dispatch("READY", 1, ready("session-2", &gateway.resume_url()))
        .await?;

    eventually(|| every.load(Ordering::SeqCst) == 2).await?;
    assert_eq!(setup.load(Ordering::SeqCst), 1);
    assert_eq!(
        client.session().and_then(|s| s.session_id.clone()).as_deref(),
        Some("session-2")
    );
    Ok(())
}

#[tokio::test]
async fn test_failing_listener_keeps_connection() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    client.on("MESSAGE_CREATE", |_, _| panic!("listener panic"))?;
    client.on("MESSAGE_CREATE", |_, _| anyhow::bail!("listener error"))?;
    let messages = counter(&client, "MESSAGE_CREATE")?;

    let mut connection = logged_in(&mut gateway, &client).await?;
    connection.dispatch("MESSAGE_CREATE", 2, message_create("one")).await?;
    connection.dispatch("MESSAGE_CREATE", 3, message_create("two")).await?;

    eventually(|| messages.load(Ordering::SeqCst) == 2).await?;
    assert_eq!(client.status(), ConnectionStatus::Connected);
    assert_eq!(client.session().and_then(|s| s.sequence), Some(3));
    Ok(())
}

#[tokio::test]
async fn test_listener_added_while_running() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let mut connection = logged_in(&mut gateway, &client).await?;

    let typing = counter(&client, "TYPING_START")?;
    connection.dispatch("TYPING_START", 2, json!({ "user_id": "1" })).await?;
    eventually(|| typing.load(Ordering::SeqCst) == 1).await?;
    Ok(())
}

#[tokio::test]
async fn test_cache_seeded_from_guild_create() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    client.enable_cache(CacheOptions::all())?;
    let mut connection = logged_in(&mut gateway, &client).await?;

    connection.dispatch("GUILD_CREATE", 2, guild_create()).await?;

    let guild_id: Snowflake = GUILD_ID.parse()?;
    let cache = Arc::clone(client.cache());
    eventually(|| cache.guild(guild_id).is_some()).await?;
    assert!(cache.channel(CHANNEL_ID.parse()?).is_some());
    assert!(cache
        .voice_state(guild_id, BOT_USER_ID.parse()?)
        .is_some());
    assert!(cache.self_user().is_some());

    connection
        .dispatch("GUILD_DELETE", 3, json!({ "id": GUILD_ID }))
        .await?;
    eventually(|| cache.guild(guild_id).is_none()).await?;
    assert_eq!(cache.channel_count(), 0);
    Ok(())
}

// ============================================================================
// Resume and reconnect
// ============================================================================

#[tokio::test]
async fn test_reconnect_request_resumes_with_last_sequence() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let mut connection = logged_in(&mut gateway, &client).await?;

    connection.dispatch("MESSAGE_CREATE", 2, message_create("a")).await?;
    connection.dispatch("MESSAGE_CREATE", 3, message_create("b")).await?;
    connection.send(json!({ "op": 7, "d": null })).await?;
    assert_eq!(connection.expect_close().await?, Some(4000));

    let mut connection = gateway.accept().await?;
    assert_eq!(connection.path, "/resume");
    connection.hello(HEARTBEAT_INTERVAL).await?;
    let resume = connection.expect_op(6).await?;
    assert_eq!(resume["d"]["token"], TOKEN);
    assert_eq!(resume["d"]["session_id"], "session-1");
    assert_eq!(resume["d"]["seq"], 3);

    connection.dispatch("RESUMED", 4, json!({})).await?;
    eventually(|| {
        client
            .session()
            .is_some_and(|s| !s.resuming && s.sequence == Some(4))
    })
    .await?;
    assert_eq!(gateway.bootstrap_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_resumable_close_codes_resume() -> Result<()> {
    for code in [4000, 4007, 4009, 1006] {
        let mut gateway = MockGateway::start().await?;
        let client = Arc::new(gateway.client());
        let connection = logged_in(&mut gateway, &client).await?;

        if code == 1006 {
            // Abnormal: the socket just goes away
            drop(connection);
        } else {
            connection.close(code).await?;
        }

        let mut connection = gateway.accept().await?;
        assert_eq!(connection.path, "/resume", "close {code}");
        connection.hello(HEARTBEAT_INTERVAL).await?;
        let resume = connection.expect_op(6).await?;
        assert_eq!(resume["d"]["session_id"], "session-1", "close {code}");
        assert_eq!(resume["d"]["seq"], 1, "close {code}");
    }
    Ok(())
}

#[tokio::test]
async fn test_resumable_invalid_session_resumes() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let mut connection = logged_in(&mut gateway, &client).await?;

    connection.send(json!({ "op": 9, "d": true })).await?;
    assert_eq!(connection.expect_close().await?, Some(4000));

    let mut connection = gateway.accept().await?;
    connection.hello(HEARTBEAT_INTERVAL).await?;
    connection.expect_op(6).await?;
    Ok(())
}

#[tokio::test]
async fn test_fresh_reconnect_on_3000() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let connection = logged_in(&mut gateway, &client).await?;

    connection.close(3000).await?;

    let mut connection = gateway.accept().await?;
    assert_eq!(connection.path, "/ws");
    connection.hello(HEARTBEAT_INTERVAL).await?;
    let identify = connection.expect_op(2).await?;
    assert_eq!(identify["d"]["token"], TOKEN);
    assert!(client.session().is_some_and(|s| s.session_id.is_none()));
    Ok(())
}

#[tokio::test]
async fn test_protocol_violation_resumes() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let mut connection = logged_in(&mut gateway, &client).await?;

    connection.send(json!("not a payload")).await?;
    assert_eq!(connection.expect_close().await?, Some(4000));

    let mut connection = gateway.accept().await?;
    connection.hello(HEARTBEAT_INTERVAL).await?;
    connection.expect_op(6).await?;
    Ok(())
}

#[tokio::test]
async fn test_session_restore_resumes_first_socket() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client().with_session(SessionState {
        sequence: Some(42),
        session_id: Some("persisted".to_string()),
        resume_url: Some(gateway.resume_url()),
        ..SessionState::default()
    }));

    let login = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.login(TOKEN).await }
    });

    let mut connection = gateway.accept().await?;
    assert_eq!(connection.path, "/resume");
    connection.hello(HEARTBEAT_INTERVAL).await?;
    let resume = connection.expect_op(6).await?;
    assert_eq!(resume["d"]["session_id"], "persisted");
    assert_eq!(resume["d"]["seq"], 42);

    connection.dispatch("RESUMED", 43, json!({})).await?;
    login.await??;
    assert_eq!(client.session().and_then(|s| s.sequence), Some(43));
    Ok(())
}

#[tokio::test]
async fn test_failed_reconnect_keeps_session_and_retries() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());

    let login = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.login(TOKEN).await }
    });
    let mut connection = gateway.accept().await?;
    connection.hello(HEARTBEAT_INTERVAL).await?;
    connection.expect_op(2).await?;
    // Nothing listens on port 1, so every resume attempt is refused
    connection
        .dispatch("READY", 1, ready("session-1", "ws://127.0.0.1:1"))
        .await?;
    login.await??;

    connection.close(4000).await?;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert_ne!(client.status(), ConnectionStatus::Terminated);
    let session = client.session().expect("still running");
    assert_eq!(session.session_id.as_deref(), Some("session-1"));
    assert!(session.resuming);

    tokio::time::timeout(TEST_TIMEOUT, client.close()).await??;
    assert!(client.gateway().is_none());
    Ok(())
}

// ============================================================================
// Fatal closes and shutdown
// ============================================================================

#[tokio::test]
async fn test_authentication_close_is_fatal() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let connection = logged_in(&mut gateway, &client).await?;

    connection.close(4004).await?;

    let err = tokio::time::timeout(TEST_TIMEOUT, client.wait()).await?.unwrap_err();
    assert!(err.is_authentication(), "{err}");
    gateway.expect_no_connection(Duration::from_millis(300)).await?;
    assert!(matches!(client.wait().await, Err(ClientError::NotLoggedIn)));
    Ok(())
}

#[tokio::test]
async fn test_disallowed_intents_close_is_fatal() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let connection = logged_in(&mut gateway, &client).await?;

    connection.close(4014).await?;

    let err = tokio::time::timeout(TEST_TIMEOUT, client.wait()).await?.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Gateway(GatewayError::FatalClose { code: 4014, .. })
    ));
    gateway.expect_no_connection(Duration::from_millis(300)).await?;
    Ok(())
}

#[tokio::test]
async fn test_normal_close_from_server_terminates() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let connection = logged_in(&mut gateway, &client).await?;

    connection.close(1000).await?;

    tokio::time::timeout(TEST_TIMEOUT, client.wait()).await??;
    gateway.expect_no_connection(Duration::from_millis(300)).await?;
    Ok(())
}

#[tokio::test]
async fn test_close_sends_normal_close() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let connection = logged_in(&mut gateway, &client).await?;

    let close = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.close().await }
    });
    assert_eq!(connection.expect_close().await?, Some(1000));

    tokio::time::timeout(TEST_TIMEOUT, close).await???;
    assert!(client.gateway().is_none());
    gateway.expect_no_connection(Duration::from_millis(300)).await?;
    Ok(())
}

#[tokio::test]
async fn test_ping_measures_round_trip() -> Result<()> {
    let mut gateway = MockGateway::start().await?;
    let client = Arc::new(gateway.client());
    let connection = logged_in(&mut gateway, &client).await?;
    let _reader = connection.drain();

    let latency = client.ping().await?;
    assert!(latency < TEST_TIMEOUT);
    Ok(())
}
