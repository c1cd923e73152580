use super::*;
use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use shared::domain::UserId;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Clone)]
struct AuthServerState {
    sign_outs: Arc<Mutex<Vec<String>>>,
}

async fn handle_sign_in(
    Json(payload): Json<SignInRequest>,
) -> Result<Json<SignInResponse>, StatusCode> {
    if payload.password != "correct horse" {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(SignInResponse {
        user_id: UserId::from("user-7"),
        email: payload.email,
        id_token: "token-abc".to_string(),
    }))
}

async fn handle_sign_out(State(state): State<AuthServerState>, headers: HeaderMap) -> StatusCode {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.sign_outs.lock().await.push(auth);
    StatusCode::NO_CONTENT
}

async fn spawn_auth_server() -> Result<(String, AuthServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = AuthServerState {
        sign_outs: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/auth/sign_in", post(handle_sign_in))
        .route("/auth/sign_out", post(handle_sign_out))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

fn provider_for(server_url: &str) -> RestIdentityProvider {
    let config = BackendConfig::new(server_url).expect("config");
    RestIdentityProvider::new(Client::new(), config)
}

#[tokio::test]
async fn sign_in_returns_principal_and_broadcasts_the_change() {
    let (server_url, _state) = spawn_auth_server().await.expect("spawn server");
    let provider = provider_for(&server_url);
    let mut changes = provider.subscribe_changes();

    let principal = provider
        .sign_in("alice@example.com", "correct horse")
        .await
        .expect("sign in");
    assert_eq!(principal.id, UserId::from("user-7"));
    assert_eq!(principal.email, "alice@example.com");

    let change = tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .expect("change timeout")
        .expect("change");
    assert_eq!(change, Some(principal));
}

#[tokio::test]
async fn rejected_credentials_map_to_a_generic_unauthorized_error() {
    let (server_url, _state) = spawn_auth_server().await.expect("spawn server");
    let provider = provider_for(&server_url);

    let err = provider
        .sign_in("alice@example.com", "wrong")
        .await
        .expect_err("must fail");
    let exception = err
        .downcast_ref::<ApiException>()
        .expect("typed auth error");
    assert_eq!(exception.code, ErrorCode::Unauthorized);
    assert_eq!(exception.message, "credentials rejected");
}

#[tokio::test]
async fn sign_out_presents_the_session_token_and_broadcasts() {
    let (server_url, state) = spawn_auth_server().await.expect("spawn server");
    let provider = provider_for(&server_url);

    provider
        .sign_in("alice@example.com", "correct horse")
        .await
        .expect("sign in");
    let mut changes = provider.subscribe_changes();
    provider.sign_out().await.expect("sign out");

    let sign_outs = state.sign_outs.lock().await;
    assert_eq!(sign_outs.as_slice(), &["Bearer token-abc".to_string()]);

    let change = tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .expect("change timeout")
        .expect("change");
    assert_eq!(change, None);
}

#[tokio::test]
async fn sign_out_without_a_session_skips_the_remote_call() {
    let (server_url, state) = spawn_auth_server().await.expect("spawn server");
    let provider = provider_for(&server_url);

    provider.sign_out().await.expect("sign out");
    assert!(state.sign_outs.lock().await.is_empty());
}
