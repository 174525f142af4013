//! AuthClient against an in-process stub of the Auth service.

use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use gatekeep_core::storage::{AuthCookieJar, CookieManager, CredentialStorage, MemoryStorage};
use gatekeep_core::{AuthClient, AuthError, AuthGateway, Authenticator, SessionStore};

const PASSWORD: &str = "correct-horse";

fn user_json() -> Value {
    json!({
        "id": 7,
        "username": "ada",
        "email": "ada@example.com",
        "full_name": "Ada Lovelace",
        "is_active": true,
        "is_superuser": true,
        "org_id": 1,
        "role": "super_admin",
        "created_at": "2024-03-05T14:30:00.123456",
    })
}

async fn login(Json(body): Json<Value>) -> Response {
    match (body["username"].as_str(), body["password"].as_str()) {
        (Some("ada"), Some(PASSWORD)) => (
            [(header::SET_COOKIE, "access_token=cookie-1; HttpOnly; Path=/")],
            Json(json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "user": user_json(),
            })),
        )
            .into_response(),
        (Some("boom"), _) => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid username or password"})),
        )
            .into_response(),
    }
}

async fn me(headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer access-1");
    if authorized {
        Json(user_json()).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid or expired token"})),
        )
            .into_response()
    }
}

async fn refresh(Json(body): Json<Value>) -> Response {
    if body["refresh_token"] == "refresh-1" {
        Json(json!({"access_token": "access-2", "refresh_token": "refresh-1"})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid or expired refresh token"})),
        )
            .into_response()
    }
}

async fn logout() -> Response {
    Json(json!({"message": "Logged out successfully"})).into_response()
}

async fn spawn_stub() -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn client() -> (AuthClient, Arc<AuthCookieJar>) {
    let jar = Arc::new(AuthCookieJar::new());
    let client = AuthClient::new(&spawn_stub().await, jar.clone()).unwrap();
    (client, jar)
}

#[tokio::test]
async fn test_login_returns_tokens_user_and_cookie() {
    let (client, jar) = client().await;

    let response = client.login("ada", PASSWORD).await.unwrap();

    assert_eq!(response.access_token, "access-1");
    assert_eq!(response.refresh_token, "refresh-1");
    assert_eq!(response.user.username, "ada");
    assert!(response.user.is_superuser);
    assert!(jar.contains("access_token"));
}

#[tokio::test]
async fn test_login_rejected_carries_detail() {
    let (client, _) = client().await;
    assert_eq!(
        client.login("ada", "wrong").await.unwrap_err(),
        AuthError::InvalidCredentials("Invalid username or password".to_string())
    );
}

#[tokio::test]
async fn test_login_server_error_is_network_error() {
    let (client, _) = client().await;
    assert!(matches!(
        client.login("boom", PASSWORD).await,
        Err(AuthError::NetworkError(_))
    ));
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    // Grab a free port and release it so nothing is listening there
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AuthClient::new(&format!("http://{}", addr), Arc::new(AuthCookieJar::new())).unwrap();
    assert!(matches!(
        client.login("ada", PASSWORD).await,
        Err(AuthError::NetworkError(_))
    ));
}

#[tokio::test]
async fn test_current_user() {
    let (client, _) = client().await;
    let user = client.current_user("access-1").await.unwrap();
    assert_eq!(user.display_name(), "Ada Lovelace");

    assert_eq!(
        client.current_user("expired").await.unwrap_err(),
        AuthError::Unauthorized
    );
}

#[tokio::test]
async fn test_refresh() {
    let (client, _) = client().await;
    let pair = client.refresh("refresh-1").await.unwrap();
    assert_eq!(pair.access_token, "access-2");
    assert_eq!(pair.refresh_token, "refresh-1");

    assert_eq!(
        client.refresh("revoked").await.unwrap_err(),
        AuthError::RefreshRejected
    );
}

#[tokio::test]
async fn test_logout_is_ok() {
    let (client, _) = client().await;
    assert!(client.logout("access-1").await.is_ok());
    // Status codes are ignored; only transport failures surface
    assert!(client.logout("whatever").await.is_ok());
}

#[tokio::test]
async fn test_login_then_logout_end_to_end() {
    let (client, jar) = client().await;
    let storage = Arc::new(MemoryStorage::new());
    let store = Arc::new(SessionStore::new(storage.clone(), jar.clone()));
    let auth = Authenticator::new(store.clone(), Arc::new(client));

    let user = auth.login("ada", PASSWORD).await.unwrap();
    assert_eq!(user.username, "ada");
    assert!(store.is_authenticated());
    assert!(store.is_admin());
    assert!(jar.contains("access_token"));

    auth.logout().await;
    assert!(!store.is_authenticated());
    assert!(storage.is_empty());
    assert!(!jar.contains("access_token"));

    // Clearing again is harmless
    jar.clear_auth_cookies();
    assert!(!storage.contains("gatekeep_access_token"));
}
