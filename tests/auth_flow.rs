//! Integration tests for the bearer authentication gate.
//!
//! Runs the real actix app wiring (routes, extractor, error rendering)
//! against endpoints that do not need a database.

use std::sync::Arc;

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::http::StatusCode;
use actix_web::http::header;
use actix_web::{App, test, web};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use todo_api_lib::auth::create_access_token;
use todo_api_lib::config::{Config, Environment, REFRESH_COOKIE};
use todo_api_lib::error::AppResult;
use todo_api_lib::services::SessionService;
use todo_api_lib::services::session::{RefreshTokenStore, RotateOutcome, StoredRefreshToken};

/// Store holding no sessions. Logout without a cookie never reaches the
/// store at all, and logout with a stray cookie revokes nothing.
struct EmptyStore;

#[async_trait::async_trait]
impl RefreshTokenStore for EmptyStore {
    async fn insert(
        &self,
        _user_id: Uuid,
        _token_hash: &str,
        _expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn find_by_hash(&self, _token_hash: &str) -> AppResult<Option<StoredRefreshToken>> {
        Ok(None)
    }

    async fn rotate(
        &self,
        _presented_hash: &str,
        _replacement_hash: &str,
        _new_expires_at: DateTime<Utc>,
    ) -> AppResult<RotateOutcome> {
        Ok(RotateOutcome::NotFound)
    }

    async fn revoke_by_hash(&self, _token_hash: &str) -> AppResult<bool> {
        Ok(false)
    }

    async fn revoke_descendants(&self, _start_hash: &str) -> AppResult<u64> {
        Ok(0)
    }
}

fn test_config() -> Config {
    Config {
        environment: Environment::Development,
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "postgres://unused".to_string(),
        jwt_secret: SecretString::from("integration-test-secret"),
        access_token_ttl_secs: 3600,
        refresh_token_ttl_secs: 2_592_000,
        token_cleanup_grace_secs: 604_800,
    }
}

macro_rules! test_app {
    ($config:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($config))
                .service(todo_api_lib::api::health::health)
                .service(web::scope("/auth").service(todo_api_lib::api::auth::me)),
        )
        .await
    };
}

#[actix_web::test]
async fn test_health_needs_no_credentials() {
    let app = test_app!(test_config());

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["service"], "todo-api");
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn test_logout_without_cookie_is_204_and_clears_cookie() {
    let sessions = SessionService::new(Arc::new(EmptyStore), 2_592_000);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(test_config()))
            .app_data(web::Data::new(sessions))
            .service(web::scope("/auth").service(todo_api_lib::api::auth::logout)),
    )
    .await;

    // Twice: logout is idempotent whether or not a session ever existed.
    for _ in 0..2 {
        let req = test::TestRequest::post().uri("/auth/logout").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == REFRESH_COOKIE)
            .expect("removal cookie should be set");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
        assert!(cookie.value().is_empty());
    }
}

#[actix_web::test]
async fn test_logout_with_unknown_cookie_is_still_204() {
    let sessions = SessionService::new(Arc::new(EmptyStore), 2_592_000);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(test_config()))
            .app_data(web::Data::new(sessions))
            .service(web::scope("/auth").service(todo_api_lib::api::auth::logout)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .cookie(actix_web::cookie::Cookie::new(
            REFRESH_COOKIE,
            "todo_rt_long_forgotten",
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn test_me_without_token_is_401() {
    let app = test_app!(test_config());

    let req = test::TestRequest::get().uri("/auth/me").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "UNAUTHORIZED");
    assert_eq!(body["message"], "Authentication required");
}

#[actix_web::test]
async fn test_me_with_garbage_token_is_401() {
    let app = test_app!(test_config());

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header((header::AUTHORIZATION, "Bearer not.a.jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_me_with_wrong_secret_token_is_401() {
    let config = test_config();
    let user_id = uuid::Uuid::new_v4();
    let foreign_secret = SecretString::from("some-other-signing-secret");
    let token = create_access_token(user_id, "mallory", &foreign_secret, 3600).unwrap();

    let app = test_app!(config);

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_me_with_valid_token_returns_principal() {
    let config = test_config();
    let user_id = uuid::Uuid::new_v4();
    let token = create_access_token(user_id, "alice", &config.jwt_secret, 3600).unwrap();

    let app = test_app!(config);

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], user_id.to_string());
    assert_eq!(body["username"], "alice");
}
