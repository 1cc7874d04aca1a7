//! Authentication endpoints: register, login, refresh, logout, me.
//!
//! Two credential channels, deliberately separate. The short-lived access
//! token travels in the response body and comes back as a bearer header; the
//! long-lived refresh secret travels only in an HTTP-only cookie scoped to
//! these routes, so page scripts can never read it.

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use tracing::info;

use crate::auth::{BearerAuth, create_access_token};
use crate::config::{Config, REFRESH_COOKIE};
use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{
    AccessTokenResponse, LoginRequest, MeResponse, RegisterRequest, RegisterResponse,
};
use crate::services::SessionService;
use crate::services::password::{hash_password, verify_password};

/// Cookie path: the refresh secret is only ever needed by these routes.
const COOKIE_PATH: &str = "/api/v1/auth";

/// Build the refresh cookie carrying a newly issued secret.
fn refresh_cookie(config: &Config, secret: String) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, secret)
        .path(COOKIE_PATH)
        .http_only(true)
        .secure(config.environment.is_production())
        .same_site(SameSite::None)
        .max_age(CookieDuration::seconds(config.refresh_token_ttl_secs as i64))
        .finish()
}

/// Build an expired cookie that instructs the browser to drop the secret.
fn removal_cookie(config: &Config) -> Cookie<'static> {
    let mut cookie = refresh_cookie(config, String::new());
    cookie.set_max_age(CookieDuration::ZERO);
    cookie
}

/// Register a new account.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Missing fields", body = crate::error::ErrorResponse),
        (status = 409, description = "Username taken", body = crate::error::ErrorResponse),
    )
)]
#[post("/register")]
pub async fn register(
    pool: web::Data<DbPool>,
    body: web::Json<RegisterRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::InvalidInput(
            "Username and password are required".to_string(),
        ));
    }

    let (password_hash, password_salt) = hash_password(&req.password);
    let user = db::users::insert(
        pool.connection(),
        req.username.trim(),
        &password_hash,
        &password_salt,
    )
    .await?;

    info!("Registered new account: {}", user.username);
    Ok(HttpResponse::Created().json(RegisterResponse { id: user.id }))
}

/// Log in with username and password.
///
/// Issues an access token in the body and roots a fresh refresh token
/// lineage delivered via cookie.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AccessTokenResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
    )
)]
#[post("/login")]
pub async fn login(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    sessions: web::Data<SessionService>,
    body: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    // Unknown username and wrong password are indistinguishable from outside.
    let user = db::users::find_by_username(pool.connection(), &req.username)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&req.password, &user.password_hash, &user.password_salt) {
        return Err(AppError::InvalidCredentials);
    }

    let issued = sessions.start_session(user.id).await?;
    let access_token = create_access_token(
        user.id,
        &user.username,
        &config.jwt_secret,
        config.access_token_ttl_secs,
    )?;

    info!("Session started for {}", user.username);
    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(&config, issued.secret))
        .json(AccessTokenResponse { access_token }))
}

/// Rotate the refresh token and issue a fresh access token.
///
/// The presented cookie secret is single-use. Replay of an already-rotated
/// secret invalidates the whole session lineage.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "Token refreshed", body = AccessTokenResponse),
        (status = 401, description = "Missing, invalid, or replayed refresh token", body = crate::error::ErrorResponse),
    )
)]
#[post("/refresh")]
pub async fn refresh(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    sessions: web::Data<SessionService>,
) -> AppResult<HttpResponse> {
    let cookie = req.cookie(REFRESH_COOKIE).ok_or(AppError::RefreshInvalid)?;

    let rotated = sessions.rotate(cookie.value()).await?;

    // The account may have been removed since the session started.
    let user = db::users::find_by_id(pool.connection(), rotated.user_id)
        .await?
        .ok_or(AppError::RefreshInvalid)?;

    let access_token = create_access_token(
        user.id,
        &user.username,
        &config.jwt_secret,
        config.access_token_ttl_secs,
    )?;

    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(&config, rotated.refresh.secret))
        .json(AccessTokenResponse { access_token }))
}

/// Log out, revoking the refresh token if one is presented.
///
/// Idempotent: succeeds with 204 whether or not a valid cookie arrives.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    responses(
        (status = 204, description = "Logged out"),
    )
)]
#[post("/logout")]
pub async fn logout(
    req: HttpRequest,
    config: web::Data<Config>,
    sessions: web::Data<SessionService>,
) -> AppResult<HttpResponse> {
    if let Some(cookie) = req.cookie(REFRESH_COOKIE) {
        sessions.logout(cookie.value()).await?;
    }

    Ok(HttpResponse::NoContent()
        .cookie(removal_cookie(&config))
        .finish())
}

/// Return the principal behind the presented bearer token.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current principal", body = MeResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[get("/me")]
pub async fn me(auth: BearerAuth) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(MeResponse {
        id: auth.user.id,
        username: auth.user.username,
    }))
}

/// Configure auth routes under `/auth`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(register)
            .service(login)
            .service(refresh)
            .service(logout)
            .service(me),
    );
}
