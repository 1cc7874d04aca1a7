//! Actix-web extractor implementing the request authorization gate.
//!
//! Stateless: only the signing secret from config is consulted, so any number
//! of workers can verify tokens without shared session state. The refresh
//! endpoint is the sole place that touches the token store.

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::http::header;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, web};
use std::future::{Ready, ready};
use uuid::Uuid;

use crate::auth::token::verify_access_token;
use crate::config::Config;
use crate::error::ErrorResponse;
use crate::models::AuthenticatedUser;

/// Authentication error for extractors. Always renders the same opaque 401.
#[derive(Debug)]
pub struct AuthError {
    message: String,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for AuthError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::UNAUTHORIZED).json(ErrorResponse {
            error: "UNAUTHORIZED".to_string(),
            message: self.message.clone(),
        })
    }
}

fn unauthorized() -> AuthError {
    AuthError {
        message: "Authentication required".to_string(),
    }
}

/// Extractor that requires a valid bearer access token.
///
/// Use this in handlers that require authentication:
/// ```ignore
/// async fn protected_handler(auth: BearerAuth) -> impl Responder {
///     // auth.user contains the verified principal
/// }
/// ```
pub struct BearerAuth {
    pub user: AuthenticatedUser,
}

impl FromRequest for BearerAuth {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(config) = req.app_data::<web::Data<Config>>() else {
            return ready(Err(AuthError {
                message: "Internal configuration error".to_string(),
            }));
        };

        let token = match req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(unauthorized())),
        };

        match verify_access_token(token, &config.jwt_secret) {
            Ok(claims) => {
                let Ok(id) = Uuid::parse_str(&claims.user_id) else {
                    tracing::warn!("Access token carried a malformed user id");
                    return ready(Err(unauthorized()));
                };
                ready(Ok(BearerAuth {
                    user: AuthenticatedUser {
                        id,
                        username: claims.username,
                    },
                }))
            }
            Err(reason) => {
                tracing::debug!("Bearer token rejected: {}", reason);
                ready(Err(unauthorized()))
            }
        }
    }
}
