//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Todo API Server",
        version = "0.3.0",
        description = "Todo list API with rotating refresh-token session authentication"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Auth endpoints
        api::auth::register,
        api::auth::login,
        api::auth::refresh,
        api::auth::logout,
        api::auth::me,
        // Todo endpoints
        api::todos::list_todos,
        api::todos::page_todos,
        api::todos::get_todo,
        api::todos::create_todo,
        api::todos::update_todo,
        api::todos::delete_todo,
        api::todos::reorder_todos,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::ServiceHealth,
            api::health::ReadinessStatus,
            // Auth
            models::RegisterRequest,
            models::RegisterResponse,
            models::LoginRequest,
            models::AccessTokenResponse,
            models::MeResponse,
            // Todos
            models::TodoResponse,
            models::CreateTodoRequest,
            models::UpdateTodoRequest,
            models::ReorderEntry,
            models::TodoPageResponse,
            models::PageQuery,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "Registration, login, and session refresh"),
        (name = "Todos", description = "Todo item management")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add bearer token security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
