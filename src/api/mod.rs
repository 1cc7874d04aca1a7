//! API endpoint modules.

pub mod auth;
pub mod health;
pub mod openapi;
pub mod todos;

pub use auth::configure_routes as configure_auth_routes;
pub use health::configure_health_routes;
pub use openapi::ApiDoc;
pub use todos::configure_routes as configure_todo_routes;
