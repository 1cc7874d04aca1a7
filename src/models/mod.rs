//! API-facing domain models.

pub mod todo;
pub mod user;

// Re-export commonly used types
pub use todo::{
    CreateTodoRequest, PageQuery, ReorderEntry, TodoPageResponse, TodoResponse, UpdateTodoRequest,
};
pub use user::{
    AccessClaims, AccessTokenResponse, AuthenticatedUser, LoginRequest, MeResponse,
    RegisterRequest, RegisterResponse, User,
};
