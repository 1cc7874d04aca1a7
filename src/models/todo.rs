//! Todo item request/response models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Todo item as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodoResponse {
    pub id: i32,
    pub title: String,
    pub is_completed: bool,
    pub order: i64,
}

impl From<crate::entity::todo::Model> for TodoResponse {
    fn from(m: crate::entity::todo::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            is_completed: m.is_completed,
            order: m.order_index,
        }
    }
}

/// Create request. When `order` is omitted the item is appended to the end.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoRequest {
    pub title: String,
    pub order: Option<i64>,
}

/// Update request; only title and completion flag are mutable.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodoRequest {
    pub id: i32,
    pub title: String,
    pub is_completed: bool,
}

/// One entry of a batched reorder request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderEntry {
    pub id: i32,
    pub order: i64,
}

/// Paged list response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodoPageResponse {
    pub items: Vec<TodoResponse>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// Pagination query parameters.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PageQuery {
    pub limit: Option<u64>,
    pub page: Option<u64>,
}
