//! Todo API handlers. Every route requires a valid bearer access token.

use actix_web::{HttpResponse, delete, get, patch, post, put, web};
use tracing::info;

use crate::auth::BearerAuth;
use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateTodoRequest, PageQuery, ReorderEntry, TodoPageResponse, TodoResponse, UpdateTodoRequest,
};

/// Default page size.
const DEFAULT_PAGE_LIMIT: u64 = 50;
/// Largest allowed page size.
const MAX_PAGE_LIMIT: u64 = 100;

/// List all todo items in display order.
#[utoipa::path(
    get,
    path = "/api/v1/todos",
    tag = "Todos",
    responses(
        (status = 200, description = "All todo items", body = [TodoResponse]),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[get("")]
pub async fn list_todos(_auth: BearerAuth, pool: web::Data<DbPool>) -> AppResult<HttpResponse> {
    let items = db::todos::list_all(pool.connection()).await?;
    let response: Vec<TodoResponse> = items.into_iter().map(TodoResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}

/// List one page of todo items.
///
/// `limit` defaults to 50 and is capped at 100; `page` is 1-based and clamped
/// to the last non-empty page.
#[utoipa::path(
    get,
    path = "/api/v1/todos/page",
    tag = "Todos",
    params(
        ("limit" = Option<u64>, Query, description = "Page size (default 50, max 100)"),
        ("page" = Option<u64>, Query, description = "1-based page number"),
    ),
    responses(
        (status = 200, description = "One page of todo items", body = TodoPageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[get("/page")]
pub async fn page_todos(
    _auth: BearerAuth,
    pool: web::Data<DbPool>,
    query: web::Query<PageQuery>,
) -> AppResult<HttpResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);

    let total = db::todos::count_all(pool.connection()).await?;
    let total_pages = total.div_ceil(limit).max(1);
    let page = query.page.unwrap_or(1).clamp(1, total_pages);

    let items = db::todos::page(pool.connection(), limit, page).await?;

    Ok(HttpResponse::Ok().json(TodoPageResponse {
        items: items.into_iter().map(TodoResponse::from).collect(),
        page,
        limit,
        total,
        total_pages,
    }))
}

/// Get a single todo item.
#[utoipa::path(
    get,
    path = "/api/v1/todos/{id}",
    tag = "Todos",
    params(("id" = i32, Path, description = "Todo item id")),
    responses(
        (status = 200, description = "Todo item", body = TodoResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[get("/{id}")]
pub async fn get_todo(
    _auth: BearerAuth,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let item = db::todos::find_by_id(pool.connection(), id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Todo {}", id)))?;

    Ok(HttpResponse::Ok().json(TodoResponse::from(item)))
}

/// Create a todo item. Appended to the end of the list unless an explicit
/// order is given.
#[utoipa::path(
    post,
    path = "/api/v1/todos",
    tag = "Todos",
    request_body = CreateTodoRequest,
    responses(
        (status = 201, description = "Todo created", body = TodoResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[post("")]
pub async fn create_todo(
    auth: BearerAuth,
    pool: web::Data<DbPool>,
    body: web::Json<CreateTodoRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    if req.title.trim().is_empty() {
        return Err(AppError::InvalidInput("Title is required".to_string()));
    }

    let item = db::todos::insert(pool.connection(), req.title.trim(), req.order).await?;
    info!("Todo {} created by {}", item.id, auth.user.username);

    Ok(HttpResponse::Created().json(TodoResponse::from(item)))
}

/// Update a todo's title and completion flag.
#[utoipa::path(
    put,
    path = "/api/v1/todos/{id}",
    tag = "Todos",
    params(("id" = i32, Path, description = "Todo item id")),
    request_body = UpdateTodoRequest,
    responses(
        (status = 200, description = "Todo updated", body = TodoResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[put("/{id}")]
pub async fn update_todo(
    _auth: BearerAuth,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    body: web::Json<UpdateTodoRequest>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let req = body.into_inner();

    if req.title.trim().is_empty() {
        return Err(AppError::InvalidInput("Title is required".to_string()));
    }

    let item = db::todos::update(pool.connection(), id, req.title.trim(), req.is_completed)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Todo {}", id)))?;

    Ok(HttpResponse::Ok().json(TodoResponse::from(item)))
}

/// Delete a todo item.
#[utoipa::path(
    delete,
    path = "/api/v1/todos/{id}",
    tag = "Todos",
    params(("id" = i32, Path, description = "Todo item id")),
    responses(
        (status = 204, description = "Todo deleted"),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[delete("/{id}")]
pub async fn delete_todo(
    _auth: BearerAuth,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    if !db::todos::delete(pool.connection(), id).await? {
        return Err(AppError::NotFound(format!("Todo {}", id)));
    }

    Ok(HttpResponse::NoContent().finish())
}

/// Reorder todo items in one batch.
///
/// All updates apply in a single transaction; an unknown id fails the whole
/// batch.
#[utoipa::path(
    patch,
    path = "/api/v1/todos/reorder",
    tag = "Todos",
    request_body = [ReorderEntry],
    responses(
        (status = 204, description = "Order updated"),
        (status = 400, description = "Empty batch", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown todo id in batch", body = crate::error::ErrorResponse),
    ),
    security(("bearer_token" = []))
)]
#[patch("/reorder")]
pub async fn reorder_todos(
    _auth: BearerAuth,
    pool: web::Data<DbPool>,
    body: web::Json<Vec<ReorderEntry>>,
) -> AppResult<HttpResponse> {
    let entries = body.into_inner();

    if entries.is_empty() {
        return Err(AppError::InvalidInput(
            "Reorder batch must not be empty".to_string(),
        ));
    }

    let updates: Vec<(i32, i64)> = entries.iter().map(|e| (e.id, e.order)).collect();
    db::todos::reorder(pool.connection(), &updates).await?;

    Ok(HttpResponse::NoContent().finish())
}

/// Configure todo routes under `/todos`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // reorder and page before the {id} matcher
    cfg.service(
        web::scope("/todos")
            .service(page_todos)
            .service(reorder_todos)
            .service(list_todos)
            .service(create_todo)
            .service(get_todo)
            .service(update_todo)
            .service(delete_todo),
    );
}
