//! Database operations for todo items.

use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::*;

use crate::error::{AppError, AppResult};

/// List all todos ordered by their sort key.
pub async fn list_all(db: &DatabaseConnection) -> AppResult<Vec<crate::entity::todo::Model>> {
    let items = crate::entity::todo::Entity::find()
        .order_by_asc(crate::entity::todo::Column::OrderIndex)
        .order_by_asc(crate::entity::todo::Column::Id)
        .all(db)
        .await?;

    Ok(items)
}

/// Count all todos.
pub async fn count_all(db: &DatabaseConnection) -> AppResult<u64> {
    let total = crate::entity::todo::Entity::find().count(db).await?;
    Ok(total)
}

/// Fetch one page of todos (offset pagination; `page` is 1-based).
pub async fn page(
    db: &DatabaseConnection,
    limit: u64,
    page: u64,
) -> AppResult<Vec<crate::entity::todo::Model>> {
    let items = crate::entity::todo::Entity::find()
        .order_by_asc(crate::entity::todo::Column::OrderIndex)
        .order_by_asc(crate::entity::todo::Column::Id)
        .offset((page - 1) * limit)
        .limit(limit)
        .all(db)
        .await?;

    Ok(items)
}

/// Find a todo by ID.
pub async fn find_by_id(
    db: &DatabaseConnection,
    id: i32,
) -> AppResult<Option<crate::entity::todo::Model>> {
    let item = crate::entity::todo::Entity::find_by_id(id).one(db).await?;
    Ok(item)
}

/// Insert a new todo. When `order_index` is None the item is appended to the
/// end of the list.
pub async fn insert(
    db: &DatabaseConnection,
    title: &str,
    order_index: Option<i64>,
) -> AppResult<crate::entity::todo::Model> {
    let order_index = match order_index {
        Some(v) => v,
        None => {
            let max: Option<i64> = crate::entity::todo::Entity::find()
                .select_only()
                .column_as(crate::entity::todo::Column::OrderIndex.max(), "max_order")
                .into_tuple()
                .one(db)
                .await?
                .flatten();
            max.unwrap_or(0) + 1
        }
    };

    let now = Utc::now();
    let model = crate::entity::todo::ActiveModel {
        title: Set(title.to_string()),
        is_completed: Set(false),
        order_index: Set(order_index),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let inserted = model.insert(db).await?;
    Ok(inserted)
}

/// Update a todo's title and completion flag. Returns None if the id is unknown.
pub async fn update(
    db: &DatabaseConnection,
    id: i32,
    title: &str,
    is_completed: bool,
) -> AppResult<Option<crate::entity::todo::Model>> {
    let Some(existing) = find_by_id(db, id).await? else {
        return Ok(None);
    };

    let mut active: crate::entity::todo::ActiveModel = existing.into();
    active.title = Set(title.to_string());
    active.is_completed = Set(is_completed);
    active.updated_at = Set(Utc::now());

    let updated = active.update(db).await?;
    Ok(Some(updated))
}

/// Delete a todo. Returns false if the id is unknown.
pub async fn delete(db: &DatabaseConnection, id: i32) -> AppResult<bool> {
    let result = crate::entity::todo::Entity::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected == 1)
}

/// Apply a batch of (id, order_index) updates in a single transaction.
///
/// Each update must hit exactly one row; an unknown id, including a row
/// deleted while the batch is in flight, rolls the whole batch back with
/// NotFound.
pub async fn reorder(db: &DatabaseConnection, updates: &[(i32, i64)]) -> AppResult<()> {
    let txn = db.begin().await?;
    let now = Utc::now();

    for (id, order_index) in updates {
        let result = crate::entity::todo::Entity::update_many()
            .filter(crate::entity::todo::Column::Id.eq(*id))
            .col_expr(
                crate::entity::todo::Column::OrderIndex,
                Expr::value(*order_index),
            )
            .col_expr(crate::entity::todo::Column::UpdatedAt, Expr::value(now))
            .exec(&txn)
            .await?;

        if result.rows_affected != 1 {
            txn.rollback().await?;
            return Err(AppError::NotFound(format!("Todo {}", id)));
        }
    }

    txn.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn exec_result(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_reorder_commits_when_every_row_matches() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_result(1), exec_result(1)])
            .into_connection();

        assert!(reorder(&db, &[(1, 10), (2, 20)]).await.is_ok());
    }

    #[tokio::test]
    async fn test_reorder_fails_when_a_row_vanishes_mid_batch() {
        // Second update matches nothing, as if the row was deleted after
        // the batch started.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_result(1), exec_result(0)])
            .into_connection();

        let result = reorder(&db, &[(1, 10), (2, 20)]).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reorder_fails_on_unknown_leading_id() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec_result(0)])
            .into_connection();

        let result = reorder(&db, &[(99, 10)]).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
