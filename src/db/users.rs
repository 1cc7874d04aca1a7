//! Database operations for users.

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::user::User;

/// Insert a new user with a pre-hashed password.
///
/// Returns `Conflict` if the username is already taken.
pub async fn insert(
    db: &DatabaseConnection,
    username: &str,
    password_hash: &str,
    password_salt: &str,
) -> AppResult<User> {
    // Fast path; racing inserts slip past this and are caught on the
    // unique index below.
    if find_by_username(db, username).await?.is_some() {
        return Err(AppError::Conflict("Username already taken".to_string()));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    let model = crate::entity::user::ActiveModel {
        id: Set(id),
        username: Set(username.to_string()),
        password_hash: Set(password_hash.to_string()),
        password_salt: Set(password_salt.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
    };

    crate::entity::user::Entity::insert(model)
        .exec(db)
        .await
        .map_err(|e| unique_violation_conflict(e.sql_err()).unwrap_or_else(|| e.into()))?;

    let inserted = crate::entity::user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| {
            crate::error::AppError::Database("Failed to fetch newly inserted user".to_string())
        })?;

    Ok(model_to_user(inserted))
}

/// Find a user by username.
pub async fn find_by_username(db: &DatabaseConnection, username: &str) -> AppResult<Option<User>> {
    let result = crate::entity::user::Entity::find()
        .filter(crate::entity::user::Column::Username.eq(username))
        .filter(crate::entity::user::Column::DeletedAt.is_null())
        .one(db)
        .await?;

    Ok(result.map(model_to_user))
}

/// Find a user by ID.
pub async fn find_by_id(db: &DatabaseConnection, id: Uuid) -> AppResult<Option<User>> {
    let result = crate::entity::user::Entity::find_by_id(id)
        .filter(crate::entity::user::Column::DeletedAt.is_null())
        .one(db)
        .await?;

    Ok(result.map(model_to_user))
}

fn model_to_user(m: crate::entity::user::Model) -> User {
    User {
        id: m.id,
        username: m.username,
        password_hash: m.password_hash,
        password_salt: m.password_salt,
        created_at: m.created_at,
    }
}

/// Translate a uniqueness violation on the username index into a Conflict.
/// Every other database failure stays a database error.
fn unique_violation_conflict(sql_err: Option<SqlErr>) -> Option<AppError> {
    match sql_err {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            Some(AppError::Conflict("Username already taken".to_string()))
        }
        _ => None,
    }
}
