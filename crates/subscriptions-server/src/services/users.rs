use rusqlite::TransactionBehavior;
use uuid::Uuid;

use crate::db::{self, users, Database};
use crate::error::{AppError, AppResult};
use crate::models::{CreateUserRequest, Pagination, UpdateUserRequest, User};
use crate::services::require_non_empty;

fn validate_email(email: &str) -> AppResult<()> {
    require_non_empty("email", email)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(AppError::Validation(format!("'{email}' is not a valid email"))),
    }
}

/// The UNIQUE index on `users.email` is the last line against two requests
/// racing past the lookup.
fn unique_email(err: AppError, email: &str) -> AppError {
    match err {
        AppError::Database(e) if db::violates(&e, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) => {
            AppError::DuplicateEmail(email.to_string())
        }
        other => other,
    }
}

pub async fn create(db: &Database, req: CreateUserRequest) -> AppResult<User> {
    require_non_empty("name", &req.name)?;
    validate_email(&req.email)?;

    db.run(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if users::find_by_email(&tx, &req.email, None)?.is_some() {
            return Err(AppError::DuplicateEmail(req.email));
        }

        let now = db::now();
        let user = User {
            id: Uuid::new_v4(),
            name: req.name,
            email: req.email,
            created_at: now.clone(),
            updated_at: now,
        };
        users::insert(&tx, &user).map_err(|e| unique_email(e.into(), &user.email))?;
        tx.commit()?;

        tracing::debug!(user_id = %user.id, "Inserted user");
        Ok(user)
    })
    .await
}

pub async fn get(db: &Database, id: Uuid) -> AppResult<User> {
    db.run(move |conn| {
        users::get(conn, id)?.ok_or_else(|| AppError::NotFound("User not found".into()))
    })
    .await
}

pub async fn list(db: &Database, page: Pagination) -> AppResult<Vec<User>> {
    db.run(move |conn| Ok(users::list(conn, page)?)).await
}

/// Applies a partial update and returns the stored result. A changed email
/// must not belong to any other user; keeping one's own address is fine.
pub async fn update(db: &Database, id: Uuid, req: UpdateUserRequest) -> AppResult<User> {
    if req.is_empty() {
        return Err(AppError::NoFieldsToUpdate);
    }
    if let Some(name) = &req.name {
        require_non_empty("name", name)?;
    }
    if let Some(email) = &req.email {
        validate_email(email)?;
    }

    db.run(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(email) = &req.email {
            if users::find_by_email(&tx, email, Some(id))?.is_some() {
                return Err(AppError::DuplicateEmail(email.clone()));
            }
        }

        let updated = users::update(&tx, id, &req, db::now()).map_err(|e| match &req.email {
            Some(email) => unique_email(e, email),
            None => e,
        })?;
        if !updated {
            return Err(AppError::NotFound("User not found".into()));
        }

        let user = users::get(&tx, id)?
            .ok_or_else(|| AppError::Internal(format!("user {id} vanished mid-update")))?;
        tx.commit()?;
        Ok(user)
    })
    .await
}

pub async fn delete(db: &Database, id: Uuid) -> AppResult<()> {
    db.run(move |conn| {
        if users::delete(conn, id)? {
            Ok(())
        } else {
            Err(AppError::NotFound("User not found".into()))
        }
    })
    .await
}
