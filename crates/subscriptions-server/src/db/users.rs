use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::query::{ChangeSet, Column, Predicate};
use crate::error::{AppError, AppResult};
use crate::models::{Pagination, UpdateUserRequest, User};

const USER_COLS: &str = "id, name, email, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserColumn {
    Name,
    Email,
}

impl Column for UserColumn {
    fn name(self) -> &'static str {
        match self {
            UserColumn::Name => "name",
            UserColumn::Email => "email",
        }
    }
}

/// Reads a UUID stored in its hyphenated text form.
pub(crate) fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn insert(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            user.id.to_string(),
            user.name,
            user.email,
            user.created_at,
            user.updated_at
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
        rusqlite::params![id.to_string()],
        row_to_user,
    )
    .optional()
}

/// Exact, case-sensitive email lookup. `excluding` skips one user, so an
/// update that keeps its own address does not collide with itself.
pub fn find_by_email(
    conn: &Connection,
    email: &str,
    excluding: Option<Uuid>,
) -> rusqlite::Result<Option<User>> {
    let mut predicate = Predicate::new();
    predicate.eq("email", email.to_string());
    if let Some(id) = excluding {
        let idx = predicate.bind(id.to_string());
        predicate.push(format!("id != ?{idx}"));
    }

    conn.query_row(
        &format!(
            "SELECT {USER_COLS} FROM users {} LIMIT 1",
            predicate.where_clause()
        ),
        predicate.params(),
        row_to_user,
    )
    .optional()
}

/// Newest first; rowid breaks ties between users created in the same
/// millisecond so pages never overlap.
pub fn list(conn: &Connection, page: Pagination) -> rusqlite::Result<Vec<User>> {
    let mut predicate = Predicate::new();
    let tail = predicate.paginate(page.limit, page.offset);
    let sql = format!("SELECT {USER_COLS} FROM users ORDER BY created_at DESC, rowid DESC{tail}");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(predicate.params(), row_to_user)?;
    rows.collect()
}

/// Applies the supplied fields. `Ok(false)` means no user has `id`.
pub fn update(
    conn: &Connection,
    id: Uuid,
    changes: &UpdateUserRequest,
    updated_at: String,
) -> AppResult<bool> {
    let mut set = ChangeSet::new();
    if let Some(name) = &changes.name {
        set.set(UserColumn::Name, name.clone());
    }
    if let Some(email) = &changes.email {
        set.set(UserColumn::Email, email.clone());
    }
    if set.is_empty() {
        return Err(AppError::NoFieldsToUpdate);
    }

    let (sql, params) = set.into_update("users", "id", id.to_string(), updated_at);
    let affected = conn.execute(
        &sql,
        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
    )?;
    Ok(affected > 0)
}

/// `Ok(false)` means no user has `id`.
pub fn delete(conn: &Connection, id: Uuid) -> rusqlite::Result<bool> {
    let affected = conn.execute(
        "DELETE FROM users WHERE id = ?1",
        rusqlite::params![id.to_string()],
    )?;
    Ok(affected > 0)
}
