use rusqlite::{Connection, OptionalExtension, Row};

use crate::db::query::{ChangeSet, Column, Predicate};
use crate::db::users::uuid_at;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateSubscriptionRequest, Pagination, Period, Subscription, SubscriptionFilter,
    UpdateSubscriptionRequest,
};

const SUB_COLS: &str =
    "id, service_name, price, user_id, start_date, end_date, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionColumn {
    ServiceName,
    Price,
    StartDate,
    EndDate,
}

impl Column for SubscriptionColumn {
    fn name(self) -> &'static str {
        match self {
            SubscriptionColumn::ServiceName => "service_name",
            SubscriptionColumn::Price => "price",
            SubscriptionColumn::StartDate => "start_date",
            SubscriptionColumn::EndDate => "end_date",
        }
    }
}

fn row_to_subscription(row: &Row) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        service_name: row.get(1)?,
        price: row.get(2)?,
        user_id: uuid_at(row, 3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// SQL expression turning an `MM-YYYY` column into its `YYYYMM` integer,
/// matching `Period::sort_key`.
fn period_key(column: &'static str) -> String {
    format!(
        "(CAST(substr({column}, 4, 4) AS INTEGER) * 100 + CAST(substr({column}, 1, 2) AS INTEGER))"
    )
}

fn apply_filter(predicate: &mut Predicate, filter: &SubscriptionFilter) {
    if let Some(user_id) = filter.user_id {
        predicate.eq("user_id", user_id.to_string());
    }
    if let Some(service_name) = &filter.service_name {
        predicate.contains("service_name", service_name);
    }
}

pub fn insert(
    conn: &Connection,
    req: &CreateSubscriptionRequest,
    now: String,
) -> rusqlite::Result<Subscription> {
    conn.execute(
        "INSERT INTO subscriptions (service_name, price, user_id, start_date, end_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            req.service_name,
            req.price,
            req.user_id.to_string(),
            req.start_date,
            req.end_date,
            now,
            now
        ],
    )?;

    Ok(Subscription {
        id: conn.last_insert_rowid(),
        service_name: req.service_name.clone(),
        price: req.price,
        user_id: req.user_id,
        start_date: req.start_date.clone(),
        end_date: req.end_date.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn get(conn: &Connection, id: i64) -> rusqlite::Result<Option<Subscription>> {
    conn.query_row(
        &format!("SELECT {SUB_COLS} FROM subscriptions WHERE id = ?1"),
        rusqlite::params![id],
        row_to_subscription,
    )
    .optional()
}

/// Matching subscriptions, newest first. `id` breaks ties between rows
/// created in the same millisecond so pages never overlap.
pub fn list(
    conn: &Connection,
    filter: &SubscriptionFilter,
    page: Pagination,
) -> rusqlite::Result<Vec<Subscription>> {
    let mut predicate = Predicate::new();
    apply_filter(&mut predicate, filter);
    let tail = predicate.paginate(page.limit, page.offset);

    let sql = format!(
        "SELECT {SUB_COLS} FROM subscriptions {} ORDER BY created_at DESC, id DESC{tail}",
        predicate.where_clause()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(predicate.params(), row_to_subscription)?;
    rows.collect()
}

/// Applies the supplied fields. `Ok(false)` means no subscription has `id`.
pub fn update(
    conn: &Connection,
    id: i64,
    changes: &UpdateSubscriptionRequest,
    updated_at: String,
) -> AppResult<bool> {
    let mut set = ChangeSet::new();
    if let Some(service_name) = &changes.service_name {
        set.set(SubscriptionColumn::ServiceName, service_name.clone());
    }
    if let Some(price) = changes.price {
        set.set(SubscriptionColumn::Price, price);
    }
    if let Some(start_date) = &changes.start_date {
        set.set(SubscriptionColumn::StartDate, start_date.clone());
    }
    if let Some(end_date) = &changes.end_date {
        set.set(SubscriptionColumn::EndDate, end_date.clone());
    }
    if set.is_empty() {
        return Err(AppError::NoFieldsToUpdate);
    }

    let (sql, params) = set.into_update("subscriptions", "id", id, updated_at);
    let affected = conn.execute(
        &sql,
        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
    )?;
    Ok(affected > 0)
}

/// `Ok(false)` means no subscription has `id`.
pub fn delete(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let affected = conn.execute(
        "DELETE FROM subscriptions WHERE id = ?1",
        rusqlite::params![id],
    )?;
    Ok(affected > 0)
}

/// Sum of `price` over subscriptions starting no earlier than `start` and
/// either ongoing or ending no later than `end`. Periods are compared as
/// `YYYYMM` integers. One statement, so one snapshot.
pub fn total_cost(
    conn: &Connection,
    filter: &SubscriptionFilter,
    start: Period,
    end: Period,
) -> rusqlite::Result<i64> {
    let mut predicate = Predicate::new();

    let start_idx = predicate.bind(start.sort_key());
    predicate.push(format!("{} >= ?{start_idx}", period_key("start_date")));
    let end_idx = predicate.bind(end.sort_key());
    predicate.push(format!(
        "(end_date IS NULL OR {} <= ?{end_idx})",
        period_key("end_date")
    ));
    apply_filter(&mut predicate, filter);

    conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(price), 0) FROM subscriptions {}",
            predicate.where_clause()
        ),
        predicate.params(),
        |row| row.get(0),
    )
}
