use rusqlite::TransactionBehavior;

use crate::db::{self, subscriptions, Database};
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateSubscriptionRequest, Pagination, Subscription, SubscriptionFilter,
    UpdateSubscriptionRequest,
};
use crate::services::{parse_period, require_non_empty};

fn validate_price(price: i64) -> AppResult<()> {
    if price < 1 {
        return Err(AppError::Validation("price must be at least 1".into()));
    }
    Ok(())
}

/// Both dates must be `MM-YYYY`, and an end date may not precede the start.
fn validate_window(start_date: &str, end_date: Option<&str>) -> AppResult<()> {
    let start = parse_period("start_date", start_date)?;
    if let Some(end_date) = end_date {
        let end = parse_period("end_date", end_date)?;
        if end < start {
            return Err(AppError::Validation(format!(
                "end_date {end} is before start_date {start}"
            )));
        }
    }
    Ok(())
}

fn not_found() -> AppError {
    AppError::NotFound("Subscription not found".into())
}

pub async fn create(db: &Database, req: CreateSubscriptionRequest) -> AppResult<Subscription> {
    require_non_empty("service_name", &req.service_name)?;
    validate_price(req.price)?;
    validate_window(&req.start_date, req.end_date.as_deref())?;

    db.run(move |conn| {
        subscriptions::insert(conn, &req, db::now()).map_err(|e| {
            if db::violates(&e, rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) {
                AppError::Validation(format!("user {} does not exist", req.user_id))
            } else {
                AppError::Database(e)
            }
        })
    })
    .await
}

pub async fn get(db: &Database, id: i64) -> AppResult<Subscription> {
    db.run(move |conn| subscriptions::get(conn, id)?.ok_or_else(not_found))
        .await
}

pub async fn list(
    db: &Database,
    filter: SubscriptionFilter,
    page: Pagination,
) -> AppResult<Vec<Subscription>> {
    db.run(move |conn| Ok(subscriptions::list(conn, &filter, page)?))
        .await
}

/// Applies a partial update and returns the stored result.
pub async fn update(
    db: &Database,
    id: i64,
    req: UpdateSubscriptionRequest,
) -> AppResult<Subscription> {
    if req.is_empty() {
        return Err(AppError::NoFieldsToUpdate);
    }
    if let Some(service_name) = &req.service_name {
        require_non_empty("service_name", service_name)?;
    }
    if let Some(price) = req.price {
        validate_price(price)?;
    }
    if let Some(start_date) = &req.start_date {
        parse_period("start_date", start_date)?;
    }
    if let Some(end_date) = &req.end_date {
        parse_period("end_date", end_date)?;
    }

    db.run(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // The window check needs whichever bound the request leaves untouched
        let existing = subscriptions::get(&tx, id)?.ok_or_else(not_found)?;
        let start_date = req.start_date.as_deref().unwrap_or(&existing.start_date);
        let end_date = req.end_date.as_deref().or(existing.end_date.as_deref());
        validate_window(start_date, end_date)?;

        if !subscriptions::update(&tx, id, &req, db::now())? {
            return Err(not_found());
        }
        let updated = subscriptions::get(&tx, id)?.ok_or_else(not_found)?;
        tx.commit()?;
        Ok(updated)
    })
    .await
}

pub async fn delete(db: &Database, id: i64) -> AppResult<()> {
    db.run(move |conn| {
        if subscriptions::delete(conn, id)? {
            Ok(())
        } else {
            Err(not_found())
        }
    })
    .await
}
