use std::collections::BTreeMap;

use crate::db::{subscriptions, Database};
use crate::error::{AppError, AppResult};
use crate::models::{Period, SubscriptionFilter, TotalCostResponse};
use crate::services::parse_period;

/// Parses the required `[start, end]` bounds. Blank counts as missing.
pub fn parse_bounds(start: Option<&str>, end: Option<&str>) -> AppResult<(Period, Period)> {
    let (Some(start), Some(end)) = (
        start.filter(|s| !s.trim().is_empty()),
        end.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(AppError::Validation(
            "start_period and end_period are required".into(),
        ));
    };

    let start = parse_period("start_period", start)?;
    let end = parse_period("end_period", end)?;
    if end < start {
        return Err(AppError::Validation(format!(
            "end_period {end} is before start_period {start}"
        )));
    }
    Ok((start, end))
}

/// Echoes the filters that were actually supplied.
fn applied_filters(filter: &SubscriptionFilter) -> BTreeMap<String, String> {
    let mut applied = BTreeMap::new();
    if let Some(user_id) = filter.user_id {
        applied.insert("user_id".to_string(), user_id.to_string());
    }
    if let Some(service_name) = &filter.service_name {
        applied.insert("service_name".to_string(), service_name.clone());
    }
    applied
}

/// Total price of subscriptions that start at or after `start_period` and
/// are either ongoing or end at or before `end_period`.
///
/// Period validation happens before any query runs.
pub async fn total_cost(
    db: &Database,
    filter: SubscriptionFilter,
    start_period: Option<String>,
    end_period: Option<String>,
) -> AppResult<TotalCostResponse> {
    let (start, end) = parse_bounds(start_period.as_deref(), end_period.as_deref())?;
    let filters = applied_filters(&filter);

    let total = db
        .run(move |conn| Ok(subscriptions::total_cost(conn, &filter, start, end)?))
        .await?;

    Ok(TotalCostResponse {
        total_cost: total,
        period: format!("{start} to {end}"),
        filters,
    })
}
