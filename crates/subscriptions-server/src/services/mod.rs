pub mod subscriptions;
pub mod total_cost;
pub mod users;

use crate::error::{AppError, AppResult};
use crate::models::Period;

fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn parse_period(field: &str, value: &str) -> AppResult<Period> {
    value
        .parse()
        .map_err(|e| AppError::Validation(format!("{field}: {e}")))
}
