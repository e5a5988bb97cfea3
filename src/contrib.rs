//! Contribution handling — member receipt submission, admin confirmation,
//! and the confirmation watcher hand-off.

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::errors::{Result, WorkflowError};
use crate::mailer::Mailer;
use crate::model::{Contribution, ContributionStatus};
use crate::notify;

/// Record a member's monthly contribution receipt as pending confirmation.
///
/// At most one non-rejected contribution may exist per (member, month);
/// a duplicate submission fails `ValidationFailed` before any write.
pub async fn submit_contribution(
    pool: &SqlitePool,
    member_id: &str,
    month: &str,
    amount: i64,
    receipt_url: &str,
) -> Result<Contribution> {
    validate_month(month)?;
    if amount <= 0 {
        return Err(WorkflowError::ValidationFailed(
            "amount must be positive".to_string(),
        ));
    }
    if receipt_url.trim().is_empty() {
        return Err(WorkflowError::ValidationFailed(
            "a receipt reference is required".to_string(),
        ));
    }
    db::get_application(pool, member_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("member {member_id}")))?;

    if db::has_effective_contribution(pool, member_id, month).await? {
        return Err(WorkflowError::ValidationFailed(format!(
            "a contribution for {month} has already been submitted"
        )));
    }

    let id = Uuid::new_v4().to_string();
    db::insert_contribution(pool, &id, member_id, month, amount, receipt_url, Utc::now()).await?;
    info!("Contribution {id} recorded for member {member_id} month {month}");

    db::get_contribution(pool, &id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("contribution {id}")))
}

/// Admin confirmation or rejection of a pending receipt. The watcher fires
/// on the transition into `confirmed`.
pub async fn review_contribution(
    pool: &SqlitePool,
    mailer: &Mailer,
    contribution_id: &str,
    decision: ContributionStatus,
    reviewer: &str,
) -> Result<Contribution> {
    if decision == ContributionStatus::Pending {
        return Err(WorkflowError::ValidationFailed(
            "decision must be confirmed or rejected".to_string(),
        ));
    }

    let before = db::get_contribution(pool, contribution_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("contribution {contribution_id}")))?;
    if before.status != ContributionStatus::Pending {
        return Err(WorkflowError::AlreadyProcessed(format!(
            "contribution is already {}",
            before.status.as_str()
        )));
    }

    if !db::set_contribution_status(pool, contribution_id, decision, reviewer, Utc::now()).await? {
        return Err(WorkflowError::AlreadyProcessed(
            "contribution was reviewed concurrently".to_string(),
        ));
    }

    let after = db::get_contribution(pool, contribution_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("contribution {contribution_id}")))?;

    notify::on_contribution_updated(pool, mailer, &before, &after).await;
    Ok(after)
}

fn validate_month(month: &str) -> Result<()> {
    // "YYYY-MM" — fixed width, then parse with a synthetic day to validate
    // both parts.
    let well_formed = month.len() == 7
        && NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_ok();
    if well_formed {
        Ok(())
    } else {
        Err(WorkflowError::ValidationFailed(format!(
            "invalid month {month:?}, expected YYYY-MM"
        )))
    }
}
