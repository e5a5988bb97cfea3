//! Endorsement token service — mints and validates the single-use
//! capability that lets an unauthenticated supervising pastor act on one
//! application.
//!
//! Single-use is enforced by the endorsement status guard, not by deleting
//! the token: once `pastor_endorsement_status` leaves `pending`, the stored
//! token no longer authorizes anything.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::errors::{Result, WorkflowError};
use crate::mailer::Mailer;
use crate::model::{Application, Decision, EndorsementStatus};
use crate::notify;

/// Mint a fresh opaque token value (UUIDv4, 122 bits of randomness).
pub fn mint() -> String {
    Uuid::new_v4().to_string()
}

/// Issue (or explicitly re-issue) a token for an existing application.
///
/// Overwrites any unconsumed token, invalidating the old link, and records
/// the issue in the audit log. Fails `AlreadyProcessed` once the
/// endorsement has been decided.
pub async fn issue(pool: &SqlitePool, application_id: &str) -> Result<String> {
    let app = db::get_application(pool, application_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("application {application_id}")))?;

    if app.pastor_endorsement_status != EndorsementStatus::Pending {
        return Err(WorkflowError::AlreadyProcessed(
            "endorsement has already been processed".to_string(),
        ));
    }

    let token = mint();
    let now = Utc::now();
    if !db::replace_endorsement_token(pool, application_id, &token, now).await? {
        // Lost a race with a concurrent consume.
        return Err(WorkflowError::AlreadyProcessed(
            "endorsement has already been processed".to_string(),
        ));
    }
    db::log_endorsement_issue(pool, &token, application_id, now).await?;
    Ok(token)
}

/// Look up the unique application bound to this token.
///
/// The token is the sole credential on this path: no session is required.
/// Fails `NotFound` when no application carries the token and
/// `AlreadyProcessed` when the endorsement is no longer pending.
pub async fn validate(pool: &SqlitePool, token: &str) -> Result<Application> {
    let app = db::find_application_by_token(pool, token)
        .await?
        .ok_or_else(|| {
            WorkflowError::NotFound("Invalid or expired endorsement link".to_string())
        })?;

    if app.pastor_endorsement_status != EndorsementStatus::Pending {
        return Err(WorkflowError::AlreadyProcessed(
            "This endorsement has already been processed".to_string(),
        ));
    }
    Ok(app)
}

/// Record the pastor's decision on a pending endorsement.
///
/// The write is conditioned on the endorsement still being pending, so a
/// double submission (or a concurrent consume) observes zero rows affected
/// and fails `AlreadyProcessed` without mutating anything.
pub async fn consume(
    pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    application_id: &str,
    decision: Decision,
    notes: Option<&str>,
    actor: &str,
) -> Result<Application> {
    let before = db::get_application(pool, application_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("application {application_id}")))?;

    if before.pastor_endorsement_status != EndorsementStatus::Pending {
        return Err(WorkflowError::AlreadyProcessed(
            "This endorsement has already been processed".to_string(),
        ));
    }

    let new_status = match decision {
        Decision::Approved => EndorsementStatus::Approved,
        Decision::Rejected => EndorsementStatus::Rejected,
    };
    let derived = crate::model::derive_status(
        false,
        new_status,
        before.admin_review_status,
        before.final_approval_status,
    );

    let updated =
        db::consume_endorsement(pool, application_id, decision, actor, notes, derived, Utc::now())
            .await?;
    if !updated {
        return Err(WorkflowError::AlreadyProcessed(
            "This endorsement has already been processed".to_string(),
        ));
    }

    let after = db::get_application(pool, application_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("application {application_id}")))?;

    notify::on_application_updated(pool, mailer, config, &before, &after).await;
    Ok(after)
}
