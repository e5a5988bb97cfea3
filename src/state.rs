//! Application state machine — the canonical transition operations over a
//! single application record.
//!
//! Each operation is: read the record, check preconditions (fail typed with
//! nothing written), perform one conditional UPDATE, re-read, then hand the
//! before/after snapshots to the trigger layer. The conditional UPDATE is
//! what guarantees exactly one winner among concurrent conflicting
//! transitions; the precondition read only exists to produce precise error
//! messages.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::errors::{Result, WorkflowError};
use crate::mailer::Mailer;
use crate::model::{
    derive_status, Application, Decision, EndorsementStatus, FinalStatus, PersonalInfo,
    ReviewStatus,
};
use crate::notify;
use crate::token;

/// Save (or refresh) a pre-submission draft. Drafts skip field validation
/// and never carry an endorsement token.
pub async fn save_draft(
    pool: &SqlitePool,
    applicant_id: &str,
    info: PersonalInfo,
) -> Result<Application> {
    let info_json = serde_json::to_string(&info)?;
    let status = derive_status(
        true,
        EndorsementStatus::Pending,
        ReviewStatus::Pending,
        FinalStatus::Pending,
    );
    let saved = db::upsert_draft(pool, applicant_id, &info.email, &info_json, status, Utc::now())
        .await?;
    if !saved {
        return Err(WorkflowError::PreconditionFailed(
            "application has already been submitted".to_string(),
        ));
    }
    db::get_application(pool, applicant_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("application {applicant_id}")))
}

/// Submit an application (first submission or resubmission of a returned
/// one).
///
/// First submission validates the form, issues the endorsement token, and
/// fires the created-application notifications. Resubmission of a returned
/// application only flips the review track back to pending.
pub async fn submit(
    pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    applicant_id: &str,
    info: PersonalInfo,
) -> Result<Application> {
    info.validate_for_submission()?;
    let info_json = serde_json::to_string(&info)?;
    let now = Utc::now();

    let existing = db::get_application(pool, applicant_id).await?;
    match existing {
        Some(app) if !app.is_draft() => {
            if app.admin_review_status != ReviewStatus::Returned {
                return Err(WorkflowError::PreconditionFailed(
                    "application has already been submitted".to_string(),
                ));
            }
            let status = derive_status(
                false,
                app.pastor_endorsement_status,
                ReviewStatus::Pending,
                app.final_approval_status,
            );
            if !db::resubmit_returned(pool, applicant_id, &info.email, &info_json, status, now)
                .await?
            {
                return Err(WorkflowError::PreconditionFailed(
                    "application is no longer awaiting revision".to_string(),
                ));
            }
            info!("Application {applicant_id} resubmitted after revision");
            db::get_application(pool, applicant_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("application {applicant_id}")))
        }
        _ => {
            // New application or promoted draft.
            let endorsement_token = token::mint();
            let status = derive_status(
                false,
                EndorsementStatus::Pending,
                ReviewStatus::Pending,
                FinalStatus::Pending,
            );
            if !db::finalize_submission(
                pool,
                applicant_id,
                &info.email,
                &info_json,
                &endorsement_token,
                status,
                now,
            )
            .await?
            {
                return Err(WorkflowError::PreconditionFailed(
                    "application has already been submitted".to_string(),
                ));
            }
            db::log_endorsement_issue(pool, &endorsement_token, applicant_id, now).await?;

            let app = db::get_application(pool, applicant_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("application {applicant_id}")))?;
            info!("Application {applicant_id} submitted");
            notify::on_application_created(mailer, config, &app).await;
            Ok(app)
        }
    }
}

/// Admin review decision: approve or reject the reviewed application.
/// Approval is stage-gated on an approved pastor endorsement.
pub async fn record_admin_review(
    pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    application_id: &str,
    decision: Decision,
    note: Option<&str>,
    author: &str,
) -> Result<Application> {
    let before = require_application(pool, application_id).await?;

    if before.admin_review_status != ReviewStatus::Pending {
        return Err(WorkflowError::PreconditionFailed(format!(
            "admin review is already {}",
            before.admin_review_status.as_str()
        )));
    }
    if decision == Decision::Approved
        && before.pastor_endorsement_status != EndorsementStatus::Approved
    {
        return Err(WorkflowError::PreconditionFailed(
            "pastor endorsement must be approved before admin review approval".to_string(),
        ));
    }

    let new_status = match decision {
        Decision::Approved => ReviewStatus::Approved,
        Decision::Rejected => ReviewStatus::Rejected,
    };
    let derived = derive_status(
        false,
        before.pastor_endorsement_status,
        new_status,
        before.final_approval_status,
    );
    let now = Utc::now();
    if !db::set_review_status(pool, application_id, new_status, derived, now).await? {
        return Err(WorkflowError::PreconditionFailed(
            "admin review was updated concurrently".to_string(),
        ));
    }
    if let Some(note) = note {
        db::append_admin_note(pool, application_id, author, note, now).await?;
    }

    let after = require_application(pool, application_id).await?;
    notify::on_application_updated(pool, mailer, config, &before, &after).await;
    Ok(after)
}

/// Return the application to the applicant for revision, with a note
/// explaining what to fix.
pub async fn return_for_revision(
    pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    application_id: &str,
    note: &str,
    author: &str,
) -> Result<Application> {
    if note.trim().is_empty() {
        return Err(WorkflowError::ValidationFailed(
            "a note is required when returning an application".to_string(),
        ));
    }
    let before = require_application(pool, application_id).await?;
    if before.admin_review_status != ReviewStatus::Pending {
        return Err(WorkflowError::PreconditionFailed(format!(
            "admin review is already {}",
            before.admin_review_status.as_str()
        )));
    }

    let derived = derive_status(
        false,
        before.pastor_endorsement_status,
        ReviewStatus::Returned,
        before.final_approval_status,
    );
    let now = Utc::now();
    if !db::set_review_status(pool, application_id, ReviewStatus::Returned, derived, now).await? {
        return Err(WorkflowError::PreconditionFailed(
            "admin review was updated concurrently".to_string(),
        ));
    }
    db::append_admin_note(pool, application_id, author, note, now).await?;

    let after = require_application(pool, application_id).await?;
    notify::on_application_updated(pool, mailer, config, &before, &after).await;
    Ok(after)
}

/// Final approval decision. Approval is stage-gated on an approved admin
/// review.
pub async fn record_final_approval(
    pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    application_id: &str,
    decision: Decision,
) -> Result<Application> {
    let before = require_application(pool, application_id).await?;

    if before.final_approval_status != FinalStatus::Pending {
        return Err(WorkflowError::PreconditionFailed(format!(
            "final approval is already {}",
            before.final_approval_status.as_str()
        )));
    }
    if decision == Decision::Approved && before.admin_review_status != ReviewStatus::Approved {
        return Err(WorkflowError::PreconditionFailed(
            "admin review must be approved before final approval".to_string(),
        ));
    }

    let new_status = match decision {
        Decision::Approved => FinalStatus::Approved,
        Decision::Rejected => FinalStatus::Rejected,
    };
    let derived = derive_status(
        false,
        before.pastor_endorsement_status,
        before.admin_review_status,
        new_status,
    );
    if !db::set_final_status(pool, application_id, decision, derived, Utc::now()).await? {
        return Err(WorkflowError::PreconditionFailed(
            "final approval was updated concurrently".to_string(),
        ));
    }

    let after = require_application(pool, application_id).await?;
    notify::on_application_updated(pool, mailer, config, &before, &after).await;
    Ok(after)
}

/// Append an entry to the application's admin note log.
pub async fn append_admin_note(
    pool: &SqlitePool,
    application_id: &str,
    note: &str,
    author: &str,
) -> Result<()> {
    if note.trim().is_empty() {
        return Err(WorkflowError::ValidationFailed(
            "note must not be empty".to_string(),
        ));
    }
    require_application(pool, application_id).await?;
    db::append_admin_note(pool, application_id, author, note, Utc::now()).await?;
    Ok(())
}

/// Re-issue the endorsement token (invalidating the old link), optionally
/// updating the supervisor's email first, and re-send the request email.
pub async fn resend_endorsement_request(
    pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    application_id: &str,
    new_supervisor_email: Option<&str>,
) -> Result<String> {
    let app = require_application(pool, application_id).await?;
    if app.pastor_endorsement_status != EndorsementStatus::Pending {
        return Err(WorkflowError::AlreadyProcessed(
            "endorsement has already been processed".to_string(),
        ));
    }

    let mut info = app.personal_info.clone();
    if let Some(email) = new_supervisor_email {
        match info.supervisor.as_mut() {
            Some(supervisor) => supervisor.email = email.to_string(),
            None => {
                return Err(WorkflowError::PreconditionFailed(
                    "no supervisor on record to update".to_string(),
                ))
            }
        }
        let info_json = serde_json::to_string(&info)?;
        db::update_personal_info(pool, application_id, &app.email, &info_json, Utc::now()).await?;
    }

    let supervisor = info.supervisor.as_ref().filter(|s| !s.email.trim().is_empty());
    let Some(supervisor) = supervisor else {
        return Err(WorkflowError::PreconditionFailed(
            "no supervisor email found on the application".to_string(),
        ));
    };

    let token = token::issue(pool, application_id).await?;
    notify::on_endorsement_reissued(mailer, config, supervisor, &info.full_name(), &token).await;
    Ok(token)
}

async fn require_application(pool: &SqlitePool, id: &str) -> Result<Application> {
    db::get_application(pool, id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("application {id}")))
}
