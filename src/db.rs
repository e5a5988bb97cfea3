//! Database layer — migrations, record reads, and the conditional writes
//! that enforce the workflow guards.
//!
//! Every status transition is a single conditional UPDATE keyed on the
//! expected previous value. Zero rows affected means another actor won the
//! race (or the precondition never held); callers map that to the right
//! typed error after a fresh read.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::Result;
use crate::model::{
    AdminNote, Application, Contribution, ContributionStatus, Decision, EndorsementStatus,
    FinalStatus, ReviewStatus,
};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Application reads
// ─────────────────────────────────────────────────────────

const APPLICATION_COLUMNS: &str = "id, email, personal_info, pastor_endorsement_status, \
     pastor_endorsement_token, pastor_endorsement_by, pastor_endorsement_at, \
     pastor_endorsement_notes, admin_review_status, final_approval_status, status, \
     welcome_email_sent, submitted_at, created_at, updated_at";

pub async fn get_application(pool: &SqlitePool, id: &str) -> Result<Option<Application>> {
    let row = sqlx::query_as::<_, Application>(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Unique lookup by endorsement token. This backs the public
/// (unauthenticated) endorsement path; the token is the sole credential.
pub async fn find_application_by_token(
    pool: &SqlitePool,
    token: &str,
) -> Result<Option<Application>> {
    let row = sqlx::query_as::<_, Application>(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications WHERE pastor_endorsement_token = ?1"
    ))
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// All applications holding final approval, for the reminder sweep.
pub async fn list_approved_applications(pool: &SqlitePool) -> Result<Vec<Application>> {
    let rows = sqlx::query_as::<_, Application>(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications \
         WHERE final_approval_status = 'approved' ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Application writes
// ─────────────────────────────────────────────────────────

/// Insert or refresh a draft. Returns `false` when the row exists and has
/// already been submitted (drafts may not overwrite a live application).
pub async fn upsert_draft(
    pool: &SqlitePool,
    id: &str,
    email: &str,
    personal_info_json: &str,
    status: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        INSERT INTO applications (id, email, personal_info, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        ON CONFLICT (id) DO UPDATE
            SET email = ?2, personal_info = ?3, updated_at = ?5
            WHERE applications.submitted_at IS NULL
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(personal_info_json)
    .bind(status)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

/// Promote a draft (or create the row outright) into a submitted
/// application carrying a fresh endorsement token.
pub async fn finalize_submission(
    pool: &SqlitePool,
    id: &str,
    email: &str,
    personal_info_json: &str,
    token: &str,
    status: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        INSERT INTO applications
            (id, email, personal_info, pastor_endorsement_status, pastor_endorsement_token,
             status, submitted_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?6, ?6)
        ON CONFLICT (id) DO UPDATE
            SET email = ?2, personal_info = ?3, pastor_endorsement_status = 'pending',
                pastor_endorsement_token = ?4, status = ?5, submitted_at = ?6, updated_at = ?6
            WHERE applications.submitted_at IS NULL
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(personal_info_json)
    .bind(token)
    .bind(status)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

/// Resubmission of a returned application: revised fields go in and the
/// review track flips back to pending. Guarded on `returned`.
pub async fn resubmit_returned(
    pool: &SqlitePool,
    id: &str,
    email: &str,
    personal_info_json: &str,
    status: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE applications
        SET email = ?2, personal_info = ?3, admin_review_status = 'pending',
            status = ?4, updated_at = ?5
        WHERE id = ?1 AND admin_review_status = 'returned'
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(personal_info_json)
    .bind(status)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

/// Overwrite the endorsement token (explicit re-issue). Only legal while
/// the endorsement is still pending; the old token stops matching lookups
/// the moment this commits.
pub async fn replace_endorsement_token(
    pool: &SqlitePool,
    id: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE applications
        SET pastor_endorsement_token = ?2, updated_at = ?3
        WHERE id = ?1 AND pastor_endorsement_status = 'pending'
        "#,
    )
    .bind(id)
    .bind(token)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

pub async fn update_personal_info(
    pool: &SqlitePool,
    id: &str,
    email: &str,
    personal_info_json: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE applications SET email = ?2, personal_info = ?3, updated_at = ?4 WHERE id = ?1")
        .bind(id)
        .bind(email)
        .bind(personal_info_json)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record the pastor's decision. Conditioned on the endorsement still being
/// pending, which is what makes the token single-use.
pub async fn consume_endorsement(
    pool: &SqlitePool,
    id: &str,
    decision: Decision,
    actor: &str,
    notes: Option<&str>,
    status: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let new_status = match decision {
        Decision::Approved => EndorsementStatus::Approved,
        Decision::Rejected => EndorsementStatus::Rejected,
    };
    let rows = sqlx::query(
        r#"
        UPDATE applications
        SET pastor_endorsement_status = ?2, pastor_endorsement_by = ?3,
            pastor_endorsement_at = ?4, pastor_endorsement_notes = ?5,
            status = ?6, updated_at = ?4
        WHERE id = ?1 AND pastor_endorsement_status = 'pending'
        "#,
    )
    .bind(id)
    .bind(new_status)
    .bind(actor)
    .bind(now)
    .bind(notes)
    .bind(status)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

/// Admin review transition out of `pending`. Approval is additionally
/// stage-gated on the endorsement being approved.
pub async fn set_review_status(
    pool: &SqlitePool,
    id: &str,
    new_status: ReviewStatus,
    status: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let sql = if new_status == ReviewStatus::Approved {
        r#"
        UPDATE applications
        SET admin_review_status = ?2, status = ?3, updated_at = ?4
        WHERE id = ?1 AND admin_review_status = 'pending'
          AND pastor_endorsement_status = 'approved'
        "#
    } else {
        r#"
        UPDATE applications
        SET admin_review_status = ?2, status = ?3, updated_at = ?4
        WHERE id = ?1 AND admin_review_status = 'pending'
        "#
    };
    let rows = sqlx::query(sql)
        .bind(id)
        .bind(new_status)
        .bind(status)
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows > 0)
}

/// Final approval transition out of `pending`. Approval is stage-gated on
/// the admin review being approved.
pub async fn set_final_status(
    pool: &SqlitePool,
    id: &str,
    decision: Decision,
    status: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let new_status = match decision {
        Decision::Approved => FinalStatus::Approved,
        Decision::Rejected => FinalStatus::Rejected,
    };
    let sql = if decision == Decision::Approved {
        r#"
        UPDATE applications
        SET final_approval_status = ?2, status = ?3, updated_at = ?4
        WHERE id = ?1 AND final_approval_status = 'pending'
          AND admin_review_status = 'approved'
        "#
    } else {
        r#"
        UPDATE applications
        SET final_approval_status = ?2, status = ?3, updated_at = ?4
        WHERE id = ?1 AND final_approval_status = 'pending'
        "#
    };
    let rows = sqlx::query(sql)
        .bind(id)
        .bind(new_status)
        .bind(status)
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows > 0)
}

/// Set the one-shot welcome idempotency flag. Returns `false` when it was
/// already set, which is what keeps the email at-most-once.
pub async fn set_welcome_flag(pool: &SqlitePool, id: &str, now: DateTime<Utc>) -> Result<bool> {
    let rows = sqlx::query(
        "UPDATE applications SET welcome_email_sent = 1, updated_at = ?2 \
         WHERE id = ?1 AND welcome_email_sent = 0",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

// ─────────────────────────────────────────────────────────
// Admin notes
// ─────────────────────────────────────────────────────────

pub async fn append_admin_note(
    pool: &SqlitePool,
    application_id: &str,
    author: &str,
    note: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO admin_notes (application_id, author, note, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(application_id)
    .bind(author)
    .bind(note)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_admin_notes(pool: &SqlitePool, application_id: &str) -> Result<Vec<AdminNote>> {
    let rows = sqlx::query_as::<_, AdminNote>(
        "SELECT id, application_id, author, note, created_at FROM admin_notes \
         WHERE application_id = ?1 ORDER BY id ASC",
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Endorsement audit log
// ─────────────────────────────────────────────────────────

/// Record every issued token. Never consulted for authorization; the
/// application row is the source of truth.
pub async fn log_endorsement_issue(
    pool: &SqlitePool,
    token: &str,
    application_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO endorsements (token, application_id, status, created_at) \
         VALUES (?1, ?2, 'pending', ?3)",
    )
    .bind(token)
    .bind(application_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Contributions
// ─────────────────────────────────────────────────────────

const CONTRIBUTION_COLUMNS: &str = "id, member_id, month, amount, receipt_url, status, \
     receipt_sent, reviewed_by, reviewed_at, created_at, updated_at";

pub async fn insert_contribution(
    pool: &SqlitePool,
    id: &str,
    member_id: &str,
    month: &str,
    amount: i64,
    receipt_url: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO contributions
            (id, member_id, month, amount, receipt_url, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)
        "#,
    )
    .bind(id)
    .bind(member_id)
    .bind(month)
    .bind(amount)
    .bind(receipt_url)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_contribution(pool: &SqlitePool, id: &str) -> Result<Option<Contribution>> {
    let row = sqlx::query_as::<_, Contribution>(&format!(
        "SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_contributions_for_member(
    pool: &SqlitePool,
    member_id: &str,
) -> Result<Vec<Contribution>> {
    let rows = sqlx::query_as::<_, Contribution>(&format!(
        "SELECT {CONTRIBUTION_COLUMNS} FROM contributions \
         WHERE member_id = ?1 ORDER BY month DESC, id ASC"
    ))
    .bind(member_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Is there already a non-rejected contribution for this (member, month)?
pub async fn has_effective_contribution(
    pool: &SqlitePool,
    member_id: &str,
    month: &str,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM contributions \
         WHERE member_id = ?1 AND month = ?2 AND status != 'rejected' LIMIT 1",
    )
    .bind(member_id)
    .bind(month)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Admin decision on a pending receipt. Conditioned on the current status
/// still being pending.
pub async fn set_contribution_status(
    pool: &SqlitePool,
    id: &str,
    new_status: ContributionStatus,
    reviewer: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let rows = sqlx::query(
        r#"
        UPDATE contributions
        SET status = ?2, reviewed_by = ?3, reviewed_at = ?4, updated_at = ?4
        WHERE id = ?1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(new_status)
    .bind(reviewer)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}

/// Set the receipt-email idempotency flag.
pub async fn set_receipt_sent(pool: &SqlitePool, id: &str, now: DateTime<Utc>) -> Result<bool> {
    let rows = sqlx::query(
        "UPDATE contributions SET receipt_sent = 1, updated_at = ?2 \
         WHERE id = ?1 AND receipt_sent = 0",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows > 0)
}
