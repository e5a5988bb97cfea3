//! End-to-end workflow tests against an in-memory SQLite pool and a
//! recording mail transport.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use parish_care::config::Config;
use parish_care::errors::{Result, WorkflowError};
use parish_care::mailer::{Credentials, MailTransport, Mailer, OutboundMessage, SendOutcome};
use parish_care::model::{
    ContributionStatus, Decision, EndorsementStatus, FinalStatus, PersonalInfo, ReviewStatus,
    Supervisor,
};
use parish_care::{contrib, db, notify, state, sweep, token};

// ─────────────────────────────────────────────────────────
// Test fixtures
// ─────────────────────────────────────────────────────────

struct RecordingTransport {
    delivered: Mutex<Vec<OutboundMessage>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(vec![]),
        })
    }

    fn messages(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().unwrap().clone()
    }

    fn sent_to(&self, recipient: &str) -> Vec<OutboundMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.to == recipient)
            .collect()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        self.delivered.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct FailingTransport;

#[async_trait]
impl MailTransport for FailingTransport {
    async fn deliver(&self, _message: &OutboundMessage) -> Result<()> {
        Err(WorkflowError::TransportFailure(
            "relay unreachable".to_string(),
        ))
    }
}

fn failing_mailer() -> Mailer {
    Mailer::with_transport(
        Some(Credentials {
            address: "noreply@parishcare.org".to_string(),
            secret: "s3cret".to_string(),
        }),
        Arc::new(FailingTransport),
    )
}

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}

fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        api_port: 0,
        mail_relay_url: "http://relay.invalid".to_string(),
        smtp_email: Some("noreply@parishcare.org".to_string()),
        smtp_password: Some("s3cret".to_string()),
        admin_email: "admin@parishcare.org".to_string(),
        public_origin: "https://parishcare.org".to_string(),
        sweep_interval_secs: 86400,
    }
}

fn recording_mailer() -> (Mailer, Arc<RecordingTransport>) {
    let transport = RecordingTransport::new();
    let mailer = Mailer::with_transport(
        Some(Credentials {
            address: "noreply@parishcare.org".to_string(),
            secret: "s3cret".to_string(),
        }),
        transport.clone(),
    );
    (mailer, transport)
}

fn personal_info(email: &str, supervisor_email: &str) -> PersonalInfo {
    PersonalInfo {
        first_name: "Maria".to_string(),
        surname: "Santos".to_string(),
        email: email.to_string(),
        phone: None,
        address: None,
        outreach: Some("Grace Outreach".to_string()),
        job_title: Some("Worship Leader".to_string()),
        supervisor: Some(Supervisor {
            name: "Ptr. Cruz".to_string(),
            email: supervisor_email.to_string(),
            phone: None,
        }),
        beneficiaries: vec![],
    }
}

/// Submit a fresh application and return its id.
async fn submit_member(
    pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    id: &str,
    email: &str,
    supervisor_email: &str,
) -> String {
    state::submit(pool, mailer, config, id, personal_info(email, supervisor_email))
        .await
        .expect("submit application");
    id.to_string()
}

/// Drive an application all the way to final approval.
async fn approve_member(pool: &SqlitePool, mailer: &Mailer, config: &Config, id: &str) {
    token::consume(pool, mailer, config, id, Decision::Approved, None, "Ptr. Cruz")
        .await
        .expect("pastor endorsement");
    state::record_admin_review(pool, mailer, config, id, Decision::Approved, None, "admin")
        .await
        .expect("admin review");
    state::record_final_approval(pool, mailer, config, id, Decision::Approved)
        .await
        .expect("final approval");
}

// ─────────────────────────────────────────────────────────
// Token protocol
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn issue_then_validate_round_trip() {
    let pool = test_pool().await;
    let (mailer, _transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;

    let app = db::get_application(&pool, &id).await.unwrap().unwrap();
    let issued = app.pastor_endorsement_token.expect("token issued on submit");

    let validated = token::validate(&pool, &issued).await.unwrap();
    assert_eq!(validated.id, id);
    assert_eq!(
        validated.pastor_endorsement_status,
        EndorsementStatus::Pending
    );
}

#[tokio::test]
async fn validate_fails_after_consume() {
    let pool = test_pool().await;
    let (mailer, _transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    let app = db::get_application(&pool, &id).await.unwrap().unwrap();
    let issued = app.pastor_endorsement_token.unwrap();

    token::validate(&pool, &issued).await.unwrap();
    token::consume(&pool, &mailer, &config, &id, Decision::Approved, None, "Ptr. Cruz")
        .await
        .unwrap();

    let err = token::validate(&pool, &issued).await.unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyProcessed(_)));
}

#[tokio::test]
async fn consume_is_single_use() {
    let pool = test_pool().await;
    let (mailer, _transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    token::consume(
        &pool,
        &mailer,
        &config,
        &id,
        Decision::Rejected,
        Some("not an active member"),
        "Ptr. Cruz",
    )
    .await
    .unwrap();

    let err = token::consume(&pool, &mailer, &config, &id, Decision::Approved, None, "Ptr. Cruz")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyProcessed(_)));

    let app = db::get_application(&pool, &id).await.unwrap().unwrap();
    assert_eq!(app.pastor_endorsement_status, EndorsementStatus::Rejected);
    assert_eq!(app.status, "Rejected by Pastor");
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let pool = test_pool().await;
    let err = token::validate(&pool, "no-such-token").await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
}

#[tokio::test]
async fn reissue_invalidates_previous_token() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    let old_token = db::get_application(&pool, &id)
        .await
        .unwrap()
        .unwrap()
        .pastor_endorsement_token
        .unwrap();

    let new_token =
        state::resend_endorsement_request(&pool, &mailer, &config, &id, None)
            .await
            .unwrap();
    assert_ne!(old_token, new_token);

    let err = token::validate(&pool, &old_token).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
    assert_eq!(token::validate(&pool, &new_token).await.unwrap().id, id);

    // Request email went out twice: submission + resend.
    let requests: Vec<_> = transport
        .sent_to("pastor@example.com")
        .into_iter()
        .filter(|m| m.subject.contains("Endorsement Request"))
        .collect();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].body.contains(&new_token));
}

// ─────────────────────────────────────────────────────────
// Stage gating
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn review_approval_requires_endorsement() {
    let pool = test_pool().await;
    let (mailer, _transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;

    let err =
        state::record_admin_review(&pool, &mailer, &config, &id, Decision::Approved, None, "admin")
            .await
            .unwrap_err();
    assert!(matches!(err, WorkflowError::PreconditionFailed(_)));

    // No field moved.
    let app = db::get_application(&pool, &id).await.unwrap().unwrap();
    assert_eq!(app.pastor_endorsement_status, EndorsementStatus::Pending);
    assert_eq!(app.admin_review_status, ReviewStatus::Pending);
    assert_eq!(app.final_approval_status, FinalStatus::Pending);
    assert_eq!(app.status, "Pending Pastor Endorsement");
}

#[tokio::test]
async fn final_approval_requires_review() {
    let pool = test_pool().await;
    let (mailer, _transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    token::consume(&pool, &mailer, &config, &id, Decision::Approved, None, "Ptr. Cruz")
        .await
        .unwrap();

    let err = state::record_final_approval(&pool, &mailer, &config, &id, Decision::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::PreconditionFailed(_)));

    let app = db::get_application(&pool, &id).await.unwrap().unwrap();
    assert_eq!(app.final_approval_status, FinalStatus::Pending);
    assert_eq!(app.status, "Pending Admin Review");
}

#[tokio::test]
async fn derived_status_tracks_the_full_progression() {
    let pool = test_pool().await;
    let (mailer, _transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    assert_eq!(
        db::get_application(&pool, &id).await.unwrap().unwrap().status,
        "Pending Pastor Endorsement"
    );

    token::consume(&pool, &mailer, &config, &id, Decision::Approved, None, "Ptr. Cruz")
        .await
        .unwrap();
    assert_eq!(
        db::get_application(&pool, &id).await.unwrap().unwrap().status,
        "Pending Admin Review"
    );

    state::record_admin_review(&pool, &mailer, &config, &id, Decision::Approved, None, "admin")
        .await
        .unwrap();
    assert_eq!(
        db::get_application(&pool, &id).await.unwrap().unwrap().status,
        "Pending Final Approval"
    );

    state::record_final_approval(&pool, &mailer, &config, &id, Decision::Approved)
        .await
        .unwrap();
    assert_eq!(
        db::get_application(&pool, &id).await.unwrap().unwrap().status,
        "APPROVED - Active Member"
    );
}

#[tokio::test]
async fn returned_application_can_be_resubmitted() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    token::consume(&pool, &mailer, &config, &id, Decision::Approved, None, "Ptr. Cruz")
        .await
        .unwrap();

    state::return_for_revision(&pool, &mailer, &config, &id, "ID photo unreadable", "admin")
        .await
        .unwrap();
    let app = db::get_application(&pool, &id).await.unwrap().unwrap();
    assert_eq!(app.admin_review_status, ReviewStatus::Returned);
    assert_eq!(app.status, "Returned for Revision");

    // Action-required email went to the applicant.
    let action_required: Vec<_> = transport
        .sent_to("maria@example.com")
        .into_iter()
        .filter(|m| m.subject.contains("Action Required"))
        .collect();
    assert_eq!(action_required.len(), 1);

    // The note survives in the append-only log.
    let notes = db::list_admin_notes(&pool, &id).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].note, "ID photo unreadable");

    // Resubmission flips review back to pending without re-sending
    // creation emails.
    let before_count = transport.messages().len();
    let app = state::submit(
        &pool,
        &mailer,
        &config,
        &id,
        personal_info("maria@example.com", "pastor@example.com"),
    )
    .await
    .unwrap();
    assert_eq!(app.admin_review_status, ReviewStatus::Pending);
    assert_eq!(app.status, "Pending Admin Review");
    assert_eq!(transport.messages().len(), before_count);
}

#[tokio::test]
async fn submit_validates_required_fields() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let mut info = personal_info("maria@example.com", "pastor@example.com");
    info.supervisor = None;
    let err = state::submit(&pool, &mailer, &config, "m-1", info)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ValidationFailed(_)));

    // Nothing written, nothing sent.
    assert!(db::get_application(&pool, "m-1").await.unwrap().is_none());
    assert!(transport.messages().is_empty());
}

#[tokio::test]
async fn double_submission_is_rejected() {
    let pool = test_pool().await;
    let (mailer, _transport) = recording_mailer();
    let config = test_config();

    submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    let err = state::submit(
        &pool,
        &mailer,
        &config,
        "m-1",
        personal_info("maria@example.com", "pastor@example.com"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
}

#[tokio::test]
async fn draft_then_submit_promotes_the_same_record() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let draft = state::save_draft(&pool, "m-1", personal_info("maria@example.com", ""))
        .await
        .unwrap();
    assert!(draft.is_draft());
    assert_eq!(draft.status, "Draft");
    assert!(draft.pastor_endorsement_token.is_none());
    assert!(transport.messages().is_empty());

    let app = state::submit(
        &pool,
        &mailer,
        &config,
        "m-1",
        personal_info("maria@example.com", "pastor@example.com"),
    )
    .await
    .unwrap();
    assert!(!app.is_draft());
    assert!(app.pastor_endorsement_token.is_some());
    assert_eq!(app.status, "Pending Pastor Endorsement");
}

// ─────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn submission_fans_out_to_supervisor_applicant_and_admin() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;

    let messages = transport.messages();
    assert_eq!(messages.len(), 3);

    let requests = transport.sent_to("pastor@example.com");
    let request = &requests[0];
    assert!(request.subject.contains("Endorsement Request"));
    let app = db::get_application(&pool, "m-1").await.unwrap().unwrap();
    let link = config.endorsement_link(&app.pastor_endorsement_token.unwrap());
    assert!(request.body.contains(&link));

    assert_eq!(transport.sent_to("maria@example.com").len(), 1);
    assert_eq!(transport.sent_to("admin@parishcare.org").len(), 1);
}

#[tokio::test]
async fn endorsement_sends_exactly_one_supervisor_confirmation() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    token::consume(&pool, &mailer, &config, &id, Decision::Approved, None, "Ptr. Cruz")
        .await
        .unwrap();

    let confirmations: Vec<_> = transport
        .sent_to("pastor@example.com")
        .into_iter()
        .filter(|m| m.subject.contains("Endorsement Submitted"))
        .collect();
    assert_eq!(confirmations.len(), 1);
}

#[tokio::test]
async fn welcome_email_is_sent_at_most_once() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;

    let before = db::get_application(&pool, &id).await.unwrap().unwrap();
    approve_member(&pool, &mailer, &config, &id).await;

    let welcome_count = |transport: &RecordingTransport| {
        transport
            .sent_to("maria@example.com")
            .into_iter()
            .filter(|m| m.subject.contains("Application Approved"))
            .count()
    };
    assert_eq!(welcome_count(&transport), 1);

    let after = db::get_application(&pool, &id).await.unwrap().unwrap();
    assert!(after.welcome_email_sent);

    // Re-observing the same transition (flag now persisted) dispatches
    // nothing further.
    notify::on_application_updated(&pool, &mailer, &config, &before, &after).await;
    assert_eq!(welcome_count(&transport), 1);
}

#[tokio::test]
async fn suppressed_mailer_never_blocks_transitions() {
    let pool = test_pool().await;
    let transport = RecordingTransport::new();
    let mailer = Mailer::with_transport(None, transport.clone());
    let config = test_config();

    let outcome = mailer.send("x@example.com", "s", "b").await.unwrap();
    assert_eq!(outcome, SendOutcome::Suppressed);

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    approve_member(&pool, &mailer, &config, &id).await;

    let app = db::get_application(&pool, &id).await.unwrap().unwrap();
    assert_eq!(app.final_approval_status, FinalStatus::Approved);
    assert_eq!(app.status, "APPROVED - Active Member");
    assert!(transport.messages().is_empty());
}

#[tokio::test]
async fn failing_transport_never_blocks_transitions() {
    let pool = test_pool().await;
    let mailer = failing_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;

    // Token re-issue stands even when the request email cannot go out.
    let new_token = state::resend_endorsement_request(&pool, &mailer, &config, &id, None)
        .await
        .unwrap();
    assert_eq!(token::validate(&pool, &new_token).await.unwrap().id, id);

    approve_member(&pool, &mailer, &config, &id).await;

    let app = db::get_application(&pool, &id).await.unwrap().unwrap();
    assert_eq!(app.final_approval_status, FinalStatus::Approved);
    assert_eq!(app.status, "APPROVED - Active Member");
    // The flag only moves after a delivered send, so the welcome email
    // stays owed.
    assert!(!app.welcome_email_sent);

    // Contribution confirmation also completes; the receipt stays owed.
    let contribution = contrib::submit_contribution(&pool, &id, "2025-06", 500, "https://f/r.png")
        .await
        .unwrap();
    let confirmed = contrib::review_contribution(
        &pool,
        &mailer,
        &contribution.id,
        ContributionStatus::Confirmed,
        "admin",
    )
    .await
    .unwrap();
    assert_eq!(confirmed.status, ContributionStatus::Confirmed);
    assert!(!confirmed.receipt_sent);
}

// ─────────────────────────────────────────────────────────
// Contributions
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn confirmation_sends_receipt_once_and_sets_flag() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    approve_member(&pool, &mailer, &config, &id).await;

    let contribution = contrib::submit_contribution(
        &pool,
        &id,
        "2025-06",
        500,
        "https://files.example/receipt.png",
    )
    .await
    .unwrap();
    assert_eq!(contribution.status, ContributionStatus::Pending);

    let confirmed = contrib::review_contribution(
        &pool,
        &mailer,
        &contribution.id,
        ContributionStatus::Confirmed,
        "admin",
    )
    .await
    .unwrap();
    assert_eq!(confirmed.status, ContributionStatus::Confirmed);
    assert!(confirmed.receipt_sent);

    let receipts: Vec<_> = transport
        .sent_to("maria@example.com")
        .into_iter()
        .filter(|m| m.subject.contains("Payment Confirmed"))
        .collect();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].body.contains("2025-06"));
    assert!(receipts[0].body.contains("500"));

    // A second review attempt is refused.
    let err = contrib::review_contribution(
        &pool,
        &mailer,
        &contribution.id,
        ContributionStatus::Confirmed,
        "admin",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyProcessed(_)));

    // A confirmed → confirmed no-op observation dispatches nothing.
    notify::on_contribution_updated(&pool, &mailer, &confirmed, &confirmed).await;
    let receipts = transport
        .sent_to("maria@example.com")
        .into_iter()
        .filter(|m| m.subject.contains("Payment Confirmed"))
        .count();
    assert_eq!(receipts, 1);
}

#[tokio::test]
async fn duplicate_month_is_rejected_until_the_first_is_rejected() {
    let pool = test_pool().await;
    let (mailer, _transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    approve_member(&pool, &mailer, &config, &id).await;

    let first = contrib::submit_contribution(&pool, &id, "2025-06", 500, "https://f/r1.png")
        .await
        .unwrap();

    let err = contrib::submit_contribution(&pool, &id, "2025-06", 500, "https://f/r2.png")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ValidationFailed(_)));

    // Rejecting the first unblocks a corrected resubmission.
    contrib::review_contribution(&pool, &mailer, &first.id, ContributionStatus::Rejected, "admin")
        .await
        .unwrap();
    contrib::submit_contribution(&pool, &id, "2025-06", 500, "https://f/r2.png")
        .await
        .unwrap();
}

// ─────────────────────────────────────────────────────────
// Reminder sweep
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_reminds_after_the_25th_and_repeats() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    approve_member(&pool, &mailer, &config, &id).await;

    let reminder_count = |transport: &RecordingTransport| {
        transport
            .sent_to("maria@example.com")
            .into_iter()
            .filter(|m| m.subject.contains("Contribution Reminder"))
            .count()
    };

    let the_26th = NaiveDate::from_ymd_opt(2025, 6, 26).unwrap();
    let summary = sweep::run_reminder_sweep(&pool, &mailer, &config, the_26th)
        .await
        .unwrap();
    assert_eq!(summary.reminded, 1);
    assert_eq!(reminder_count(&transport), 1);

    // Reminders have no idempotency flag: a second run reminds again.
    let summary = sweep::run_reminder_sweep(&pool, &mailer, &config, the_26th)
        .await
        .unwrap();
    assert_eq!(summary.reminded, 1);
    assert_eq!(reminder_count(&transport), 2);
}

#[tokio::test]
async fn sweep_skips_before_the_26th() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    approve_member(&pool, &mailer, &config, &id).await;

    let the_25th = NaiveDate::from_ymd_opt(2025, 6, 25).unwrap();
    let summary = sweep::run_reminder_sweep(&pool, &mailer, &config, the_25th)
        .await
        .unwrap();
    assert_eq!(summary.checked, 0);
    assert_eq!(summary.reminded, 0);
    assert!(!transport
        .messages()
        .iter()
        .any(|m| m.subject.contains("Contribution Reminder")));
}

#[tokio::test]
async fn sweep_spares_members_with_a_pending_contribution() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    approve_member(&pool, &mailer, &config, &id).await;

    // Pending counts as submitted for reminder purposes.
    contrib::submit_contribution(&pool, &id, "2025-06", 500, "https://f/r.png")
        .await
        .unwrap();

    let the_26th = NaiveDate::from_ymd_opt(2025, 6, 26).unwrap();
    let summary = sweep::run_reminder_sweep(&pool, &mailer, &config, the_26th)
        .await
        .unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.reminded, 0);
    assert!(!transport
        .messages()
        .iter()
        .any(|m| m.subject.contains("Contribution Reminder")));
}

#[tokio::test]
async fn sweep_isolates_per_member_delivery_failures() {
    let pool = test_pool().await;
    let mailer = failing_mailer();
    let config = test_config();

    let first = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    approve_member(&pool, &mailer, &config, &first).await;
    let second = submit_member(&pool, &mailer, &config, "m-2", "jose@example.com", "pastor@example.com").await;
    approve_member(&pool, &mailer, &config, &second).await;

    // One member's failed delivery never aborts the pass: the sweep still
    // reaches every member and reports cleanly.
    let the_26th = NaiveDate::from_ymd_opt(2025, 6, 26).unwrap();
    let summary = sweep::run_reminder_sweep(&pool, &mailer, &config, the_26th)
        .await
        .unwrap();
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.reminded, 0);
}

#[tokio::test]
async fn sweep_only_targets_approved_members() {
    let pool = test_pool().await;
    let (mailer, transport) = recording_mailer();
    let config = test_config();

    // Endorsed but not finally approved.
    let id = submit_member(&pool, &mailer, &config, "m-1", "maria@example.com", "pastor@example.com").await;
    token::consume(&pool, &mailer, &config, &id, Decision::Approved, None, "Ptr. Cruz")
        .await
        .unwrap();

    let the_26th = NaiveDate::from_ymd_opt(2025, 6, 26).unwrap();
    let summary = sweep::run_reminder_sweep(&pool, &mailer, &config, the_26th)
        .await
        .unwrap();
    assert_eq!(summary.checked, 0);
    assert!(!transport
        .messages()
        .iter()
        .any(|m| m.subject.contains("Contribution Reminder")));
}
