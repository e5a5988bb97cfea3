//! Reactive trigger layer — converts accepted record transitions into
//! notifications.
//!
//! Planning is a pure diff of before/after snapshots so the transition
//! rules stay unit-testable; dispatch performs the sends. One-shot
//! notifications follow the check-flag → send → set-flag discipline, so a
//! crash between send and flag write can duplicate a message (accepted:
//! at-most-once is not guaranteed here, see DESIGN.md). Dispatch failures
//! are logged and swallowed — they must never fail the workflow transition
//! that triggered them, nor re-enter any retry machinery.

use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::mailer::Mailer;
use crate::model::{
    Application, Contribution, ContributionStatus, EndorsementStatus, FinalStatus, ReviewStatus,
    Supervisor,
};

// ─────────────────────────────────────────────────────────
// Transition planning
// ─────────────────────────────────────────────────────────

/// Notifications owed for an observed application update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedNotification {
    /// Final approval reached `approved` for the first time and the
    /// welcome flag is still clear.
    Welcome,
    /// Admin review newly became `rejected` or `returned`. Deliberately
    /// unguarded: repeated returns re-send.
    ActionRequired,
    /// Pastor endorsement newly became `approved`.
    SupervisorConfirmation,
}

/// Diff two application snapshots into the notifications to dispatch.
pub fn plan_application_update(
    before: &Application,
    after: &Application,
) -> Vec<PlannedNotification> {
    let mut planned = Vec::new();

    if before.final_approval_status != FinalStatus::Approved
        && after.final_approval_status == FinalStatus::Approved
        && !after.welcome_email_sent
    {
        planned.push(PlannedNotification::Welcome);
    }

    let review_entered = |status| {
        before.admin_review_status != status && after.admin_review_status == status
    };
    if review_entered(ReviewStatus::Rejected) || review_entered(ReviewStatus::Returned) {
        planned.push(PlannedNotification::ActionRequired);
    }

    if before.pastor_endorsement_status != EndorsementStatus::Approved
        && after.pastor_endorsement_status == EndorsementStatus::Approved
    {
        planned.push(PlannedNotification::SupervisorConfirmation);
    }

    planned
}

/// Did this contribution update cross into `confirmed` with the receipt
/// email still owed?
pub fn receipt_email_due(before: &Contribution, after: &Contribution) -> bool {
    before.status != ContributionStatus::Confirmed
        && after.status == ContributionStatus::Confirmed
        && !after.receipt_sent
}

// ─────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────

/// React to a committed application update. Best-effort; never returns an
/// error to the caller.
pub async fn on_application_updated(
    pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    before: &Application,
    after: &Application,
) {
    for planned in plan_application_update(before, after) {
        match planned {
            PlannedNotification::Welcome => {
                let (subject, body) = welcome_email(after.first_name(), &config.public_origin);
                match mailer.send(after.contact_email(), &subject, &body).await {
                    Ok(_) => {
                        // Flag is written after the send; see module docs.
                        if let Err(e) = db::set_welcome_flag(pool, &after.id, chrono::Utc::now()).await
                        {
                            error!("Failed to persist welcome flag for {}: {e}", after.id);
                        } else {
                            info!("Sent approval email to {}", after.contact_email());
                        }
                    }
                    Err(e) => error!("Welcome email to {} failed: {e}", after.contact_email()),
                }
            }
            PlannedNotification::ActionRequired => {
                let (subject, body) =
                    action_required_email(after.first_name(), &config.public_origin);
                if let Err(e) = mailer.send(after.contact_email(), &subject, &body).await {
                    error!("Action-required email to {} failed: {e}", after.contact_email());
                }
            }
            PlannedNotification::SupervisorConfirmation => {
                let Some(supervisor) = &after.personal_info.supervisor else {
                    warn!("Application {} has no supervisor on record. Skipping.", after.id);
                    continue;
                };
                let (subject, body) = supervisor_confirmation_email(
                    &supervisor.name,
                    &after.personal_info.full_name(),
                );
                if let Err(e) = mailer.send(&supervisor.email, &subject, &body).await {
                    error!("Supervisor confirmation to {} failed: {e}", supervisor.email);
                }
            }
        }
    }
}

/// React to a newly submitted application: endorsement request to the
/// supervisor, plus submission summaries to the applicant and the fixed
/// administrative mailbox.
pub async fn on_application_created(mailer: &Mailer, config: &Config, app: &Application) {
    match (&app.personal_info.supervisor, &app.pastor_endorsement_token) {
        (Some(supervisor), Some(token)) if !supervisor.email.trim().is_empty() => {
            let link = config.endorsement_link(token);
            let (subject, body) = endorsement_request_email(
                &supervisor.name,
                &app.personal_info.full_name(),
                &link,
            );
            match mailer.send(&supervisor.email, &subject, &body).await {
                Ok(_) => info!("Sent endorsement request to supervisor {}", supervisor.email),
                Err(e) => error!("Endorsement request to {} failed: {e}", supervisor.email),
            }
        }
        _ => warn!(
            "Application {} missing supervisor email or endorsement token. Skipping supervisor email.",
            app.id
        ),
    }

    let applicant_email = app.contact_email();
    if !applicant_email.trim().is_empty() {
        let (subject, body) = submission_summary_email(app, false);
        if let Err(e) = mailer.send(applicant_email, &subject, &body).await {
            error!("Submission summary to {applicant_email} failed: {e}");
        }
        let (subject, body) = submission_summary_email(app, true);
        if let Err(e) = mailer.send(&config.admin_email, &subject, &body).await {
            error!("Admin submission copy to {} failed: {e}", config.admin_email);
        }
    }
}

/// React to an endorsement token re-issue: the request email goes out
/// again carrying the fresh link. Best-effort; the re-issue stands even
/// when delivery fails.
pub async fn on_endorsement_reissued(
    mailer: &Mailer,
    config: &Config,
    supervisor: &Supervisor,
    applicant_name: &str,
    token: &str,
) {
    let link = config.endorsement_link(token);
    let (subject, body) = endorsement_request_email(&supervisor.name, applicant_name, &link);
    match mailer.send(&supervisor.email, &subject, &body).await {
        Ok(_) => info!("Re-sent endorsement request to supervisor {}", supervisor.email),
        Err(e) => error!(
            "Endorsement request resend to {} failed: {e}",
            supervisor.email
        ),
    }
}

/// React to a committed contribution update: payment-confirmation receipt,
/// guarded by the `receipt_sent` flag.
pub async fn on_contribution_updated(
    pool: &SqlitePool,
    mailer: &Mailer,
    before: &Contribution,
    after: &Contribution,
) {
    if !receipt_email_due(before, after) {
        return;
    }

    let member = match db::get_application(pool, &after.member_id).await {
        Ok(Some(app)) => app,
        Ok(None) => {
            warn!(
                "Member {} not found for contribution {}",
                after.member_id, after.id
            );
            return;
        }
        Err(e) => {
            error!("Member lookup failed for contribution {}: {e}", after.id);
            return;
        }
    };

    let (subject, body) = payment_confirmed_email(member.first_name(), &after.month, after.amount);
    match mailer.send(member.contact_email(), &subject, &body).await {
        Ok(_) => {
            if let Err(e) = db::set_receipt_sent(pool, &after.id, chrono::Utc::now()).await {
                error!("Failed to persist receipt flag for {}: {e}", after.id);
            } else {
                info!(
                    "Sent receipt email to {} for contribution {}",
                    member.contact_email(),
                    after.id
                );
            }
        }
        Err(e) => error!("Receipt email for contribution {} failed: {e}", after.id),
    }
}

// ─────────────────────────────────────────────────────────
// Message templates
// ─────────────────────────────────────────────────────────

pub fn welcome_email(first_name: &str, origin: &str) -> (String, String) {
    (
        "Welcome to Parish Care - Application Approved".to_string(),
        format!(
            "Dear {first_name},\n\n\
             Congratulations! Your Parish Care membership application has been officially APPROVED.\n\n\
             You are now a verified member. You can access your member dashboard to track your \
             contribution history and eligibility status.\n\n\
             Login here: {origin}/\n\n\
             Welcome to the family!\n\
             Parish Care Admin Team"
        ),
    )
}

pub fn action_required_email(first_name: &str, origin: &str) -> (String, String) {
    (
        "Parish Care Application Update - Action Required".to_string(),
        format!(
            "Dear {first_name},\n\n\
             Your application requires some changes. An administrator has reviewed your documents \
             and requested corrections.\n\n\
             Please log in to your dashboard to view the admin notes and update your application \
             accordingly.\n\n\
             Login here: {origin}/\n\n\
             Thank you,\nParish Care Admin Team"
        ),
    )
}

pub fn supervisor_confirmation_email(pastor_name: &str, applicant_name: &str) -> (String, String) {
    (
        format!("Endorsement Submitted - {applicant_name}"),
        format!(
            "Dear {pastor_name},\n\n\
             Thank you. Your endorsement for {applicant_name} has been recorded and the \
             application has moved to administrative review.\n\n\
             No further action is needed on your part.\n\n\
             Parish Care Admin Team"
        ),
    )
}

pub fn endorsement_request_email(
    pastor_name: &str,
    applicant_name: &str,
    link: &str,
) -> (String, String) {
    (
        format!("Endorsement Request for {applicant_name}"),
        format!(
            "Dear {pastor_name},\n\n\
             {applicant_name} has applied for Parish Care membership and named you as their \
             supervising pastor. Please review and endorse (or decline) the application using \
             the secure link below:\n\n\
             {link}\n\n\
             The link is single-use and tied to this application only.\n\n\
             Thank you,\nParish Care Admin Team"
        ),
    )
}

pub fn submission_summary_email(app: &Application, admin_copy: bool) -> (String, String) {
    let name = app.personal_info.full_name();
    let outreach = app
        .personal_info
        .outreach
        .as_deref()
        .unwrap_or("Not specified");
    if admin_copy {
        (
            format!("New Application Received - {name}"),
            format!(
                "A new Parish Care membership application was submitted.\n\n\
                 Applicant: {name}\n\
                 Email: {}\n\
                 Outreach: {outreach}\n\
                 Status: {}\n",
                app.contact_email(),
                app.status
            ),
        )
    } else {
        (
            "Parish Care Application Received".to_string(),
            format!(
                "Dear {},\n\n\
                 We have received your membership application. Your supervising pastor has been \
                 asked to endorse it; you will be notified as it moves through review.\n\n\
                 Current status: {}\n\n\
                 Thank you,\nParish Care Admin Team",
                app.first_name(),
                app.status
            ),
        )
    }
}

pub fn payment_confirmed_email(first_name: &str, month: &str, amount: i64) -> (String, String) {
    (
        "Payment Confirmed - Parish Care Contribution".to_string(),
        format!(
            "Dear {first_name},\n\n\
             We have received and confirmed your contribution for the month of {month}.\n\
             Amount: PHP {amount}\n\n\
             Thank you for your faithfulness. Your eligibility streak has been updated.\n\n\
             Parish Care Admin Team"
        ),
    )
}

pub fn reminder_email(first_name: &str, month: &str, origin: &str) -> (String, String) {
    (
        "Parish Care Contribution Reminder".to_string(),
        format!(
            "Dear {first_name},\n\n\
             This is a gentle reminder that we haven't received your contribution for {month} yet.\n\
             Please log in to your dashboard to upload your receipt before the end of the month \
             to maintain your eligibility streak.\n\n\
             Login here: {origin}/\n\n\
             Thank you,\nParish Care Team"
        ),
    )
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersonalInfo;
    use chrono::Utc;

    fn application(
        endorsement: EndorsementStatus,
        review: ReviewStatus,
        final_approval: FinalStatus,
        welcome_sent: bool,
    ) -> Application {
        let now = Utc::now();
        Application {
            id: "member-1".to_string(),
            email: "member@example.com".to_string(),
            personal_info: PersonalInfo {
                first_name: "Maria".to_string(),
                surname: "Santos".to_string(),
                email: "member@example.com".to_string(),
                phone: None,
                address: None,
                outreach: None,
                job_title: None,
                supervisor: None,
                beneficiaries: vec![],
            },
            pastor_endorsement_status: endorsement,
            pastor_endorsement_token: None,
            pastor_endorsement_by: None,
            pastor_endorsement_at: None,
            pastor_endorsement_notes: None,
            admin_review_status: review,
            final_approval_status: final_approval,
            status: String::new(),
            welcome_email_sent: welcome_sent,
            submitted_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn plans_welcome_on_first_final_approval() {
        let before = application(
            EndorsementStatus::Approved,
            ReviewStatus::Approved,
            FinalStatus::Pending,
            false,
        );
        let after = application(
            EndorsementStatus::Approved,
            ReviewStatus::Approved,
            FinalStatus::Approved,
            false,
        );
        assert_eq!(
            plan_application_update(&before, &after),
            vec![PlannedNotification::Welcome]
        );
    }

    #[test]
    fn welcome_suppressed_when_flag_already_set() {
        let before = application(
            EndorsementStatus::Approved,
            ReviewStatus::Approved,
            FinalStatus::Pending,
            true,
        );
        let after = application(
            EndorsementStatus::Approved,
            ReviewStatus::Approved,
            FinalStatus::Approved,
            true,
        );
        assert!(plan_application_update(&before, &after).is_empty());
    }

    #[test]
    fn no_welcome_without_transition() {
        let approved = application(
            EndorsementStatus::Approved,
            ReviewStatus::Approved,
            FinalStatus::Approved,
            false,
        );
        assert!(plan_application_update(&approved, &approved).is_empty());
    }

    #[test]
    fn plans_action_required_on_return_every_time() {
        let before = application(
            EndorsementStatus::Approved,
            ReviewStatus::Pending,
            FinalStatus::Pending,
            false,
        );
        let after = application(
            EndorsementStatus::Approved,
            ReviewStatus::Returned,
            FinalStatus::Pending,
            false,
        );
        assert_eq!(
            plan_application_update(&before, &after),
            vec![PlannedNotification::ActionRequired]
        );
        // Repeated returns plan again: reminders to revise are intentional.
        assert_eq!(
            plan_application_update(&before, &after),
            vec![PlannedNotification::ActionRequired]
        );
    }

    #[test]
    fn plans_supervisor_confirmation_on_endorsement() {
        let before = application(
            EndorsementStatus::Pending,
            ReviewStatus::Pending,
            FinalStatus::Pending,
            false,
        );
        let after = application(
            EndorsementStatus::Approved,
            ReviewStatus::Pending,
            FinalStatus::Pending,
            false,
        );
        assert_eq!(
            plan_application_update(&before, &after),
            vec![PlannedNotification::SupervisorConfirmation]
        );
    }

    #[test]
    fn supervisor_confirmation_subject_names_the_event() {
        let (subject, _) = supervisor_confirmation_email("Ptr. Cruz", "Maria Santos");
        assert!(subject.contains("Endorsement Submitted"));
    }

    #[test]
    fn receipt_due_only_on_first_confirmation() {
        let now = Utc::now();
        let base = Contribution {
            id: "c-1".to_string(),
            member_id: "member-1".to_string(),
            month: "2025-06".to_string(),
            amount: 500,
            receipt_url: "https://files.example/receipt.png".to_string(),
            status: ContributionStatus::Pending,
            receipt_sent: false,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        };
        let confirmed = Contribution {
            status: ContributionStatus::Confirmed,
            ..base.clone()
        };
        assert!(receipt_email_due(&base, &confirmed));

        // confirmed → confirmed is a no-op.
        assert!(!receipt_email_due(&confirmed, &confirmed));

        let flagged = Contribution {
            receipt_sent: true,
            ..confirmed.clone()
        };
        assert!(!receipt_email_due(&base, &flagged));
    }
}
