//! Canonical workflow types: status enums, the derived-status function, and
//! the record shapes stored in / read from the database.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, WorkflowError};

// ─────────────────────────────────────────────────────────
// Status tracks
// ─────────────────────────────────────────────────────────

/// Pastor endorsement track. Terminal once it leaves `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EndorsementStatus {
    Pending,
    Approved,
    Rejected,
}

/// Admin review track. `Returned` may flow back to `Pending` on resubmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

/// Final approval track. Terminal once it leaves `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FinalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Contribution receipt lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ContributionStatus {
    Pending,
    Confirmed,
    Rejected,
}

/// A binary approve/reject decision taken by a pastor or an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl EndorsementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
        }
    }
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl ContributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Derived status
// ─────────────────────────────────────────────────────────

/// Compute the human-readable summary from the three sub-tracks plus the
/// draft pseudo-state. This is the only place the summary is ever derived;
/// it is recomputed inside every accepted transition and never written
/// independently.
pub fn derive_status(
    draft: bool,
    endorsement: EndorsementStatus,
    review: ReviewStatus,
    final_approval: FinalStatus,
) -> &'static str {
    if draft {
        return "Draft";
    }
    match final_approval {
        FinalStatus::Approved => return "APPROVED - Active Member",
        FinalStatus::Rejected => return "Rejected",
        FinalStatus::Pending => {}
    }
    match endorsement {
        EndorsementStatus::Pending => return "Pending Pastor Endorsement",
        EndorsementStatus::Rejected => return "Rejected by Pastor",
        EndorsementStatus::Approved => {}
    }
    match review {
        ReviewStatus::Pending => "Pending Admin Review",
        ReviewStatus::Returned => "Returned for Revision",
        ReviewStatus::Rejected => "Rejected by Admin",
        ReviewStatus::Approved => "Pending Final Approval",
    }
}

// ─────────────────────────────────────────────────────────
// Personal info document
// ─────────────────────────────────────────────────────────

/// Supervising pastor contact details, the endorsement counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supervisor {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beneficiary {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub relationship: String,
}

/// Structured applicant details, stored as a JSON column on the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalInfo {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outreach: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor: Option<Supervisor>,
    #[serde(default)]
    pub beneficiaries: Vec<Beneficiary>,
}

impl PersonalInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.surname)
            .trim()
            .to_string()
    }

    /// Check the fields required for a final (non-draft) submission.
    /// Returns `ValidationFailed` before anything is written.
    pub fn validate_for_submission(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.first_name.trim().is_empty() {
            missing.push("first_name");
        }
        if self.surname.trim().is_empty() {
            missing.push("surname");
        }
        if self.email.trim().is_empty() {
            missing.push("email");
        }
        match &self.supervisor {
            None => missing.push("supervisor"),
            Some(s) => {
                if s.name.trim().is_empty() {
                    missing.push("supervisor.name");
                }
                if s.email.trim().is_empty() {
                    missing.push("supervisor.email");
                }
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::ValidationFailed(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

// ─────────────────────────────────────────────────────────
// Stored records
// ─────────────────────────────────────────────────────────

/// An application row as stored in / read from the database.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Application {
    pub id: String,
    pub email: String,
    #[sqlx(json)]
    pub personal_info: PersonalInfo,
    pub pastor_endorsement_status: EndorsementStatus,
    pub pastor_endorsement_token: Option<String>,
    pub pastor_endorsement_by: Option<String>,
    pub pastor_endorsement_at: Option<DateTime<Utc>>,
    pub pastor_endorsement_notes: Option<String>,
    pub admin_review_status: ReviewStatus,
    pub final_approval_status: FinalStatus,
    pub status: String,
    pub welcome_email_sent: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn is_draft(&self) -> bool {
        self.submitted_at.is_none()
    }

    /// Best contact address for the applicant.
    pub fn contact_email(&self) -> &str {
        if !self.personal_info.email.trim().is_empty() {
            &self.personal_info.email
        } else {
            &self.email
        }
    }

    pub fn first_name(&self) -> &str {
        if self.personal_info.first_name.trim().is_empty() {
            "Member"
        } else {
            &self.personal_info.first_name
        }
    }

    /// Recompute the summary from the current sub-tracks.
    pub fn derived_status(&self) -> &'static str {
        derive_status(
            self.is_draft(),
            self.pastor_endorsement_status,
            self.admin_review_status,
            self.final_approval_status,
        )
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdminNote {
    pub id: i64,
    pub application_id: String,
    pub author: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// A contribution row: one per member per claimed month.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Contribution {
    pub id: String,
    pub member_id: String,
    pub month: String,
    pub amount: i64,
    pub receipt_url: String,
    pub status: ContributionStatus,
    pub receipt_sent: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Format a date as the "YYYY-MM" month key used by contributions.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
