//! Daily contribution-reminder sweep.
//!
//! A background task wakes on a fixed interval and, once the calendar is
//! past the 25th of the month, scans every finally-approved member for a
//! current-month contribution. Members with none (pending counts as
//! submitted) get a reminder email. Reminders carry no idempotency flag:
//! the sweep may remind the same member again tomorrow, on purpose, until
//! a contribution appears. One member's failure never blocks the rest.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::errors::Result;
use crate::mailer::Mailer;
use crate::model::month_key;
use crate::notify;

pub struct SweepState {
    pub pool: SqlitePool,
    pub mailer: Arc<Mailer>,
    pub config: Config,
}

/// Spawnable sweep loop, in the shape of a long-running background task.
pub async fn run(state: Arc<SweepState>) {
    info!(
        "Reminder sweep starting — interval {}s",
        state.config.sweep_interval_secs
    );
    loop {
        let today = Utc::now().date_naive();
        match run_reminder_sweep(&state.pool, &state.mailer, &state.config, today).await {
            Ok(summary) => info!(
                "Reminder sweep done: checked {} members, reminded {}",
                summary.checked, summary.reminded
            ),
            Err(e) => error!("Reminder sweep failed: {e}"),
        }
        tokio::time::sleep(Duration::from_secs(state.config.sweep_interval_secs)).await;
    }
}

#[derive(Debug, Default)]
pub struct SweepSummary {
    pub checked: usize,
    pub reminded: usize,
}

/// One sweep pass for the given date. Exposed separately from the loop so
/// it can be driven directly in tests.
pub async fn run_reminder_sweep(
    pool: &SqlitePool,
    mailer: &Mailer,
    config: &Config,
    today: NaiveDate,
) -> Result<SweepSummary> {
    let mut summary = SweepSummary::default();

    if today.day() <= 25 {
        info!("It is not past the 25th yet. Skipping contribution checks.");
        return Ok(summary);
    }

    let month = month_key(today);
    let members = db::list_approved_applications(pool).await?;
    for member in members {
        summary.checked += 1;
        let email = member.contact_email();
        if email.trim().is_empty() {
            warn!("Member {} has no email. Skipping.", member.id);
            continue;
        }

        // Partial-failure isolation: log and move on to the next member.
        match db::has_effective_contribution(pool, &member.id, &month).await {
            Ok(true) => continue,
            Ok(false) => {
                let (subject, body) =
                    notify::reminder_email(member.first_name(), &month, &config.public_origin);
                match mailer.send(email, &subject, &body).await {
                    Ok(_) => {
                        summary.reminded += 1;
                        info!("Sent reminder to {email} for {month}");
                    }
                    Err(e) => error!("Reminder to {email} failed: {e}"),
                }
            }
            Err(e) => error!("Contribution check for member {} failed: {e}", member.id),
        }
    }

    Ok(summary)
}
