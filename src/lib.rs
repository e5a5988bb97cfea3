//! Parish Care membership workflow core.
//!
//! Applicants submit enrollment forms, a supervising pastor endorses them
//! through a tokenized single-use link, an administrator reviews and grants
//! final approval, and members submit monthly contribution receipts for
//! confirmation. Status transitions feed a reactive trigger layer that
//! dispatches at-most-once notification emails; a daily sweep reminds
//! approved members who have not contributed for the current month.

pub mod api;
pub mod config;
pub mod contrib;
pub mod db;
pub mod errors;
pub mod mailer;
pub mod model;
pub mod notify;
pub mod state;
pub mod sweep;
pub mod token;
