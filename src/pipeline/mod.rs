//! Follow-up and meeting decision pipeline.
//!
//! Every inbox message flows through:
//! 1. `ClassificationRouter::route()`: classify the snippet
//! 2. `MeetingScheduler::schedule()`: book and record a meeting, or
//! 3. `FollowupTracker::advance()`: step the correspondent's escalation
//!
//! The router turns each result into one `OutcomeLine`; failures are per
//! message and never fall through from scheduling to follow-up.

pub mod escalation;
pub mod followup;
pub mod meeting;
pub mod router;

pub use escalation::{Escalation, MAX_ATTEMPTS, select_message};
pub use followup::{FollowupOutcome, FollowupTracker};
pub use meeting::{ConfirmationSummary, MeetingScheduler, default_meeting_time};
pub use router::{ClassificationRouter, Outcome, OutcomeLine, Sender, parse_sender, render_summary};
