//! Meeting scheduler: resolve a time, draft an agenda, book, record.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, NaiveTime};

use crate::config::SchedulingConfig;
use crate::error::{PipelineError, ServiceError};
use crate::services::{AgendaGenerator, CalendarService, EventRequest, TimeExtractor};
use crate::store::{Database, MeetingRecord};

/// Display format for meeting times in confirmations.
const CONFIRMATION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Confirmation produced for a booked meeting.
#[derive(Debug, Clone)]
pub struct ConfirmationSummary {
    pub meeting: MeetingRecord,
    pub agenda: String,
    pub subject: String,
    pub body: String,
}

impl ConfirmationSummary {
    fn new(meeting: MeetingRecord, agenda: String) -> Self {
        let body = format!(
            "Hi {},\n\nYour meeting has been scheduled on {}.\n\nAgenda: {}\n\nThanks",
            meeting.name,
            meeting.meeting_time.format(CONFIRMATION_TIME_FORMAT),
            agenda
        );
        Self {
            meeting,
            agenda,
            subject: "Meeting Scheduled".to_string(),
            body,
        }
    }
}

/// Start time used when the request names none: `hour`:00 on the day after `now`.
pub fn default_meeting_time(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let day = now.date().succ_opt().unwrap_or(now.date());
    day.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub struct MeetingScheduler {
    db: Arc<dyn Database>,
    extractor: Arc<dyn TimeExtractor>,
    agenda: Arc<dyn AgendaGenerator>,
    calendar: Arc<dyn CalendarService>,
    config: SchedulingConfig,
    clock: fn() -> NaiveDateTime,
}

impl MeetingScheduler {
    pub fn new(
        db: Arc<dyn Database>,
        extractor: Arc<dyn TimeExtractor>,
        agenda: Arc<dyn AgendaGenerator>,
        calendar: Arc<dyn CalendarService>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            db,
            extractor,
            agenda,
            calendar,
            config,
            clock: local_now,
        }
    }

    /// Replace the local clock used for the no-time default.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Book a meeting with `email`. Nothing is persisted unless the calendar
    /// accepts the event.
    pub async fn schedule(
        &self,
        email: &str,
        name: &str,
        content: &str,
    ) -> Result<ConfirmationSummary, PipelineError> {
        let scheduling_failed = |source: ServiceError| PipelineError::Scheduling {
            email: email.to_string(),
            source,
        };

        let meeting_time = match self
            .extractor
            .extract_time(content)
            .await
            .map_err(scheduling_failed)?
        {
            Some(time) => time,
            None => {
                let fallback =
                    default_meeting_time((self.clock)(), self.config.default_meeting_hour);
                tracing::debug!(email = %email, %fallback, "No meeting time proposed, using default");
                fallback
            }
        };

        let agenda = self
            .agenda
            .summarize_as_agenda(content)
            .await
            .map_err(scheduling_failed)?;

        let event = EventRequest {
            attendee: email.to_string(),
            summary: format!("Meeting with {name}"),
            start: meeting_time,
            duration_minutes: self.config.meeting_minutes,
            description: agenda.clone(),
        };
        self.calendar
            .book_event(&event)
            .await
            .map_err(scheduling_failed)?;

        let meeting = MeetingRecord::new(email, name, content, meeting_time);
        self.db
            .insert_meeting(&meeting)
            .await
            .map_err(|source| PipelineError::MeetingNotRecorded {
                email: email.to_string(),
                source,
            })?;

        let summary = ConfirmationSummary::new(meeting, agenda);
        tracing::info!(
            to = %email,
            subject = %summary.subject,
            meeting_time = %summary.meeting.meeting_time_str(),
            "Meeting scheduled, confirmation ready"
        );
        Ok(summary)
    }
}
