//! Google Calendar API v3: event booking.

use async_trait::async_trait;
use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::google::check_status;
use super::{CalendarService, EventRequest};
use crate::config::SchedulingConfig;
use crate::error::ServiceError;

const SERVICE: &str = "calendar";
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ── API request body ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventBody {
    summary: String,
    description: String,
    start: EventDateTime,
    end: EventDateTime,
    attendees: Vec<Attendee>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    date_time: String,
    time_zone: String,
}

#[derive(Debug, Serialize)]
struct Attendee {
    email: String,
}

impl EventBody {
    fn from_request(event: &EventRequest, time_zone: &str) -> Result<Self, ServiceError> {
        let end = Duration::try_minutes(event.duration_minutes)
            .and_then(|length| event.start.checked_add_signed(length))
            .ok_or_else(|| {
                ServiceError::invalid_request(
                    SERVICE,
                    format!("event length of {} minutes is out of range", event.duration_minutes),
                )
            })?;
        Ok(Self {
            summary: event.summary.clone(),
            description: event.description.clone(),
            start: EventDateTime {
                date_time: event.start.format(EVENT_TIME_FORMAT).to_string(),
                time_zone: time_zone.to_string(),
            },
            end: EventDateTime {
                date_time: end.format(EVENT_TIME_FORMAT).to_string(),
                time_zone: time_zone.to_string(),
            },
            attendees: vec![Attendee {
                email: event.attendee.clone(),
            }],
        })
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Books events on one Google calendar in a fixed time zone.
pub struct GoogleCalendar {
    client: reqwest::Client,
    access_token: SecretString,
    base_url: String,
    calendar_id: String,
    time_zone: String,
}

impl GoogleCalendar {
    pub fn new(access_token: SecretString, scheduling: &SchedulingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            calendar_id: scheduling.calendar_id.clone(),
            time_zone: scheduling.calendar_time_zone.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// `{base}/calendars/{id}/events`, with the calendar id as one encoded segment.
    fn events_url(&self) -> Result<reqwest::Url, ServiceError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ServiceError::invalid_request(SERVICE, format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::invalid_request(SERVICE, "base URL cannot take a path"))?
            .pop_if_empty()
            .push("calendars")
            .push(&self.calendar_id)
            .push("events");
        Ok(url)
    }
}

#[async_trait]
impl CalendarService for GoogleCalendar {
    async fn book_event(&self, event: &EventRequest) -> Result<(), ServiceError> {
        let body = EventBody::from_request(event, &self.time_zone)?;
        // Single attempt: event inserts are never retried.
        let response = self
            .client
            .post(self.events_url()?)
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::unavailable(SERVICE, e))?;
        check_status(SERVICE, response).await?;

        tracing::info!(
            attendee = %event.attendee,
            start = %body.start.date_time,
            time_zone = %self.time_zone,
            "Calendar event created"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::google::fake::FakeGoogle;
    use chrono::NaiveDate;

    fn request() -> EventRequest {
        EventRequest {
            attendee: "jane@x.com".into(),
            summary: "Meeting with Jane".into(),
            start: NaiveDate::from_ymd_opt(2024, 6, 4)
                .unwrap()
                .and_hms_opt(15, 0, 0)
                .unwrap(),
            duration_minutes: 30,
            description: "1. Proposal review".into(),
        }
    }

    #[test]
    fn event_body_serializes_in_google_shape() {
        let body = EventBody::from_request(&request(), "Asia/Kolkata").unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["summary"], "Meeting with Jane");
        assert_eq!(json["description"], "1. Proposal review");
        assert_eq!(json["start"]["dateTime"], "2024-06-04T15:00:00");
        assert_eq!(json["start"]["timeZone"], "Asia/Kolkata");
        assert_eq!(json["end"]["dateTime"], "2024-06-04T15:30:00");
        assert_eq!(json["attendees"][0]["email"], "jane@x.com");
    }

    #[test]
    fn end_time_rolls_over_midnight() {
        let mut event = request();
        event.start = NaiveDate::from_ymd_opt(2024, 6, 4)
            .unwrap()
            .and_hms_opt(23, 45, 0)
            .unwrap();
        let body = EventBody::from_request(&event, "UTC").unwrap();
        assert_eq!(body.end.date_time, "2024-06-05T00:15:00");
    }

    #[test]
    fn out_of_range_length_is_rejected() {
        let mut event = request();
        event.duration_minutes = i64::MAX;
        assert!(matches!(
            EventBody::from_request(&event, "UTC"),
            Err(ServiceError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn events_url_uses_configured_calendar() {
        let scheduling = SchedulingConfig {
            calendar_id: "team@group.calendar.google.com".into(),
            ..SchedulingConfig::default()
        };
        let calendar = GoogleCalendar::new(SecretString::from("t"), &scheduling)
            .with_base_url("http://127.0.0.1:9/");
        assert_eq!(
            calendar.events_url().unwrap().as_str(),
            "http://127.0.0.1:9/calendars/team@group.calendar.google.com/events"
        );
    }

    #[test]
    fn events_url_encodes_calendar_id() {
        let scheduling = SchedulingConfig {
            calendar_id: "en.usa#holiday@group.v.calendar.google.com".into(),
            ..SchedulingConfig::default()
        };
        let calendar = GoogleCalendar::new(SecretString::from("t"), &scheduling);
        let url = calendar.events_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/en.usa%23holiday@group.v.calendar.google.com/events"
        );
        assert!(url.fragment().is_none());
    }

    #[tokio::test]
    async fn insert_is_sent_once_even_on_server_error() {
        let server = FakeGoogle::start(|method, path, index| {
            assert_eq!(method, "POST");
            assert_eq!(path, "/calendars/primary/events");
            match index {
                0 => (500, r#"{"error":"backend"}"#.into()),
                _ => (200, r#"{"id":"evt1"}"#.into()),
            }
        })
        .await;
        let calendar = GoogleCalendar::new(SecretString::from("t"), &SchedulingConfig::default())
            .with_base_url(&server.base_url);

        let err = calendar.book_event(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Api { status: 500, .. }));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn insert_succeeds_on_ok() {
        let server = FakeGoogle::start(|_, _, _| (200, r#"{"id":"evt1"}"#.into())).await;
        let calendar = GoogleCalendar::new(SecretString::from("t"), &SchedulingConfig::default())
            .with_base_url(&server.base_url);

        calendar.book_event(&request()).await.unwrap();
        assert_eq!(server.hits(), 1);
    }
}
