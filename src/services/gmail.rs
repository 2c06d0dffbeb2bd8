//! Gmail API v1: list the most recent inbox messages.
//!
//! Lists message ids labelled `INBOX`, then fetches `From`/`Subject`
//! metadata and the snippet for each. A message that cannot be fetched keeps
//! its slot as an [`UnreadableMessage`]; a failed listing fails the whole call.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::google::{RetryPolicy, check_status, send_with_retry};
use super::{InboxEntry, InboxMessage, InboxSource, UnreadableMessage};
use crate::error::ServiceError;

const SERVICE: &str = "gmail";
const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

// ── API response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

impl MessageDetail {
    fn into_inbox_message(self) -> InboxMessage {
        let headers = self
            .payload
            .as_ref()
            .map(|p| &p.headers[..])
            .unwrap_or(&[]);

        let get_header = |name: &str| -> String {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
                .unwrap_or_default()
        };

        InboxMessage {
            from: get_header("From"),
            subject: get_header("Subject"),
            snippet: self.snippet,
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail-backed inbox source.
pub struct GmailInbox {
    client: reqwest::Client,
    access_token: SecretString,
    base_url: String,
    retry: RetryPolicy,
}

impl GmailInbox {
    pub fn new(access_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at another endpoint (e.g. a local fake).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn fetch_message(&self, id: &str) -> Result<InboxMessage, ServiceError> {
        let url = format!("{}/messages/{}", self.base_url, id);
        let request = self
            .client
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Subject"),
            ]);
        let response = send_with_retry(SERVICE, request, &self.retry).await?;
        let response = check_status(SERVICE, response).await?;
        let detail: MessageDetail = response
            .json()
            .await
            .map_err(|e| ServiceError::invalid_response(SERVICE, e))?;
        Ok(detail.into_inbox_message())
    }
}

#[async_trait]
impl InboxSource for GmailInbox {
    async fn list_recent(&self, max_results: u32) -> Result<Vec<InboxEntry>, ServiceError> {
        let request = self
            .client
            .get(format!("{}/messages", self.base_url))
            .bearer_auth(self.access_token.expose_secret())
            .query(&[
                ("labelIds", "INBOX".to_string()),
                ("maxResults", max_results.to_string()),
            ]);
        let response = send_with_retry(SERVICE, request, &self.retry).await?;
        let response = check_status(SERVICE, response).await?;
        let list: MessageListResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::invalid_response(SERVICE, e))?;

        let mut entries = Vec::with_capacity(list.messages.len());
        for stub in list.messages {
            match self.fetch_message(&stub.id).await {
                Ok(message) => entries.push(Ok(message)),
                Err(error) => {
                    tracing::warn!(id = %stub.id, error = %error, "Inbox message could not be read");
                    entries.push(Err(UnreadableMessage { id: stub.id, error }));
                }
            }
        }

        tracing::debug!(count = entries.len(), "Fetched inbox messages");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::google::fake::FakeGoogle;

    #[test]
    fn message_list_deserialization() {
        let json = r#"{"messages":[{"id":"a1","threadId":"t1"},{"id":"b2","threadId":"t2"}],"resultSizeEstimate":2}"#;
        let list: MessageListResponse = serde_json::from_str(json).unwrap();
        let ids: Vec<&str> = list.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b2"]);
    }

    #[test]
    fn empty_inbox_deserializes() {
        let list: MessageListResponse = serde_json::from_str(r#"{"resultSizeEstimate":0}"#).unwrap();
        assert!(list.messages.is_empty());
    }

    #[test]
    fn detail_maps_headers_case_insensitively() {
        let json = r#"{
            "id": "a1",
            "snippet": "Can we meet Tuesday 3pm?",
            "payload": {"headers": [
                {"name": "from", "value": "Jane <jane@x.com>"},
                {"name": "Subject", "value": "Re: Proposal"}
            ]}
        }"#;
        let detail: MessageDetail = serde_json::from_str(json).unwrap();
        let message = detail.into_inbox_message();
        assert_eq!(
            message,
            InboxMessage::new("Jane <jane@x.com>", "Re: Proposal", "Can we meet Tuesday 3pm?")
        );
    }

    #[test]
    fn detail_without_payload_has_empty_headers() {
        let detail: MessageDetail = serde_json::from_str(r#"{"snippet":"hi"}"#).unwrap();
        let message = detail.into_inbox_message();
        assert!(message.from.is_empty());
        assert_eq!(message.snippet, "hi");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let inbox = GmailInbox::new(SecretString::from("t")).with_base_url("http://127.0.0.1:9/");
        assert_eq!(inbox.base_url, "http://127.0.0.1:9");
    }

    fn two_message_inbox(_method: &str, path: &str, _index: usize) -> (u16, String) {
        if path.starts_with("/messages?") {
            (200, r#"{"messages":[{"id":"a1"},{"id":"b2"}]}"#.into())
        } else if path.starts_with("/messages/a1?") {
            (
                200,
                r#"{"snippet":"Can we meet?","payload":{"headers":[
                    {"name":"From","value":"Jane <jane@x.com>"},
                    {"name":"Subject","value":"Re: Proposal"}]}}"#
                    .into(),
            )
        } else {
            (404, r#"{"error":"not found"}"#.into())
        }
    }

    #[tokio::test]
    async fn unreadable_message_keeps_its_slot() {
        let server = FakeGoogle::start(two_message_inbox).await;
        let inbox = GmailInbox::new(SecretString::from("t")).with_base_url(&server.base_url);

        let entries = inbox.list_recent(5).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].as_ref().unwrap(),
            &InboxMessage::new("Jane <jane@x.com>", "Re: Proposal", "Can we meet?")
        );
        let unreadable = entries[1].as_ref().unwrap_err();
        assert_eq!(unreadable.id, "b2");
        assert!(matches!(unreadable.error, ServiceError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn failed_listing_fails_the_call() {
        let server = FakeGoogle::start(|_, _, _| (401, "{}".into())).await;
        let inbox = GmailInbox::new(SecretString::from("t")).with_base_url(&server.base_url);

        let err = inbox.list_recent(5).await.unwrap_err();
        assert!(matches!(err, ServiceError::AuthExpired { .. }));
    }
}
