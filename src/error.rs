//! Error types for the inbox scheduler.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    /// Another writer held the database; safe to retry.
    #[error("Store contention: {0}")]
    Contention(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    /// Classify a libsql failure, separating lock contention from other query errors.
    pub fn from_libsql(context: &str, err: libsql::Error) -> Self {
        let message = err.to_string();
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("database is locked") || lowered.contains("sqlite_busy") {
            DatabaseError::Contention(format!("{context}: {message}"))
        } else {
            DatabaseError::Query(format!("{context}: {message}"))
        }
    }

    pub fn is_contention(&self) -> bool {
        matches!(self, DatabaseError::Contention(_))
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Failures of the external collaborators (inbox, classifier, extractor,
/// agenda generator, calendar).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    #[error("{service} rejected the request ({status}): {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{service} credentials expired or revoked")]
    AuthExpired { service: String },

    #[error("{service} request could not be built: {reason}")]
    InvalidRequest { service: String, reason: String },

    #[error("{service} returned an unusable response: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("Classifier verdict was neither yes nor no: {verdict:?}")]
    AmbiguousVerdict { verdict: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

impl ServiceError {
    pub fn unavailable(service: &str, reason: impl std::fmt::Display) -> Self {
        ServiceError::Unavailable {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_request(service: &str, reason: impl std::fmt::Display) -> Self {
        ServiceError::InvalidRequest {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_response(service: &str, reason: impl std::fmt::Display) -> Self {
        ServiceError::InvalidResponse {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Pipeline-related errors, one per routed message.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Scheduling failed for {email}: {source}")]
    Scheduling {
        email: String,
        #[source]
        source: ServiceError,
    },

    #[error("Meeting booked for {email} but not recorded: {source}")]
    MeetingNotRecorded {
        email: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Classification failed: {0}")]
    Classification(#[source] ServiceError),

    #[error("Follow-up failed for {email}: {source}")]
    Followup {
        email: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Inbox fetch failed: {0}")]
    InboxFetch(#[source] ServiceError),

    #[error("Message {id} could not be read: {source}")]
    MessageFetch {
        id: String,
        #[source]
        source: ServiceError,
    },
}

/// Client protocol errors. Reported to the client; the connection survives.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("command handler failed unexpectedly")]
    HandlerPanicked,
}
