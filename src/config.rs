//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default listen host.
const DEFAULT_HOST: &str = "127.0.0.1";
/// Default listen port.
const DEFAULT_PORT: u16 = 8000;
/// Number of most recent inbox messages handled per `get_emails`.
pub const DEFAULT_BATCH_SIZE: u32 = 5;

/// How the classifier treats verdicts that are neither "yes" nor "no".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierMode {
    /// Anything other than "yes" counts as "no".
    #[default]
    Lenient,
    /// Only "yes" or "no" are accepted; anything else is an error.
    Strict,
}

impl FromStr for ClassifierMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::InvalidValue {
                key: "INBOX_CLASSIFIER_MODE".to_string(),
                message: format!("expected 'lenient' or 'strict', got '{other}'"),
            }),
        }
    }
}

/// Listener, storage and batch settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub batch_size: u32,
    pub classifier_mode: ClassifierMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: PathBuf::from("./data/followups.db"),
            batch_size: DEFAULT_BATCH_SIZE,
            classifier_mode: ClassifierMode::Lenient,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: std::env::var("INBOX_HOST").unwrap_or(defaults.host),
            port: env_parse("INBOX_PORT", defaults.port)?,
            db_path: std::env::var("INBOX_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            batch_size: env_parse("INBOX_BATCH_SIZE", defaults.batch_size)?,
            classifier_mode: env_parse("INBOX_CLASSIFIER_MODE", defaults.classifier_mode)?,
        })
    }

    /// Address to bind, `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Meeting booking settings.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Hour of day used when no meeting time could be extracted.
    pub default_meeting_hour: u32,
    /// Length of each booked meeting.
    pub meeting_minutes: i64,
    /// IANA time zone name sent with calendar events.
    pub calendar_time_zone: String,
    pub calendar_id: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_meeting_hour: 11,
            meeting_minutes: 30,
            calendar_time_zone: "Asia/Kolkata".to_string(),
            calendar_id: "primary".to_string(),
        }
    }
}

/// Longest meeting that may be booked: one day.
pub const MAX_MEETING_MINUTES: i64 = 24 * 60;

impl SchedulingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            default_meeting_hour: env_parse(
                "INBOX_DEFAULT_MEETING_HOUR",
                defaults.default_meeting_hour,
            )?,
            meeting_minutes: env_parse("INBOX_MEETING_MINUTES", defaults.meeting_minutes)?,
            calendar_time_zone: std::env::var("INBOX_CALENDAR_TZ")
                .unwrap_or(defaults.calendar_time_zone),
            calendar_id: std::env::var("INBOX_CALENDAR_ID").unwrap_or(defaults.calendar_id),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the hour is an hour of the day and the length is 1..=1440 minutes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_meeting_hour > 23 {
            return Err(ConfigError::InvalidValue {
                key: "INBOX_DEFAULT_MEETING_HOUR".to_string(),
                message: format!("{} is not an hour of the day", self.default_meeting_hour),
            });
        }
        if !(1..=MAX_MEETING_MINUTES).contains(&self.meeting_minutes) {
            return Err(ConfigError::InvalidValue {
                key: "INBOX_MEETING_MINUTES".to_string(),
                message: format!(
                    "{} is outside 1..={MAX_MEETING_MINUTES}",
                    self.meeting_minutes
                ),
            });
        }
        Ok(())
    }
}

/// Google API access. The token is obtained elsewhere and passed in.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub access_token: SecretString,
}

impl GoogleConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("GOOGLE_ACCESS_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("GOOGLE_ACCESS_TOKEN".to_string()))?;
        Ok(Self {
            access_token: SecretString::from(token),
        })
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 8000);
        assert_eq!(server.batch_size, 5);
        assert_eq!(server.classifier_mode, ClassifierMode::Lenient);

        let scheduling = SchedulingConfig::default();
        assert_eq!(scheduling.default_meeting_hour, 11);
        assert_eq!(scheduling.meeting_minutes, 30);
    }

    #[test]
    fn classifier_mode_parses_case_insensitively() {
        assert_eq!("STRICT".parse::<ClassifierMode>().unwrap(), ClassifierMode::Strict);
        assert_eq!(" lenient ".parse::<ClassifierMode>().unwrap(), ClassifierMode::Lenient);
        assert!("maybe".parse::<ClassifierMode>().is_err());
    }

    #[test]
    fn bind_addr_combines_host_and_port() {
        let config = ServerConfig {
            port: 9100,
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:9100");
    }

    #[test]
    fn meeting_length_is_bounded() {
        assert!(SchedulingConfig::default().validate().is_ok());

        let whole_day = SchedulingConfig {
            meeting_minutes: MAX_MEETING_MINUTES,
            ..SchedulingConfig::default()
        };
        assert!(whole_day.validate().is_ok());

        for minutes in [0, -30, MAX_MEETING_MINUTES + 1, i64::MAX] {
            let config = SchedulingConfig {
                meeting_minutes: minutes,
                ..SchedulingConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidValue { ref key, .. }) if key == "INBOX_MEETING_MINUTES"),
                "{minutes} should be rejected"
            );
        }
    }

    #[test]
    fn meeting_hour_must_be_an_hour_of_the_day() {
        let config = SchedulingConfig {
            default_meeting_hour: 24,
            ..SchedulingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
