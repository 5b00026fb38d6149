//! Relay configuration, loaded once per invocation and injected into the relay.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use url::Url;
use worker::Env;

use crate::errors::ConfigError;
use crate::logger::LogLevel;
use crate::utils::is_valid_email;

pub const SENDER_ADDRESS_KEY: &str = "SenderAddress";
pub const CONNECTION_STRING_KEY: &str = "CommunicationServicesConnectionString";
pub const API_VERSION_KEY: &str = "EmailApiVersion";
pub const POLL_INTERVAL_KEY: &str = "SendPollIntervalMs";
pub const MAX_POLLS_KEY: &str = "SendMaxPolls";
pub const LOG_LEVEL_KEY: &str = "LogLevel";

pub const DEFAULT_API_VERSION: &str = "2023-03-31";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_MAX_POLLS: u32 = 30;

/// Endpoint and access key of a Communication Services resource.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub endpoint: Url,
    pub access_key: Vec<u8>,
}

// Keeps the key out of logs.
impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl std::str::FromStr for ConnectionString {
    type Err = ConfigError;

    /// Parses `endpoint=https://…/;accesskey=…`. Keys are case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut endpoint = None;
        let mut access_key = None;
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                ConfigError::InvalidConnectionString(format!("segment `{}` has no value", part))
            })?;
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim()),
                "accesskey" => access_key = Some(value.trim()),
                _ => {}
            }
        }

        let endpoint = endpoint
            .ok_or_else(|| ConfigError::InvalidConnectionString("missing endpoint".into()))?;
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidConnectionString(format!("endpoint: {}", e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.host_str().is_none() {
            return Err(ConfigError::InvalidConnectionString(
                "endpoint must be an http(s) URL".into(),
            ));
        }

        let access_key = access_key
            .ok_or_else(|| ConfigError::InvalidConnectionString("missing accesskey".into()))?;
        let access_key = B64
            .decode(access_key)
            .map_err(|e| ConfigError::InvalidConnectionString(format!("accesskey: {}", e)))?;
        if access_key.is_empty() {
            return Err(ConfigError::InvalidConnectionString("accesskey is empty".into()));
        }

        Ok(Self {
            endpoint,
            access_key,
        })
    }
}

/// How long to wait for a send operation to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub sender_address: String,
    pub connection: ConnectionString,
    pub api_version: String,
    pub poll: PollPolicy,
    pub log_level: LogLevel,
}

impl RelayConfig {
    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sender_address = lookup(SENDER_ADDRESS_KEY)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(SENDER_ADDRESS_KEY))?;
        if !is_valid_email(&sender_address) {
            return Err(ConfigError::InvalidSenderAddress(sender_address));
        }

        let connection = lookup(CONNECTION_STRING_KEY)
            .ok_or(ConfigError::Missing(CONNECTION_STRING_KEY))?
            .parse::<ConnectionString>()?;

        let api_version = lookup(API_VERSION_KEY)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let mut poll = PollPolicy::default();
        if let Some(ms) = parse_number::<u64>(&lookup, POLL_INTERVAL_KEY)? {
            poll.interval = Duration::from_millis(ms);
        }
        if let Some(max) = parse_number::<u32>(&lookup, MAX_POLLS_KEY)? {
            poll.max_polls = max;
        }

        let log_level = match lookup(LOG_LEVEL_KEY) {
            Some(v) => v.parse::<LogLevel>()?,
            None => LogLevel::default(),
        };

        Ok(Self {
            sender_address,
            connection,
            api_version,
            poll,
            log_level,
        })
    }

    /// Reads the configuration from worker vars and secrets.
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            env.var(key)
                .map(|v| v.to_string())
                .or_else(|_| env.secret(key).map(|v| v.to_string()))
                .ok()
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: v }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONN: &str = "endpoint=https://relay.communication.azure.com/;accesskey=c2VjcmV0LWtleQ==";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_parse_connection_string() {
        let conn: ConnectionString = CONN.parse().unwrap();
        assert_eq!(conn.endpoint.as_str(), "https://relay.communication.azure.com/");
        assert_eq!(conn.access_key, b"secret-key");
    }

    #[test]
    fn test_connection_string_keys_are_case_insensitive() {
        let conn: ConnectionString =
            "AccessKey=c2VjcmV0LWtleQ==; Endpoint=https://relay.communication.azure.com/;"
                .parse()
                .unwrap();
        assert_eq!(conn.endpoint.host_str(), Some("relay.communication.azure.com"));
    }

    #[test]
    fn test_connection_string_rejects_bad_input() {
        assert!("accesskey=c2VjcmV0".parse::<ConnectionString>().is_err());
        assert!("endpoint=https://x.com/".parse::<ConnectionString>().is_err());
        assert!("endpoint=ftp://x.com/;accesskey=c2VjcmV0LWtleQ=="
            .parse::<ConnectionString>()
            .is_err());
        assert!("endpoint=https://x.com/;accesskey=!!!"
            .parse::<ConnectionString>()
            .is_err());
        assert!("garbage".parse::<ConnectionString>().is_err());
    }

    #[test]
    fn test_debug_hides_access_key() {
        let conn: ConnectionString = CONN.parse().unwrap();
        let shown = format!("{:?}", conn);
        assert!(shown.contains("relay.communication.azure.com"));
        assert!(!shown.contains("secret"));
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = RelayConfig::from_lookup(lookup(&[
            (SENDER_ADDRESS_KEY, "DoNotReply@relay.example.com"),
            (CONNECTION_STRING_KEY, CONN),
        ]))
        .unwrap();
        assert_eq!(config.sender_address, "DoNotReply@relay.example.com");
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.poll, PollPolicy::default());
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = RelayConfig::from_lookup(lookup(&[
            (SENDER_ADDRESS_KEY, "DoNotReply@relay.example.com"),
            (CONNECTION_STRING_KEY, CONN),
            (API_VERSION_KEY, "2024-07-01-preview"),
            (POLL_INTERVAL_KEY, "250"),
            (MAX_POLLS_KEY, "4"),
            (LOG_LEVEL_KEY, "debug"),
        ]))
        .unwrap();
        assert_eq!(config.api_version, "2024-07-01-preview");
        assert_eq!(config.poll.interval, Duration::from_millis(250));
        assert_eq!(config.poll.max_polls, 4);
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_from_lookup_errors() {
        assert_eq!(
            RelayConfig::from_lookup(lookup(&[(CONNECTION_STRING_KEY, CONN)])),
            Err(ConfigError::Missing(SENDER_ADDRESS_KEY))
        );
        assert_eq!(
            RelayConfig::from_lookup(lookup(&[(SENDER_ADDRESS_KEY, "a@x.com")])),
            Err(ConfigError::Missing(CONNECTION_STRING_KEY))
        );
        assert!(matches!(
            RelayConfig::from_lookup(lookup(&[
                (SENDER_ADDRESS_KEY, "not-an-address"),
                (CONNECTION_STRING_KEY, CONN),
            ])),
            Err(ConfigError::InvalidSenderAddress(_))
        ));
        assert!(matches!(
            RelayConfig::from_lookup(lookup(&[
                (SENDER_ADDRESS_KEY, "a@x.com"),
                (CONNECTION_STRING_KEY, CONN),
                (MAX_POLLS_KEY, "many"),
            ])),
            Err(ConfigError::InvalidValue { key: MAX_POLLS_KEY, .. })
        ));
    }
}
