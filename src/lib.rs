//! email-relay — Relay queued email requests to Azure Communication Services
//! from Cloudflare Workers (Rust).
//!
//! Each queue message carries one pre-rendered email. The worker unpacks it,
//! sends it with the configured sender address, and acknowledges it only
//! once the email API reports the send as completed.

pub mod config;
pub mod email;
pub mod errors;
pub mod http;
pub mod logger;
pub mod mailer;
pub mod queue;
pub mod relay;
pub mod utils;

use worker::{event, Context, Env, MessageBatch};

// Re-exports
pub use config::{ConnectionString, PollPolicy, RelayConfig};
pub use email::{EmailRequest, OutboundEmail};
pub use errors::{ActionError, ConfigError, RelayError, SendError};
pub use http::{ApiMethod, ApiRequest, ApiResponse, FetchTransport, Transport};
pub use logger::{ConsoleSink, LogLevel, LogSink, Logger};
pub use mailer::{CommunicationEmailClient, EmailClient, OperationStatus, SendOperation};
pub use queue::{
    config_or_retry_batch, enqueue_email, enqueue_emails, process_batch, process_messages,
    BatchHandle, QueueHandle, QueueProcessResult,
};
pub use relay::{Disposition, EmailRelay, MessageActions, ReceivedMessage};
pub use utils::is_valid_email;

const LOG_PREFIX: &str = "[EmailRelay] ";

/// Queue consumer entry point.
#[event(queue)]
pub async fn main(
    message_batch: MessageBatch<serde_json::Value>,
    env: Env,
    _ctx: Context,
) -> worker::Result<()> {
    let startup_logger = Logger::new(LogLevel::default(), LOG_PREFIX);
    let Some(config) =
        config_or_retry_batch(RelayConfig::from_env(&env), &message_batch, &startup_logger)
    else {
        return Ok(());
    };

    let logger = Logger::new(config.log_level, LOG_PREFIX);
    let client = CommunicationEmailClient::from_config(&config, FetchTransport);
    let relay = EmailRelay::new(config.sender_address.clone(), client, logger);

    let results = process_batch(&relay, &message_batch).await;
    let acknowledged = results
        .iter()
        .filter(|r| r.disposition == Disposition::Acknowledged)
        .count();
    relay.logger().debug(&format!(
        "batch done: {} acknowledged, {} left for redelivery",
        acknowledged,
        results.len() - acknowledged
    ));
    Ok(())
}
