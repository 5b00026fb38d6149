//! Cloudflare Queues glue: turn delivered messages into relay calls and back.

use worker::{js_sys, MessageBatch, MessageExt, RawMessage};

use crate::config::RelayConfig;
use crate::email::EmailRequest;
use crate::errors::{ActionError, ConfigError, RelayError};
use crate::logger::Logger;
use crate::mailer::EmailClient;
use crate::relay::{Disposition, EmailRelay, MessageActions, ReceivedMessage};

/// One delivered message as seen by the consumer.
pub trait QueueHandle {
    fn message_id(&self) -> String;

    /// Body as UTF-8 text.
    fn text_body(&self) -> Result<String, RelayError>;

    fn acknowledge(&self);

    /// Hands the message back to the queue for redelivery.
    fn retry_later(&self);
}

impl<H: QueueHandle + ?Sized> QueueHandle for &H {
    fn message_id(&self) -> String {
        (**self).message_id()
    }

    fn text_body(&self) -> Result<String, RelayError> {
        (**self).text_body()
    }

    fn acknowledge(&self) {
        (**self).acknowledge()
    }

    fn retry_later(&self) {
        (**self).retry_later()
    }
}

impl QueueHandle for RawMessage {
    fn message_id(&self) -> String {
        RawMessage::id(self)
    }

    /// String bodies are taken as-is; structured bodies are re-serialized as JSON.
    fn text_body(&self) -> Result<String, RelayError> {
        let body = RawMessage::body(self);
        match body.as_string() {
            Some(text) => Ok(text),
            None => js_sys::JSON::stringify(&body)
                .map(String::from)
                .map_err(|_| RelayError::UnexpectedFault("message body is not serializable".into())),
        }
    }

    fn acknowledge(&self) {
        MessageExt::ack(self)
    }

    fn retry_later(&self) {
        MessageExt::retry(self)
    }
}

/// A whole delivered batch.
pub trait BatchHandle {
    fn retry_all_later(&self);
}

impl BatchHandle for MessageBatch<serde_json::Value> {
    fn retry_all_later(&self) {
        self.retry_all()
    }
}

/// Acknowledges through the queue handle.
struct HandleActions<'a, H: ?Sized>(&'a H);

impl<H: QueueHandle + ?Sized> MessageActions for HandleActions<'_, H> {
    fn complete(&self, _message: &ReceivedMessage) -> Result<(), ActionError> {
        self.0.acknowledge();
        Ok(())
    }
}

/// Result of handling one delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueProcessResult {
    pub message_id: String,
    pub disposition: Disposition,
}

/// Relays every delivered message independently.
///
/// Queues acknowledge any message that is not retried once the consumer
/// returns, so abandoned messages are explicitly retried to keep them queued.
pub async fn process_messages<C, I>(relay: &EmailRelay<C>, messages: I) -> Vec<QueueProcessResult>
where
    C: EmailClient,
    I: IntoIterator,
    I::Item: QueueHandle,
{
    let mut results = Vec::new();
    for handle in messages {
        let message_id = handle.message_id();
        let disposition = match handle.text_body() {
            Ok(text) => {
                let message = ReceivedMessage::new(message_id.clone(), text);
                relay.handle_message(&message, &HandleActions(&handle)).await
            }
            Err(e) => {
                relay
                    .logger()
                    .error(&format!("{} :: message {}: {}", e.operation(), message_id, e));
                Disposition::Abandoned
            }
        };
        if disposition == Disposition::Abandoned {
            handle.retry_later();
        }
        results.push(QueueProcessResult {
            message_id,
            disposition,
        });
    }
    results
}

pub async fn process_batch<C: EmailClient>(
    relay: &EmailRelay<C>,
    batch: &MessageBatch<serde_json::Value>,
) -> Vec<QueueProcessResult> {
    process_messages(relay, batch.raw_iter()).await
}

/// Without configuration nothing can be sent, so the whole batch goes back.
pub fn config_or_retry_batch<B: BatchHandle + ?Sized>(
    config: Result<RelayConfig, ConfigError>,
    batch: &B,
    logger: &Logger,
) -> Option<RelayConfig> {
    match config {
        Ok(config) => Some(config),
        Err(e) => {
            logger.error(&format!("main :: configuration error, retrying batch: {}", e));
            batch.retry_all_later();
            None
        }
    }
}

fn payload(request: &EmailRequest) -> Result<String, worker::Error> {
    request
        .to_payload()
        .map_err(|e| worker::Error::RustError(e.to_string()))
}

/// Enqueue one email request as its JSON text.
pub async fn enqueue_email(queue: &worker::Queue, request: &EmailRequest) -> Result<(), worker::Error> {
    queue.send(payload(request)?).await
}

/// Enqueue multiple email requests.
pub async fn enqueue_emails(
    queue: &worker::Queue,
    requests: &[EmailRequest],
) -> Result<(), worker::Error> {
    let payloads = requests
        .iter()
        .map(payload)
        .collect::<Result<Vec<_>, _>>()?;
    queue.send_batch(payloads).await
}
