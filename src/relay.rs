//! The email relay handler: unpack one message, send it, acknowledge on success.

use crate::email::EmailRequest;
use crate::errors::{ActionError, RelayError};
use crate::logger::Logger;
use crate::mailer::{EmailClient, SendOperation};

/// One message as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub id: String,
    pub body: Vec<u8>,
}

impl ReceivedMessage {
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
        }
    }
}

/// Settles a message with the queue it came from.
pub trait MessageActions {
    /// Removes the message from the queue.
    fn complete(&self, message: &ReceivedMessage) -> Result<(), ActionError>;
}

/// What happened to a message once handling returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acknowledged,
    /// Left unacknowledged for the host to redeliver.
    Abandoned,
}

pub struct EmailRelay<C> {
    sender_address: String,
    client: C,
    logger: Logger,
}

impl<C: EmailClient> EmailRelay<C> {
    pub fn new(sender_address: impl Into<String>, client: C, logger: Logger) -> Self {
        Self {
            sender_address: sender_address.into(),
            client,
            logger,
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn unpack_email_request(&self, message: &ReceivedMessage) -> Result<EmailRequest, RelayError> {
        EmailRequest::from_payload(&message.body)
    }

    /// One send attempt, waiting for the API to report the outcome.
    pub async fn send_email(&self, request: &EmailRequest) -> Result<SendOperation, RelayError> {
        let outbound = request.to_outbound(&self.sender_address);
        match self.client.send(&outbound).await {
            Ok(operation) if operation.has_completed => Ok(operation),
            Ok(operation) => Err(RelayError::SendFailure(format!(
                "operation {} did not complete, last status {}",
                operation.id, operation.status
            ))),
            Err(e) => Err(RelayError::SendFailure(e.to_string())),
        }
    }

    /// Handles one message. Never fails: every error is logged once and the
    /// message is left unacknowledged.
    pub async fn handle_message<A>(&self, message: &ReceivedMessage, actions: &A) -> Disposition
    where
        A: MessageActions + ?Sized,
    {
        match self.relay(message, actions).await {
            Ok(()) => Disposition::Acknowledged,
            Err(e) => {
                self.logger
                    .error(&format!("{} :: message {}: {}", e.operation(), message.id, e));
                Disposition::Abandoned
            }
        }
    }

    async fn relay<A>(&self, message: &ReceivedMessage, actions: &A) -> Result<(), RelayError>
    where
        A: MessageActions + ?Sized,
    {
        let request = self.unpack_email_request(message)?;
        if !request.has_recipient() {
            return Err(RelayError::EmptyRecipient);
        }
        let operation = self.send_email(&request).await?;
        self.logger
            .debug(&format!("message {} sent as operation {}", message.id, operation.id));
        actions
            .complete(message)
            .map_err(|e| RelayError::UnexpectedFault(format!("acknowledge failed: {}", e)))
    }
}
