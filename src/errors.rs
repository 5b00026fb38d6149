//! Error types for the relay, the email API client and configuration.

use thiserror::Error;

/// Why a message was not relayed. Every variant ends in a log line, never a panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Body is not UTF-8 JSON or lacks a required field.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// Payload parsed but `To` is empty.
    #[error("email not sent, request has an empty recipient")]
    EmptyRecipient,
    /// The email API errored or did not report completion.
    #[error("email not sent: {0}")]
    SendFailure(String),
    /// Anything else that went wrong while handling the message.
    #[error("unexpected fault: {0}")]
    UnexpectedFault(String),
}

impl RelayError {
    /// Name of the relay operation the failure originated in, used as log prefix.
    pub fn operation(&self) -> &'static str {
        match self {
            RelayError::MalformedPayload(_) => "unpack_email_request",
            RelayError::SendFailure(_) => "send_email",
            RelayError::EmptyRecipient | RelayError::UnexpectedFault(_) => "handle_message",
        }
    }
}

/// Failure talking to the email API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The API answered with a non-success status.
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    /// The send operation reached a terminal, unsuccessful state.
    #[error("operation {id} ended as {status}: {message}")]
    OperationFailed {
        id: String,
        status: String,
        message: String,
    },
    /// The API answered with something we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("request signing failed: {0}")]
    Signing(String),
}

impl From<worker::Error> for SendError {
    fn from(e: worker::Error) -> Self {
        SendError::Transport(e.to_string())
    }
}

/// Invalid or missing configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration value `{0}`")]
    Missing(&'static str),
    #[error("invalid sender address `{0}`")]
    InvalidSenderAddress(String),
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("invalid value for `{key}`: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// The queue refused an acknowledge call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ActionError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(
            RelayError::MalformedPayload("x".into()).operation(),
            "unpack_email_request"
        );
        assert_eq!(RelayError::EmptyRecipient.operation(), "handle_message");
        assert_eq!(RelayError::SendFailure("x".into()).operation(), "send_email");
        assert_eq!(
            RelayError::UnexpectedFault("x".into()).operation(),
            "handle_message"
        );
    }

    #[test]
    fn test_send_error_display() {
        let e = SendError::Rejected {
            status: 401,
            message: "Denied".into(),
        };
        assert_eq!(e.to_string(), "request rejected with status 401: Denied");
    }
}
