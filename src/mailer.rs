//! Azure Communication Services email client with send-and-wait semantics.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{PollPolicy, RelayConfig};
use crate::email::OutboundEmail;
use crate::errors::SendError;
use crate::http::{ApiMethod, ApiRequest, ApiResponse, Transport};
use crate::utils::{content_hash, rfc1123_date, sign_request};

/// Anything that can deliver one email and wait for the outcome.
#[allow(async_fn_in_trait)]
pub trait EmailClient {
    async fn send(&self, email: &OutboundEmail<'_>) -> Result<SendOperation, SendError>;
}

/// Status of a long-running send operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationStatus::NotStarted => "NotStarted",
            OperationStatus::Running => "Running",
            OperationStatus::Succeeded => "Succeeded",
            OperationStatus::Failed => "Failed",
            OperationStatus::Canceled => "Canceled",
            OperationStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Outcome of a send once waiting stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOperation {
    pub id: String,
    pub status: OperationStatus,
    pub has_completed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendPayload<'a> {
    sender_address: &'a str,
    recipients: Recipients<'a>,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Recipients<'a> {
    to: [Address<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    address: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Content<'a> {
    subject: &'a str,
    plain_text: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    id: String,
    status: OperationStatus,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "no error details".to_string(),
        }
    }
}

/// Client for the Communication Services email REST API.
pub struct CommunicationEmailClient<T> {
    endpoint: Url,
    access_key: Vec<u8>,
    api_version: String,
    poll: PollPolicy,
    transport: T,
}

impl<T: Transport> CommunicationEmailClient<T> {
    pub fn new(
        endpoint: Url,
        access_key: Vec<u8>,
        api_version: impl Into<String>,
        poll: PollPolicy,
        transport: T,
    ) -> Self {
        Self {
            endpoint,
            access_key,
            api_version: api_version.into(),
            poll,
            transport,
        }
    }

    pub fn from_config(config: &RelayConfig, transport: T) -> Self {
        Self::new(
            config.connection.endpoint.clone(),
            config.connection.access_key.clone(),
            config.api_version.clone(),
            config.poll,
            transport,
        )
    }

    fn api_url(&self, path: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(path);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        url
    }

    fn signed_request(
        &self,
        method: ApiMethod,
        url: Url,
        body: Option<String>,
    ) -> Result<ApiRequest, SendError> {
        let date = rfc1123_date(Utc::now());
        let hash = content_hash(body.as_deref().unwrap_or_default().as_bytes());
        let authorization = sign_request(method.as_str(), &url, &date, &hash, &self.access_key)?;

        let mut headers = vec![
            ("x-ms-date".to_string(), date),
            ("x-ms-content-sha256".to_string(), hash),
            ("Authorization".to_string(), authorization),
        ];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        Ok(ApiRequest {
            method,
            url,
            headers,
            body,
        })
    }

    async fn start(&self, email: &OutboundEmail<'_>) -> Result<(OperationResponse, Url), SendError> {
        let payload = SendPayload {
            sender_address: email.sender_address,
            recipients: Recipients {
                to: [Address {
                    address: email.recipient_address,
                }],
            },
            content: Content {
                subject: email.subject,
                plain_text: email.plain_text_content,
                html: email.html_content,
            },
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| SendError::InvalidResponse(format!("JSON serialize error: {}", e)))?;

        let mut request = self.signed_request(ApiMethod::Post, self.api_url("/emails:send"), Some(body))?;
        let first_sent = request
            .header("x-ms-date")
            .unwrap_or_default()
            .to_string();
        request.headers.push((
            "repeatability-request-id".to_string(),
            uuid::Uuid::new_v4().to_string(),
        ));
        request
            .headers
            .push(("repeatability-first-sent".to_string(), first_sent));

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(rejected(&response));
        }
        let operation: OperationResponse = parse_body(&response)?;
        let location = match response.header("operation-location") {
            Some(location) => Url::parse(location)
                .map_err(|e| SendError::InvalidResponse(format!("operation-location: {}", e)))?,
            None => self.api_url(&format!("/emails/operations/{}", operation.id)),
        };
        Ok((operation, location))
    }

    async fn poll_status(&self, location: &Url) -> Result<(OperationResponse, Option<Duration>), SendError> {
        let request = self.signed_request(ApiMethod::Get, location.clone(), None)?;
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(rejected(&response));
        }
        let retry_after = response
            .header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        Ok((parse_body(&response)?, retry_after))
    }
}

impl<T: Transport> EmailClient for CommunicationEmailClient<T> {
    /// Starts the send, then polls until the operation is terminal or polls run out.
    async fn send(&self, email: &OutboundEmail<'_>) -> Result<SendOperation, SendError> {
        let (mut operation, location) = self.start(email).await?;
        let mut retry_after = None;
        let mut polls = 0;

        loop {
            match operation.status {
                OperationStatus::Succeeded => {
                    return Ok(SendOperation {
                        id: operation.id,
                        status: operation.status,
                        has_completed: true,
                    })
                }
                OperationStatus::Failed | OperationStatus::Canceled => {
                    return Err(SendError::OperationFailed {
                        message: operation
                            .error
                            .as_ref()
                            .map(ApiError::describe)
                            .unwrap_or_else(|| "no error details".to_string()),
                        status: operation.status.to_string(),
                        id: operation.id,
                    })
                }
                _ => {}
            }

            if polls >= self.poll.max_polls {
                return Ok(SendOperation {
                    id: operation.id,
                    status: operation.status,
                    has_completed: false,
                });
            }
            polls += 1;

            self.transport
                .sleep(retry_after.unwrap_or(self.poll.interval))
                .await;
            let (next, next_retry_after) = self.poll_status(&location).await?;
            operation = next;
            retry_after = next_retry_after;
        }
    }
}

fn parse_body<D: serde::de::DeserializeOwned>(response: &ApiResponse) -> Result<D, SendError> {
    serde_json::from_str(&response.body)
        .map_err(|e| SendError::InvalidResponse(format!("status {}: {}", response.status, e)))
}

fn rejected(response: &ApiResponse) -> SendError {
    let message = match serde_json::from_str::<ErrorResponse>(&response.body) {
        Ok(err) => err.error.describe(),
        Err(_) if response.body.is_empty() => "empty response body".to_string(),
        Err(_) => response.body.clone(),
    };
    SendError::Rejected {
        status: response.status,
        message,
    }
}
