//! Minimal HTTP seam between the email client and the Workers runtime.

use std::time::Duration;

use url::Url;
use worker::{Delay, Fetch, Headers, Method, Request, RequestInit};

use crate::errors::SendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: ApiMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Executes requests and waits between polls.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SendError>;

    async fn sleep(&self, duration: Duration);
}

/// Response headers the email client reads.
const FORWARDED_HEADERS: [&str; 2] = ["operation-location", "retry-after"];

/// Transport backed by the Workers `fetch` API.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchTransport;

impl Transport for FetchTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SendError> {
        let headers = Headers::new();
        for (name, value) in &request.headers {
            headers.set(name, value)?;
        }

        let mut init = RequestInit::new();
        init.with_method(match request.method {
            ApiMethod::Get => Method::Get,
            ApiMethod::Post => Method::Post,
        })
        .with_headers(headers);
        if let Some(body) = request.body {
            init.with_body(Some(body.into()));
        }

        let http_request = Request::new_with_init(request.url.as_str(), &init)?;
        let mut response = Fetch::Request(http_request).send().await?;

        let mut response_headers = Vec::new();
        for name in FORWARDED_HEADERS {
            if let Some(value) = response.headers().get(name)? {
                response_headers.push((name.to_string(), value));
            }
        }

        Ok(ApiResponse {
            status: response.status_code(),
            headers: response_headers,
            body: response.text().await?,
        })
    }

    async fn sleep(&self, duration: Duration) {
        Delay::from(duration).await;
    }
}
