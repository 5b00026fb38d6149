//! Queued email request and the outbound message built from it.

use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// One email request as carried in a queue message body.
///
/// Content arrives pre-rendered; the relay never touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailRequest {
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "HtmlContent")]
    pub html_content: String,
    #[serde(rename = "PlainTextContent")]
    pub plain_text_content: String,
}

// Field names match case-insensitively; when a field appears more than once
// the last occurrence wins. Unknown fields are skipped.
impl<'de> Deserialize<'de> for EmailRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(EmailRequestVisitor)
    }
}

struct EmailRequestVisitor;

impl<'de> Visitor<'de> for EmailRequestVisitor {
    type Value = EmailRequest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an email request object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<EmailRequest, A::Error> {
        let mut to = None;
        let mut subject = None;
        let mut html_content = None;
        let mut plain_text_content = None;

        while let Some(key) = map.next_key::<String>()? {
            let slot = match key.to_ascii_lowercase().as_str() {
                "to" => &mut to,
                "subject" => &mut subject,
                "htmlcontent" => &mut html_content,
                "plaintextcontent" => &mut plain_text_content,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                    continue;
                }
            };
            *slot = Some(map.next_value::<String>()?);
        }

        let missing = <A::Error as de::Error>::missing_field;
        Ok(EmailRequest {
            to: to.ok_or_else(|| missing("To"))?,
            subject: subject.ok_or_else(|| missing("Subject"))?,
            html_content: html_content.ok_or_else(|| missing("HtmlContent"))?,
            plain_text_content: plain_text_content.ok_or_else(|| missing("PlainTextContent"))?,
        })
    }
}

impl EmailRequest {
    /// Parses a UTF-8 JSON body. Missing or null fields are rejected.
    pub fn from_payload(body: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(body).map_err(|e| RelayError::MalformedPayload(e.to_string()))
    }

    /// Serializes back to the queue wire format.
    pub fn to_payload(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::UnexpectedFault(e.to_string()))
    }

    pub fn has_recipient(&self) -> bool {
        !self.to.is_empty()
    }

    /// Combines the request with the configured sender.
    pub fn to_outbound<'a>(&'a self, sender_address: &'a str) -> OutboundEmail<'a> {
        OutboundEmail {
            sender_address,
            recipient_address: &self.to,
            subject: &self.subject,
            html_content: &self.html_content,
            plain_text_content: &self.plain_text_content,
        }
    }
}

/// Everything the email API needs for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundEmail<'a> {
    pub sender_address: &'a str,
    pub recipient_address: &'a str,
    pub subject: &'a str,
    pub html_content: &'a str,
    pub plain_text_content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str =
        r#"{"To":"a@x.com","Subject":"Hi","HtmlContent":"<p>hi</p>","PlainTextContent":"hi"}"#;

    #[test]
    fn test_parse_valid_payload() {
        let request = EmailRequest::from_payload(VALID.as_bytes()).unwrap();
        assert_eq!(request.to, "a@x.com");
        assert_eq!(request.subject, "Hi");
        assert_eq!(request.html_content, "<p>hi</p>");
        assert_eq!(request.plain_text_content, "hi");
        assert!(request.has_recipient());
    }

    #[test]
    fn test_payload_round_trip_is_lossless() {
        let body = r#"{"To":"b@y.org","Subject":"Ünïcødé \"quoted\" \\ \n","HtmlContent":"<a href=\"x?a=1&b=2\">é</a>","PlainTextContent":"tab\there 😀"}"#;
        let request = EmailRequest::from_payload(body.as_bytes()).unwrap();
        let again = EmailRequest::from_payload(request.to_payload().unwrap().as_bytes()).unwrap();
        assert_eq!(again, request);
        assert_eq!(again.subject, "Ünïcødé \"quoted\" \\ \n");
        assert_eq!(again.html_content, "<a href=\"x?a=1&b=2\">é</a>");
        assert_eq!(again.plain_text_content, "tab\there 😀");
    }

    #[test]
    fn test_each_missing_field_is_malformed() {
        for field in ["To", "Subject", "HtmlContent", "PlainTextContent"] {
            let mut value: serde_json::Value = serde_json::from_str(VALID).unwrap();
            value.as_object_mut().unwrap().remove(field);
            let body = serde_json::to_vec(&value).unwrap();
            assert!(
                matches!(EmailRequest::from_payload(&body), Err(RelayError::MalformedPayload(_))),
                "missing {field} must be rejected"
            );
        }
    }

    #[test]
    fn test_null_field_is_malformed() {
        let body = r#"{"To":"a@x.com","Subject":null,"HtmlContent":"","PlainTextContent":""}"#;
        assert!(matches!(
            EmailRequest::from_payload(body.as_bytes()),
            Err(RelayError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_non_json_and_non_utf8_are_malformed() {
        assert!(EmailRequest::from_payload(b"not json").is_err());
        assert!(EmailRequest::from_payload(b"[]").is_err());
        assert!(EmailRequest::from_payload(&[0xff, 0xfe, b'{']).is_err());
    }

    #[test]
    fn test_empty_recipient_parses() {
        let body = r#"{"To":"","Subject":"s","HtmlContent":"h","PlainTextContent":"p"}"#;
        let request = EmailRequest::from_payload(body.as_bytes()).unwrap();
        assert!(!request.has_recipient());
    }

    #[test]
    fn test_field_names_ignore_case_and_unknown_fields() {
        let body = r#"{"to":"a@x.com","subject":"s","htmlContent":"h","plainTextContent":"p","Priority":1}"#;
        let request = EmailRequest::from_payload(body.as_bytes()).unwrap();
        assert_eq!(request.to, "a@x.com");
        assert_eq!(request.plain_text_content, "p");

        let body = r#"{"TO":"b@x.com","SUBJECT":"s","htmlcontent":"h","plaintextcontent":"p"}"#;
        let request = EmailRequest::from_payload(body.as_bytes()).unwrap();
        assert_eq!(request.to, "b@x.com");
        assert_eq!(request.subject, "s");
        assert_eq!(request.html_content, "h");
        assert_eq!(request.plain_text_content, "p");
    }

    #[test]
    fn test_repeated_field_keeps_last_value() {
        let body = r#"{"To":"first@x.com","to":"last@x.com","Subject":"s","HtmlContent":"h","PlainTextContent":"p"}"#;
        let request = EmailRequest::from_payload(body.as_bytes()).unwrap();
        assert_eq!(request.to, "last@x.com");
    }

    #[test]
    fn test_payload_uses_canonical_field_names() {
        let request = EmailRequest::from_payload(VALID.as_bytes()).unwrap();
        assert_eq!(request.to_payload().unwrap(), VALID);
    }

    #[test]
    fn test_to_outbound_uses_sender() {
        let request = EmailRequest::from_payload(VALID.as_bytes()).unwrap();
        let outbound = request.to_outbound("noreply@relay.example.com");
        assert_eq!(outbound.sender_address, "noreply@relay.example.com");
        assert_eq!(outbound.recipient_address, "a@x.com");
        assert_eq!(outbound.html_content, "<p>hi</p>");
    }
}
