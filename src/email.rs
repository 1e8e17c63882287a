//! Request-scoped email types.

use base64::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Content type used when an attachment does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// An email to deliver to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_is_html")]
    pub is_html: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<EmailAttachment>>,
}

const fn default_is_html() -> bool {
    true
}

impl EmailMessage {
    /// Create an HTML message without attachments.
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            is_html: true,
            attachments: None,
        }
    }

    /// Switch the body to plain text.
    #[must_use]
    pub fn plain_text(mut self) -> Self {
        self.is_html = false;
        self
    }

    /// Append an attachment.
    #[must_use]
    pub fn with_attachment(mut self, attachment: EmailAttachment) -> Self {
        self.attachments.get_or_insert_with(Vec::new).push(attachment);
        self
    }

    /// Attachments in the order they will be added to the message.
    #[must_use]
    pub fn attachments(&self) -> &[EmailAttachment] {
        self.attachments.as_deref().unwrap_or_default()
    }
}

/// A file attached to an `EmailMessage`.
///
/// `content` travels as standard base64 in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAttachment {
    file_name: String,
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    content: Vec<u8>,
    #[serde(default = "default_content_type")]
    content_type: String,
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

impl EmailAttachment {
    /// Build an attachment from its parts. An empty content type falls back
    /// to `application/octet-stream`.
    pub fn new(file_name: impl Into<String>, content: Vec<u8>, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        Self {
            file_name: file_name.into(),
            content,
            content_type: if content_type.is_empty() {
                default_content_type()
            } else {
                content_type
            },
        }
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_missing() {
        let msg: EmailMessage = serde_json::from_str(r#"{"to":"user@example.com"}"#).unwrap();
        assert!(msg.is_html);
        assert!(msg.subject.is_empty());
        assert!(msg.body.is_empty());
        assert!(msg.attachments().is_empty());
    }

    #[test]
    fn attachment_content_is_base64_in_json() {
        let msg: EmailMessage = serde_json::from_str(
            r#"{"to":"user@example.com","attachments":[{"fileName":"a.txt","content":"aGVsbG8="}]}"#,
        )
        .unwrap();
        let att = &msg.attachments()[0];
        assert_eq!(att.content(), b"hello");
        assert_eq!(att.content_type(), DEFAULT_CONTENT_TYPE);
        assert_eq!(att.len(), 5);
    }

    #[test]
    fn rejects_invalid_base64() {
        let result: Result<EmailAttachment, _> =
            serde_json::from_str(r#"{"fileName":"a.txt","content":"not base64!"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn empty_content_type_falls_back_to_octet_stream() {
        let att = EmailAttachment::new("blob", vec![1, 2, 3], "");
        assert_eq!(att.content_type(), DEFAULT_CONTENT_TYPE);
    }
}
