//! Conversion of `EmailMessage` values into wire messages.

use crate::config::EmailConfig;
use crate::email::{EmailMessage, DEFAULT_CONTENT_TYPE};
use crate::error::FormatError;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};

/// Identity placed in the `From` header of every outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: String,
    pub address: String,
}

impl Sender {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &EmailConfig) -> Self {
        Self::new(config.sender_name.clone(), config.sender_email.clone())
    }

    fn mailbox(&self) -> Result<Mailbox, FormatError> {
        let address: Address = self
            .address
            .parse()
            .map_err(|_| FormatError::InvalidSender(self.address.clone()))?;
        let name = Some(self.name.trim())
            .filter(|n| !n.is_empty())
            .map(String::from);
        Ok(Mailbox::new(name, address))
    }
}

/// Message body; exactly one flavour is ever sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Html(String),
    Text(String),
}

/// An attachment with its content type already parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct WireAttachment {
    pub file_name: String,
    pub content_type: ContentType,
    pub content: Vec<u8>,
}

/// Fully resolved message, ready to be rendered to MIME by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    from: Mailbox,
    to: Mailbox,
    subject: String,
    body: Body,
    attachments: Vec<WireAttachment>,
}

impl WireMessage {
    #[must_use]
    pub const fn from(&self) -> &Mailbox {
        &self.from
    }

    #[must_use]
    pub const fn to(&self) -> &Mailbox {
        &self.to
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    #[must_use]
    pub fn attachments(&self) -> &[WireAttachment] {
        &self.attachments
    }

    /// Render the MIME tree.
    ///
    /// Without attachments the body is the single top-level part. With
    /// attachments the message is `multipart/mixed`, body first, then the
    /// attachments in order.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::Build` if the MIME builder rejects the message.
    pub fn render(&self) -> Result<Message, FormatError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(self.subject.clone());

        let body = match &self.body {
            Body::Html(html) => SinglePart::html(html.clone()),
            Body::Text(text) => SinglePart::plain(text.clone()),
        };

        let message = if self.attachments.is_empty() {
            builder.singlepart(body)?
        } else {
            let parts = self
                .attachments
                .iter()
                .fold(MultiPart::mixed().singlepart(body), |parts, att| {
                    parts.singlepart(
                        Attachment::new(att.file_name.clone())
                            .body(att.content.clone(), att.content_type.clone()),
                    )
                });
            builder.multipart(parts)?
        };

        Ok(message)
    }
}

/// Builds wire messages on behalf of a fixed sender. Holds no other state.
#[derive(Debug, Clone)]
pub struct Formatter {
    sender: Sender,
}

impl Formatter {
    #[must_use]
    pub const fn new(sender: Sender) -> Self {
        Self { sender }
    }

    #[must_use]
    pub const fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Resolve addresses, pick the body flavour and tag attachments.
    ///
    /// # Errors
    ///
    /// Fails if the sender or recipient does not parse as a mailbox, or an
    /// attachment declares an unparsable content type.
    pub fn format(&self, message: &EmailMessage) -> Result<WireMessage, FormatError> {
        let from = self.sender.mailbox()?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|_| FormatError::InvalidRecipient(message.to.clone()))?;

        let body = if message.is_html {
            Body::Html(message.body.clone())
        } else {
            Body::Text(message.body.clone())
        };

        let attachments = message
            .attachments()
            .iter()
            .map(|att| {
                let declared = Some(att.content_type().trim())
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or(DEFAULT_CONTENT_TYPE);
                let content_type = ContentType::parse(declared).map_err(|_| {
                    FormatError::InvalidContentType {
                        file_name: att.file_name().to_string(),
                        content_type: att.content_type().to_string(),
                    }
                })?;
                Ok(WireAttachment {
                    file_name: att.file_name().to_string(),
                    content_type,
                    content: att.content().to_vec(),
                })
            })
            .collect::<Result<Vec<_>, FormatError>>()?;

        Ok(WireMessage {
            from,
            to,
            subject: message.subject.clone(),
            body,
            attachments,
        })
    }
}
