//! Dispatch service: format then transmit, one message at a time.

use crate::config::EmailConfig;
use crate::email::EmailMessage;
use crate::error::DispatchError;
use crate::format::{Formatter, Sender};
use crate::transport::{MailTransport, SmtpTransport};
use std::sync::Arc;
use tracing::{info, warn};

/// Formats messages and hands them to a transport.
pub struct Dispatcher {
    formatter: Formatter,
    transport: Arc<dyn MailTransport>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(formatter: Formatter, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            formatter,
            transport,
        }
    }

    /// Dispatcher sending through the SMTP relay described by `config`.
    #[must_use]
    pub fn from_config(config: &EmailConfig) -> Self {
        Self::new(
            Formatter::new(Sender::from_config(config)),
            Arc::new(SmtpTransport::new(config)),
        )
    }

    /// Format and transmit exactly one message.
    ///
    /// # Errors
    ///
    /// Returns the formatter or transport error unchanged.
    pub async fn send_one(&self, message: &EmailMessage) -> Result<(), DispatchError> {
        info!(recipient = %message.to, subject = %message.subject, "Preparing email");
        let wire = self.formatter.format(message)?;
        if !wire.attachments().is_empty() {
            info!(count = wire.attachments().len(), "Adding attachments");
        }
        self.transport.send(&wire).await?;
        info!(recipient = %message.to, "Email sent");
        Ok(())
    }

    /// Send messages in input order, strictly one after another.
    ///
    /// The first failure stops the batch: later messages are never attempted
    /// and the caller learns nothing about the ones sent before it.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by [`Dispatcher::send_one`].
    pub async fn send_many(&self, messages: &[EmailMessage]) -> Result<usize, DispatchError> {
        info!(count = messages.len(), "Starting email batch");

        let mut sent = 0;
        for message in messages {
            if let Err(e) = self.send_one(message).await {
                warn!(
                    sent,
                    remaining = messages.len() - sent - 1,
                    recipient = %message.to,
                    "Aborting email batch"
                );
                return Err(e);
            }
            sent += 1;
        }

        info!(count = sent, "Email batch completed");
        Ok(sent)
    }
}
