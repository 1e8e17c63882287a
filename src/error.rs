//! Error types for smtp-dispatch.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for service operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O errors (listener binding, file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Configuration could not be loaded or extracted
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
    /// Dispatch (format or transport) errors
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Attachment construction errors
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

/// Errors raised while turning an `EmailMessage` into a wire message.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Configured sender identity does not form a valid mailbox
    #[error("invalid sender address: {0}")]
    InvalidSender(String),
    /// Recipient does not parse as a mailbox
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),
    /// Attachment declares a content type that cannot be parsed
    #[error("invalid content type {content_type:?} for attachment {file_name:?}")]
    InvalidContentType {
        file_name: String,
        content_type: String,
    },
    /// MIME builder rejected the message
    #[error("failed to build MIME message: {0}")]
    Build(#[from] lettre::error::Error),
}

/// SMTP transport errors, one variant per protocol step.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Wire message could not be rendered to MIME
    #[error("failed to render message: {0}")]
    Render(#[from] FormatError),
    /// TCP connect, TLS negotiation or EHLO failed
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: lettre::transport::smtp::Error,
    },
    /// Relay rejected the credentials
    #[error("authentication failed: {0}")]
    Auth(#[source] lettre::transport::smtp::Error),
    /// Relay rejected the envelope or the message data
    #[error("failed to transmit message: {0}")]
    Transmit(#[source] lettre::transport::smtp::Error),
    /// Relay stopped answering during an SMTP step
    #[error("SMTP {step} timed out after {after:?}")]
    Timeout {
        step: &'static str,
        after: std::time::Duration,
    },
    /// Failure reported by a non-SMTP transport implementation
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the dispatch service.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised while building an attachment from an external source.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Source file does not exist
    #[error("attachment file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Source could not be read
    #[error("failed to read attachment {name:?}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Self::Config(Box::new(e))
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(io_err) => io_err,
            other => Self::other(other.to_string()),
        }
    }
}

/// Result type alias for smtp-dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;
