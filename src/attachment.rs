//! Building attachments from files, async streams and raw bytes.

use crate::email::EmailAttachment;
use crate::error::AttachmentError;
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info};

/// Read a file from disk into an attachment named after the file.
///
/// The content type is guessed from the file extension.
///
/// # Errors
///
/// Returns `AttachmentError::NotFound` if the file does not exist and
/// `AttachmentError::Io` if it cannot be read.
pub async fn from_file(path: impl AsRef<Path>) -> Result<EmailAttachment, AttachmentError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Creating attachment from file");

    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            error!(path = %path.display(), "Attachment file not found");
            return Err(AttachmentError::NotFound(path.to_path_buf()));
        }
        Err(e) => {
            error!(path = %path.display(), "Failed to read attachment file: {e}");
            return Err(AttachmentError::Io {
                name: path.display().to_string(),
                source: e,
            });
        }
    };

    let file_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let content_type = guess_content_type(&file_name);

    info!(
        file_name = %file_name,
        content_type = %content_type,
        size = content.len(),
        "Attachment created from file"
    );
    Ok(EmailAttachment::new(file_name, content, content_type))
}

/// Drain an async reader into an attachment.
///
/// When `content_type` is `None` or empty it is guessed from `file_name`.
///
/// # Errors
///
/// Returns `AttachmentError::Io` if reading the stream fails.
pub async fn from_reader<R>(
    mut reader: R,
    file_name: &str,
    content_type: Option<&str>,
) -> Result<EmailAttachment, AttachmentError>
where
    R: AsyncRead + Unpin,
{
    debug!(file_name, "Creating attachment from stream");

    let mut content = Vec::new();
    reader.read_to_end(&mut content).await.map_err(|e| {
        error!(file_name, "Failed to read attachment stream: {e}");
        AttachmentError::Io {
            name: file_name.to_string(),
            source: e,
        }
    })?;

    let content_type = resolve_content_type(file_name, content_type);
    info!(
        file_name,
        content_type = %content_type,
        size = content.len(),
        "Attachment created from stream"
    );
    Ok(EmailAttachment::new(file_name, content, content_type))
}

/// Wrap raw bytes in an attachment.
///
/// When `content_type` is `None` or empty it is guessed from `file_name`.
#[must_use]
pub fn from_bytes(content: Vec<u8>, file_name: &str, content_type: Option<&str>) -> EmailAttachment {
    let content_type = resolve_content_type(file_name, content_type);
    info!(
        file_name,
        content_type = %content_type,
        size = content.len(),
        "Attachment created from bytes"
    );
    EmailAttachment::new(file_name, content, content_type)
}

fn resolve_content_type(file_name: &str, declared: Option<&str>) -> String {
    match declared {
        Some(ct) if !ct.trim().is_empty() => ct.trim().to_string(),
        _ => guess_content_type(file_name),
    }
}

/// Guess a MIME type from a file name, falling back to `application/octet-stream`.
#[must_use]
pub fn guess_content_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
