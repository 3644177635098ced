//! Streaming of authorized files.
//!
//! Paths handed to this module have already been authorized by the access
//! crate. The module only decides content type and disposition and opens
//! the byte stream.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

/// Bytes inspected when sniffing for binary content.
pub const SNIFF_LEN: usize = 1000;

/// Content type for text shown inline.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Content type for forced downloads.
pub const DOWNLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// MIME types always treated as text.
const TEXT_MIMES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-httpd-php",
    "application/x-sh",
];

/// Extensions always treated as text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "html", "htm", "css", "js", "json", "xml", "md", "csv", "log", "php", "sh", "py",
    "rb", "c", "cpp", "h", "java",
];

/// Errors that can occur while opening a file for transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The requested file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// The requested path is a directory, not a file.
    #[error("path is a directory: {0}")]
    IsADirectory(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the client should present the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Display in the browser (view).
    Inline,
    /// Save to disk (download).
    Attachment,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// An opened file ready to be streamed.
pub struct FileResponse {
    /// File name presented to the client.
    pub file_name: String,
    /// Length in bytes.
    pub length: u64,
    /// `Content-Type` value.
    pub content_type: String,
    /// Inline or attachment.
    pub disposition: Disposition,
    /// Body stream.
    pub body: ReaderStream<File>,
}

impl FileResponse {
    /// `Content-Disposition` header value.
    ///
    /// Control characters in the name are replaced with `_` so the value is
    /// always a valid header.
    pub fn content_disposition(&self) -> String {
        let escaped: String = self
            .file_name
            .chars()
            .map(|c| if c.is_control() { '_' } else { c })
            .collect::<String>()
            .replace('\\', "\\\\")
            .replace('"', "\\\"");
        format!("{}; filename=\"{}\"", self.disposition.as_str(), escaped)
    }
}

impl fmt::Debug for FileResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileResponse")
            .field("file_name", &self.file_name)
            .field("length", &self.length)
            .field("content_type", &self.content_type)
            .field("disposition", &self.disposition)
            .finish_non_exhaustive()
    }
}

/// Opens authorized files for streaming.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransfer;

impl FileTransfer {
    /// Open `path` for streaming with the given disposition.
    ///
    /// Inline text is served as UTF-8 plain text, other inline content with
    /// its guessed MIME type. Attachments are always
    /// `application/octet-stream`.
    pub async fn open(path: &Path, disposition: Disposition) -> Result<FileResponse, TransferError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransferError::FileNotFound(path.to_path_buf()),
            _ => TransferError::Io(e),
        })?;
        if metadata.is_dir() {
            return Err(TransferError::IsADirectory(path.to_path_buf()));
        }

        let content_type = match disposition {
            Disposition::Attachment => DOWNLOAD_CONTENT_TYPE.to_string(),
            Disposition::Inline => {
                if is_binary_file(path).await? {
                    mime_guess::from_path(path)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_string()
                } else {
                    TEXT_CONTENT_TYPE.to_string()
                }
            }
        };

        let file = File::open(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::debug!(
            path = %path.display(),
            content_type = %content_type,
            disposition = disposition.as_str(),
            "Opened file for transfer"
        );

        Ok(FileResponse {
            file_name,
            length: metadata.len(),
            content_type,
            disposition,
            body: ReaderStream::new(file),
        })
    }
}

/// Whether a file should be treated as binary.
///
/// Known text MIME types and extensions are text; anything else is binary
/// when its first [`SNIFF_LEN`] bytes contain a NUL.
pub async fn is_binary_file(path: &Path) -> Result<bool, TransferError> {
    if has_text_type(path) {
        return Ok(false);
    }

    let mut file = File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head.contains(&0))
}

fn has_text_type(path: &Path) -> bool {
    let mime = mime_guess::from_path(path).first();
    if let Some(mime) = mime {
        if mime.type_() == mime_guess::mime::TEXT || TEXT_MIMES.contains(&mime.essence_str()) {
            return true;
        }
    }

    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
