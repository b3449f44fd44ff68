use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::debug;

/// Content type assumed when an upload does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// An uploaded file as received from the request layer.
///
/// Owns its byte source, so the source is released when ingestion returns
/// whatever the outcome.
pub struct PhotoUpload<R> {
    body: R,
    declared_size: Option<u64>,
    content_type: Option<String>,
}

impl<R> PhotoUpload<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(body: R) -> Self {
        Self {
            body,
            declared_size: None,
            content_type: None,
        }
    }

    /// Size announced by the client
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Copy the byte source into a private temporary file under `dir`.
    ///
    /// The returned [`StagedUpload`] deletes the file when dropped.
    pub async fn stage(self, dir: &Path) -> io::Result<StagedUpload> {
        let content_type = self.content_type().to_string();
        let declared_size = self.declared_size;
        let mut body = self.body;

        let temp = tempfile::Builder::new()
            .prefix("photo-")
            .tempfile_in(dir)?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);

        let copied = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;

        debug!(path = %temp.path().display(), bytes = copied, "Upload staged");

        Ok(StagedUpload {
            temp,
            staged_size: copied,
            declared_size,
            content_type,
        })
    }
}

/// An upload copied to local disk for the duration of one ingestion
#[derive(Debug)]
pub struct StagedUpload {
    temp: NamedTempFile,
    staged_size: u64,
    declared_size: Option<u64>,
    content_type: String,
}

impl StagedUpload {
    /// Owned path for moving into blocking tasks
    pub fn path_buf(&self) -> PathBuf {
        self.temp.path().to_path_buf()
    }

    /// Declared size if the client sent one, otherwise the bytes staged
    pub fn size(&self) -> u64 {
        self.declared_size.unwrap_or(self.staged_size)
    }

    pub fn staged_size(&self) -> u64 {
        self.staged_size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Re-open the staged bytes
    pub async fn read_bytes(&self) -> io::Result<Bytes> {
        tokio::fs::read(self.temp.path()).await.map(Bytes::from)
    }
}
