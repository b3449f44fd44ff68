use crate::model::ThumbnailKind;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by the metadata and object store gateways
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("object store error: {0}")]
    Object(String),

    #[error("failed to presign URL: {0}")]
    Presign(String),
}

/// Step of a derivative variant that failed
#[derive(Error, Debug)]
pub enum DerivativeCause {
    #[error("failed to encode thumbnail: {0}")]
    Encode(String),

    #[error("failed to upload thumbnail: {0}")]
    Upload(#[source] StoreError),

    #[error("failed to register thumbnail: {0}")]
    Register(#[source] StoreError),

    #[error("thumbnail rendering task failed: {0}")]
    Task(String),
}

/// Outcome of the compensating delete after a later variant failed
#[derive(Debug)]
pub enum Compensation {
    /// Nothing had been registered yet
    NotNeeded,
    /// The earlier variant's row was removed
    RolledBack { thumbnail_id: Uuid },
    /// The earlier variant's row could not be removed and needs manual cleanup
    RollbackFailed { thumbnail_id: Uuid, reason: String },
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::NotNeeded => f.write_str("no rollback needed"),
            Compensation::RolledBack { thumbnail_id } => {
                write!(f, "rolled back thumbnail {}", thumbnail_id)
            }
            Compensation::RollbackFailed {
                thumbnail_id,
                reason,
            } => write!(
                f,
                "rollback of thumbnail {} failed, manual cleanup required: {}",
                thumbnail_id, reason
            ),
        }
    }
}

/// Failure of the derivative generator, with the compensation it performed
#[derive(Error, Debug)]
#[error("{variant} thumbnail failed: {cause} ({compensation})")]
pub struct DerivativeError {
    pub variant: ThumbnailKind,
    #[source]
    pub cause: DerivativeCause,
    pub compensation: Compensation,
}

impl DerivativeError {
    /// True when a registered row may have been left behind
    pub fn needs_manual_cleanup(&self) -> bool {
        matches!(self.compensation, Compensation::RollbackFailed { .. })
    }
}

/// Errors surfaced by the photo pipeline and read operations
#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("failed to stage upload: {0}")]
    Stage(#[source] std::io::Error),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("unable to find dominant color: {0}")]
    Analysis(String),

    #[error("failed to save photo metadata: {0}")]
    MetadataWrite(#[source] StoreError),

    #[error("failed to create thumbnails: {0}")]
    Derivatives(#[from] DerivativeError),

    #[error("failed to save photo in object store: {0}")]
    ObjectUpload(#[source] StoreError),

    #[error("photo {0} not found")]
    PhotoNotFound(Uuid),

    #[error("thumbnail {0} not found")]
    ThumbnailNotFound(Uuid),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("image processing task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PhotoError {
    /// True for the zero-rows/no-row conditions
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PhotoError::PhotoNotFound(_) | PhotoError::ThumbnailNotFound(_)
        )
    }
}
