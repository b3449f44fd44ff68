use crate::derivatives::DerivativeGenerator;
use crate::error::PhotoError;
use crate::imaging;
use crate::metadata_store::MetadataStore;
use crate::model::{CaptureMetadata, NewPhoto, Photo, PhotoStatus};
use crate::object_store::{ObjectKey, ObjectStore};
use crate::upload::{PhotoUpload, StagedUpload};
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Values computed from the staged bytes before anything is written
struct Analysis {
    image: DynamicImage,
    capture: CaptureMetadata,
    dominant_color: String,
}

/// Runs the upload pipeline: stage, analyze, record, derive, store.
///
/// The photo row is written as `pending` and marked `committed` once the
/// original is in the object store. Rows left behind by a failure are
/// marked `failed` on a best-effort basis and settled by the reconciler.
pub struct IngestCoordinator {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    derivatives: DerivativeGenerator,
    staging_dir: PathBuf,
}

impl IngestCoordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        derivatives: DerivativeGenerator,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            metadata,
            objects,
            derivatives,
            staging_dir,
        }
    }

    /// Ingest one upload and return the record assembled from the computed values
    #[instrument(skip(self, upload), fields(content_type = %upload.content_type()))]
    pub async fn ingest<R>(&self, upload: PhotoUpload<R>) -> Result<Photo, PhotoError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match self.run(upload).await {
            Ok(photo) => {
                metrics::counter!("photos.ingested").increment(1);
                info!(
                    photo_id = %photo.id,
                    width = photo.width,
                    height = photo.height,
                    size_bytes = photo.size,
                    "Photo ingested"
                );
                Ok(photo)
            }
            Err(e) => {
                metrics::counter!("photos.ingest.failed").increment(1);
                error!(error = %e, "Photo ingestion failed");
                Err(e)
            }
        }
    }

    async fn run<R>(&self, upload: PhotoUpload<R>) -> Result<Photo, PhotoError>
    where
        R: AsyncRead + Unpin + Send,
    {
        // dropped on every return below, which removes the temp file
        let staged = upload
            .stage(&self.staging_dir)
            .await
            .map_err(PhotoError::Stage)?;

        let Analysis {
            image,
            capture,
            dominant_color,
        } = self.analyze(&staged).await?;

        let photo = NewPhoto {
            id: Uuid::new_v4(),
            size: staged.size() as i64,
            width: image.width() as i32,
            height: image.height() as i32,
            mime: staged.content_type().to_string(),
            dominant_color,
            location: capture.location,
            date: capture.date,
        };

        self.metadata
            .insert_photo(&photo)
            .await
            .map_err(PhotoError::MetadataWrite)?;
        debug!(photo_id = %photo.id, "Photo row written");

        if let Err(e) = self.derivatives.generate(Arc::new(image), photo.id).await {
            self.mark_failed(photo.id).await;
            return Err(e.into());
        }

        if let Err(e) = self.store_original(&staged, photo.id).await {
            self.mark_failed(photo.id).await;
            return Err(e);
        }

        let status = self.mark_committed(photo.id).await;
        Ok(photo.into_photo(status))
    }

    /// Decode, read EXIF and compute the dominant color off the async runtime
    async fn analyze(&self, staged: &StagedUpload) -> Result<Analysis, PhotoError> {
        let path = staged.path_buf();

        tokio::task::spawn_blocking(move || -> Result<Analysis, PhotoError> {
            let image = imaging::decode_jpeg(&path)?;
            let capture = imaging::read_capture_metadata(&path);
            let dominant_color = imaging::dominant_color(&image)?;
            Ok(Analysis {
                image,
                capture,
                dominant_color,
            })
        })
        .await
        .map_err(|e| PhotoError::Task(e.to_string()))?
    }

    async fn store_original(&self, staged: &StagedUpload, photo_id: Uuid) -> Result<(), PhotoError> {
        let bytes = staged.read_bytes().await.map_err(PhotoError::Stage)?;

        self.objects
            .put(&ObjectKey::photo(photo_id), bytes, staged.content_type())
            .await
            .map_err(PhotoError::ObjectUpload)
    }

    async fn mark_committed(&self, photo_id: Uuid) -> PhotoStatus {
        match self
            .metadata
            .set_photo_status(photo_id, PhotoStatus::Committed)
            .await
        {
            Ok(1) => PhotoStatus::Committed,
            Ok(rows) => {
                warn!(photo_id = %photo_id, rows, "Photo row missing when committing");
                PhotoStatus::Pending
            }
            Err(e) => {
                warn!(photo_id = %photo_id, error = %e, "Failed to commit photo, leaving for reconciliation");
                PhotoStatus::Pending
            }
        }
    }

    async fn mark_failed(&self, photo_id: Uuid) {
        if let Err(e) = self
            .metadata
            .set_photo_status(photo_id, PhotoStatus::Failed)
            .await
        {
            warn!(photo_id = %photo_id, error = %e, "Failed to mark photo as failed");
        }
    }
}
