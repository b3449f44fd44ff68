use crate::config::IngestConfig;
use crate::error::{Compensation, DerivativeCause, DerivativeError};
use crate::imaging;
use crate::metadata_store::MetadataStore;
use crate::model::{Thumbnail, ThumbnailKind, THUMBNAIL_MIME};
use crate::object_store::{ObjectKey, ObjectStore};
use bytes::Bytes;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Rendering parameters for thumbnails
#[derive(Debug, Clone)]
pub struct ThumbnailSettings {
    /// Bounding box edge
    pub max_dimension: u32,
    pub blur_radius: u32,
    pub jpeg_quality: u8,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            max_dimension: 500,
            blur_radius: 30,
            jpeg_quality: 75,
        }
    }
}

impl From<&IngestConfig> for ThumbnailSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            max_dimension: config.thumbnail_max_dimension,
            blur_radius: config.blur_radius,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// An encoded variant ready for upload
struct Rendered {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

/// Produces and registers the NORMAL and BLUR thumbnails of a photo
pub struct DerivativeGenerator {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    settings: ThumbnailSettings,
}

impl DerivativeGenerator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        settings: ThumbnailSettings,
    ) -> Self {
        Self {
            metadata,
            objects,
            settings,
        }
    }

    /// Render, upload and register every variant in order.
    ///
    /// If a later variant fails, rows already registered are deleted before
    /// the error is returned; their objects are left in place.
    #[instrument(skip(self, image), fields(photo_id = %photo_id))]
    pub async fn generate(
        &self,
        image: Arc<DynamicImage>,
        photo_id: Uuid,
    ) -> Result<Vec<Thumbnail>, DerivativeError> {
        let base = self
            .resize(image)
            .await
            .map_err(|cause| DerivativeError {
                variant: ThumbnailKind::Normal,
                cause,
                compensation: Compensation::NotNeeded,
            })?;

        let mut registered: Vec<Thumbnail> = Vec::with_capacity(ThumbnailKind::ALL.len());

        for kind in ThumbnailKind::ALL {
            match self.produce(base.clone(), kind, photo_id).await {
                Ok(thumbnail) => registered.push(thumbnail),
                Err(cause) => {
                    error!(variant = %kind, error = %cause, "Thumbnail variant failed");
                    let compensation = self.compensate(&registered).await;
                    return Err(DerivativeError {
                        variant: kind,
                        cause,
                        compensation,
                    });
                }
            }
        }

        info!(count = registered.len(), "Thumbnails created");
        Ok(registered)
    }

    async fn resize(&self, image: Arc<DynamicImage>) -> Result<Arc<DynamicImage>, DerivativeCause> {
        let max_dimension = self.settings.max_dimension;
        tokio::task::spawn_blocking(move || {
            Arc::new(imaging::bounded_resize(&image, max_dimension))
        })
        .await
        .map_err(|e| DerivativeCause::Task(e.to_string()))
    }

    async fn produce(
        &self,
        base: Arc<DynamicImage>,
        kind: ThumbnailKind,
        photo_id: Uuid,
    ) -> Result<Thumbnail, DerivativeCause> {
        let rendered = self.render(base, kind).await?;
        let id = Uuid::new_v4();
        let thumbnail = Thumbnail {
            id,
            size: rendered.bytes.len() as i64,
            width: rendered.width as i32,
            height: rendered.height as i32,
            mime: THUMBNAIL_MIME.to_string(),
            kind,
            photo_id,
        };

        self.objects
            .put(
                &ObjectKey::thumbnail(id),
                Bytes::from(rendered.bytes),
                THUMBNAIL_MIME,
            )
            .await
            .map_err(DerivativeCause::Upload)?;

        self.metadata
            .insert_thumbnail(&thumbnail)
            .await
            .map_err(DerivativeCause::Register)?;

        debug!(
            thumbnail_id = %id,
            variant = %kind,
            size_bytes = thumbnail.size,
            "Thumbnail registered"
        );
        metrics::counter!("photos.thumbnails.created").increment(1);

        Ok(thumbnail)
    }

    async fn render(
        &self,
        base: Arc<DynamicImage>,
        kind: ThumbnailKind,
    ) -> Result<Rendered, DerivativeCause> {
        let ThumbnailSettings {
            blur_radius,
            jpeg_quality,
            ..
        } = self.settings;

        tokio::task::spawn_blocking(move || {
            let encoded = match kind {
                ThumbnailKind::Normal => imaging::encode_jpeg(&base, jpeg_quality),
                ThumbnailKind::Blur => {
                    let blurred = imaging::stack_blur(&base.to_rgb8(), blur_radius);
                    imaging::encode_jpeg(&DynamicImage::ImageRgb8(blurred), jpeg_quality)
                }
            };
            encoded.map(|bytes| Rendered {
                bytes,
                width: base.width(),
                height: base.height(),
            })
        })
        .await
        .map_err(|e| DerivativeCause::Task(e.to_string()))?
        .map_err(|e| DerivativeCause::Encode(e.to_string()))
    }

    /// Delete the rows of variants registered before the failure
    async fn compensate(&self, registered: &[Thumbnail]) -> Compensation {
        let mut outcome = Compensation::NotNeeded;

        for thumbnail in registered {
            let thumbnail_id = thumbnail.id;
            outcome = match self.metadata.delete_thumbnail(thumbnail_id).await {
                Ok(0) => Compensation::RollbackFailed {
                    thumbnail_id,
                    reason: "thumbnail row not found".to_string(),
                },
                Ok(_) => Compensation::RolledBack { thumbnail_id },
                Err(e) => Compensation::RollbackFailed {
                    thumbnail_id,
                    reason: e.to_string(),
                },
            };

            if let Compensation::RollbackFailed { reason, .. } = &outcome {
                warn!(
                    thumbnail_id = %thumbnail_id,
                    reason = %reason,
                    "Thumbnail rollback failed"
                );
                metrics::counter!("photos.thumbnails.compensations", "outcome" => "failed")
                    .increment(1);
                return outcome;
            }
        }

        if matches!(outcome, Compensation::RolledBack { .. }) {
            metrics::counter!("photos.thumbnails.compensations", "outcome" => "rolled_back")
                .increment(1);
        }
        outcome
    }
}
