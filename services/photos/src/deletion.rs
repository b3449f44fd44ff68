use crate::error::PhotoError;
use crate::metadata_store::MetadataStore;
use crate::object_store::{ObjectKey, ObjectStore};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Removes a photo's derivatives, its original and finally its row.
///
/// Steps run strictly in order and the first failure aborts the rest, so a
/// failed delete can leave a partially removed photo behind.
pub struct DeletionCoordinator {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
}

impl DeletionCoordinator {
    pub fn new(metadata: Arc<dyn MetadataStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { metadata, objects }
    }

    #[instrument(skip(self), fields(photo_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<(), PhotoError> {
        let thumbnails = self.metadata.list_thumbnails(id).await?;

        for thumbnail in &thumbnails {
            if self.metadata.delete_thumbnail(thumbnail.id).await? == 0 {
                return Err(PhotoError::ThumbnailNotFound(thumbnail.id));
            }
            self.objects
                .remove(&ObjectKey::thumbnail(thumbnail.id))
                .await?;
            debug!(thumbnail_id = %thumbnail.id, variant = %thumbnail.kind, "Thumbnail removed");
        }

        self.objects.remove(&ObjectKey::photo(id)).await?;

        if self.metadata.delete_photo(id).await? == 0 {
            return Err(PhotoError::PhotoNotFound(id));
        }

        metrics::counter!("photos.deleted").increment(1);
        info!(thumbnails = thumbnails.len(), "Photo deleted");
        Ok(())
    }
}
