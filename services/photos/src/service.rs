use crate::config::Config;
use crate::deletion::DeletionCoordinator;
use crate::derivatives::{DerivativeGenerator, ThumbnailSettings};
use crate::error::PhotoError;
use crate::ingest::IngestCoordinator;
use crate::metadata_store::MetadataStore;
use crate::model::{GeoPoint, Photo, Thumbnail};
use crate::object_store::{ObjectStore, SignedUrl};
use crate::query::PhotoQueries;
use crate::reconcile::Reconciler;
use crate::upload::PhotoUpload;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Settings the coordinators are built from
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub staging_dir: PathBuf,
    pub thumbnails: ThumbnailSettings,
    pub url_ttl: Duration,
    pub reconcile_grace_period: Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            staging_dir: config
                .ingest
                .staging_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            thumbnails: ThumbnailSettings::from(&config.ingest),
            url_ttl: config.presigned_url_expiry(),
            reconcile_grace_period: config.reconcile_grace_period(),
        }
    }
}

/// The photo operations exposed to the request layer.
///
/// Built once at startup from the two store handles and shared by every request.
pub struct PhotoService {
    metadata: Arc<dyn MetadataStore>,
    ingest: IngestCoordinator,
    deletion: DeletionCoordinator,
    queries: PhotoQueries,
    reconciler: Arc<Reconciler>,
}

impl PhotoService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        settings: ServiceSettings,
    ) -> Self {
        let derivatives =
            DerivativeGenerator::new(metadata.clone(), objects.clone(), settings.thumbnails);

        Self {
            ingest: IngestCoordinator::new(
                metadata.clone(),
                objects.clone(),
                derivatives,
                settings.staging_dir,
            ),
            deletion: DeletionCoordinator::new(metadata.clone(), objects.clone()),
            queries: PhotoQueries::new(metadata.clone(), objects.clone(), settings.url_ttl),
            reconciler: Arc::new(Reconciler::new(
                metadata.clone(),
                objects,
                settings.reconcile_grace_period,
            )),
            metadata,
        }
    }

    pub async fn add_photo<R>(&self, upload: PhotoUpload<R>) -> Result<Photo, PhotoError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.ingest.ingest(upload).await
    }

    pub async fn delete_photo(&self, id: Uuid) -> Result<(), PhotoError> {
        self.deletion.delete(id).await
    }

    pub async fn get_photo(&self, id: Uuid) -> Result<Photo, PhotoError> {
        self.queries.get_photo(id).await
    }

    pub async fn get_photos(&self) -> Result<Vec<Photo>, PhotoError> {
        self.queries.list_photos().await
    }

    pub async fn get_thumbnails(&self, photo_id: Uuid) -> Result<Vec<Thumbnail>, PhotoError> {
        self.queries.list_thumbnails(photo_id).await
    }

    pub async fn set_photo_date(&self, id: Uuid, date: DateTime<Utc>) -> Result<Photo, PhotoError> {
        self.queries.set_photo_date(id, date).await
    }

    pub async fn set_photo_location(
        &self,
        id: Uuid,
        location: GeoPoint,
    ) -> Result<Photo, PhotoError> {
        self.queries.set_photo_location(id, location).await
    }

    pub async fn photo_url(&self, id: Uuid) -> Result<SignedUrl, PhotoError> {
        self.queries.photo_url(id).await
    }

    pub async fn thumbnail_url(&self, id: Uuid) -> Result<SignedUrl, PhotoError> {
        self.queries.thumbnail_url(id).await
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        self.reconciler.clone()
    }

    /// Readiness of the metadata store
    pub async fn health_check(&self) -> Result<(), PhotoError> {
        Ok(self.metadata.health_check().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ThumbnailKind;
    use crate::object_store::ObjectKey;
    use crate::testing::{jpeg_bytes, InMemoryMetadataStore, InMemoryObjectStore};

    struct Harness {
        metadata: Arc<InMemoryMetadataStore>,
        objects: Arc<InMemoryObjectStore>,
        service: PhotoService,
        _staging: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let staging = tempfile::tempdir().unwrap();
        let service = PhotoService::new(
            metadata.clone(),
            objects.clone(),
            ServiceSettings {
                staging_dir: staging.path().to_path_buf(),
                thumbnails: ThumbnailSettings::default(),
                url_ttl: Duration::from_secs(3600),
                reconcile_grace_period: Duration::from_secs(3600),
            },
        );
        Harness {
            metadata,
            objects,
            service,
            _staging: staging,
        }
    }

    async fn add(h: &Harness, width: u32, height: u32) -> Photo {
        let bytes = jpeg_bytes(width, height);
        h.service
            .add_photo(PhotoUpload::new(&bytes[..]).with_content_type("image/jpeg"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_added_photo_reads_back() {
        let h = harness();
        let added = add(&h, 640, 480).await;

        let fetched = h.service.get_photo(added.id).await.unwrap();

        assert_eq!(fetched.width, added.width);
        assert_eq!(fetched.height, added.height);
        assert_eq!(fetched.size, added.size);
        assert_eq!(fetched.dominant_color, added.dominant_color);
        assert_eq!(fetched.status, added.status);
        assert!(fetched.date_uploaded.is_some());
    }

    #[tokio::test]
    async fn test_thumbnails_pair() {
        let h = harness();
        let added = add(&h, 300, 900).await;

        let thumbnails = h.service.get_thumbnails(added.id).await.unwrap();

        let kinds: Vec<_> = thumbnails.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, ThumbnailKind::ALL.to_vec());
        assert_eq!(thumbnails[0].width, thumbnails[1].width);
        assert_eq!(thumbnails[0].height, 500);
        assert!(thumbnails[0].width <= 500);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let h = harness();
        let kept = add(&h, 64, 64).await;
        let removed = add(&h, 64, 64).await;

        h.service.delete_photo(removed.id).await.unwrap();

        assert!(h.service.get_photo(removed.id).await.unwrap_err().is_not_found());
        assert!(h.service.get_thumbnails(removed.id).await.unwrap().is_empty());
        assert!(!h.objects.contains(&ObjectKey::photo(removed.id)));

        let remaining = h.service.get_photos().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept.id);
        assert_eq!(h.objects.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_twice_reports_not_found() {
        let h = harness();
        let added = add(&h, 64, 64).await;

        h.service.delete_photo(added.id).await.unwrap();
        let err = h.service.delete_photo(added.id).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(h.metadata.photo_count(), 0);
    }

    #[tokio::test]
    async fn test_signed_url_for_thumbnail() {
        let h = harness();
        let added = add(&h, 64, 64).await;
        let thumbnail = h.service.get_thumbnails(added.id).await.unwrap()[0].clone();

        let url = h.service.thumbnail_url(thumbnail.id).await.unwrap();

        assert!(url.url.contains(&thumbnail.id.to_string()));
    }
}
