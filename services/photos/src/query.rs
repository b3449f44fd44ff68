use crate::error::PhotoError;
use crate::metadata_store::MetadataStore;
use crate::model::{GeoPoint, Photo, Thumbnail};
use crate::object_store::{Namespace, ObjectKey, ObjectStore, SignedUrl};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Reads, signed URLs and the two field updates
pub struct PhotoQueries {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    url_ttl: Duration,
}

impl PhotoQueries {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            metadata,
            objects,
            url_ttl,
        }
    }

    pub async fn get_photo(&self, id: Uuid) -> Result<Photo, PhotoError> {
        self.metadata
            .get_photo(id)
            .await?
            .ok_or(PhotoError::PhotoNotFound(id))
    }

    /// All photos in storage order
    pub async fn list_photos(&self) -> Result<Vec<Photo>, PhotoError> {
        Ok(self.metadata.list_photos().await?)
    }

    pub async fn list_thumbnails(&self, photo_id: Uuid) -> Result<Vec<Thumbnail>, PhotoError> {
        Ok(self.metadata.list_thumbnails(photo_id).await?)
    }

    /// Read URL for an object in `namespace`; the object is not checked for existence
    pub async fn signed_url(&self, namespace: Namespace, id: Uuid) -> Result<SignedUrl, PhotoError> {
        let key = ObjectKey::new(namespace, id);
        let url = self.objects.presigned_get(&key, self.url_ttl).await?;
        debug!(key = %key, expires_at = %url.expires_at, "Issued signed URL");
        Ok(url)
    }

    pub async fn photo_url(&self, id: Uuid) -> Result<SignedUrl, PhotoError> {
        self.signed_url(Namespace::Photos, id).await
    }

    pub async fn thumbnail_url(&self, id: Uuid) -> Result<SignedUrl, PhotoError> {
        self.signed_url(Namespace::Thumbnails, id).await
    }

    #[instrument(skip(self), fields(photo_id = %id))]
    pub async fn set_photo_date(&self, id: Uuid, date: DateTime<Utc>) -> Result<Photo, PhotoError> {
        if self.metadata.update_photo_date(id, date).await? == 0 {
            return Err(PhotoError::PhotoNotFound(id));
        }
        self.get_photo(id).await
    }

    #[instrument(skip(self), fields(photo_id = %id))]
    pub async fn set_photo_location(
        &self,
        id: Uuid,
        location: GeoPoint,
    ) -> Result<Photo, PhotoError> {
        if !location.is_valid() {
            return Err(PhotoError::InvalidInput(format!(
                "coordinates out of range: ({}, {})",
                location.latitude, location.longitude
            )));
        }
        if self.metadata.update_photo_location(id, location).await? == 0 {
            return Err(PhotoError::PhotoNotFound(id));
        }
        self.get_photo(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewPhoto;
    use crate::testing::{InMemoryMetadataStore, InMemoryObjectStore};
    use chrono::TimeZone;

    fn queries() -> (Arc<InMemoryMetadataStore>, PhotoQueries) {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let queries = PhotoQueries::new(
            metadata.clone(),
            Arc::new(InMemoryObjectStore::new()),
            Duration::from_secs(3600),
        );
        (metadata, queries)
    }

    async fn seed(metadata: &InMemoryMetadataStore) -> Uuid {
        let id = Uuid::new_v4();
        metadata
            .insert_photo(&NewPhoto {
                id,
                size: 1000,
                width: 300,
                height: 200,
                mime: "image/jpeg".to_string(),
                dominant_color: "a0b0c0".to_string(),
                location: None,
                date: None,
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_get_missing_photo() {
        let (_, queries) = queries();
        let id = Uuid::new_v4();

        let err = queries.get_photo(id).await.unwrap_err();

        assert!(matches!(err, PhotoError::PhotoNotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn test_set_date_changes_only_date() {
        let (metadata, queries) = queries();
        let id = seed(&metadata).await;
        let before = queries.get_photo(id).await.unwrap();
        let date = Utc.with_ymd_and_hms(2020, 5, 17, 8, 0, 0).unwrap();

        let updated = queries.set_photo_date(id, date).await.unwrap();

        assert_eq!(updated.date, Some(date));
        assert_eq!(
            Photo {
                date: before.date,
                ..updated.clone()
            },
            before
        );
        assert_eq!(queries.get_photo(id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_set_location_changes_only_location() {
        let (metadata, queries) = queries();
        let id = seed(&metadata).await;
        let before = queries.get_photo(id).await.unwrap();
        let point = GeoPoint {
            latitude: -33.8688,
            longitude: 151.2093,
        };

        let updated = queries.set_photo_location(id, point).await.unwrap();

        assert_eq!(updated.location(), Some(point));
        assert_eq!(
            Photo {
                latitude: None,
                longitude: None,
                ..updated
            },
            before
        );
    }

    #[tokio::test]
    async fn test_updates_on_missing_photo() {
        let (metadata, queries) = queries();
        let existing = seed(&metadata).await;
        let missing = Uuid::new_v4();

        let date_err = queries.set_photo_date(missing, Utc::now()).await.unwrap_err();
        let location_err = queries
            .set_photo_location(
                missing,
                GeoPoint {
                    latitude: 1.0,
                    longitude: 2.0,
                },
            )
            .await
            .unwrap_err();

        assert!(date_err.is_not_found());
        assert!(location_err.is_not_found());
        let untouched = queries.get_photo(existing).await.unwrap();
        assert!(untouched.date.is_none());
        assert!(untouched.location().is_none());
    }

    #[tokio::test]
    async fn test_invalid_location_rejected() {
        let (metadata, queries) = queries();
        let id = seed(&metadata).await;

        let err = queries
            .set_photo_location(
                id,
                GeoPoint {
                    latitude: 91.0,
                    longitude: 0.0,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PhotoError::InvalidInput(_)));
        assert!(queries.get_photo(id).await.unwrap().location().is_none());
    }

    #[tokio::test]
    async fn test_signed_urls_use_namespaces() {
        let (_, queries) = queries();
        let id = Uuid::new_v4();

        let photo = queries.photo_url(id).await.unwrap();
        let thumbnail = queries.thumbnail_url(id).await.unwrap();

        assert!(photo.url.contains(&format!("photos/{}", id)));
        assert!(thumbnail.url.contains(&format!("thumbnails/{}", id)));
        assert!(photo.expires_at > Utc::now() + chrono::Duration::minutes(59));
    }
}
