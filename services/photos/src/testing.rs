//! In-memory gateways with failure injection for pipeline tests.

use crate::error::StoreError;
use crate::metadata_store::MetadataStore;
use crate::model::{GeoPoint, NewPhoto, Photo, PhotoStatus, Thumbnail, ThumbnailKind};
use crate::object_store::{expiry_from_now, ObjectKey, ObjectStore, SignedUrl};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

fn injected(what: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(format!("injected failure: {}", what)))
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    photos: Mutex<Vec<Photo>>,
    thumbnails: Mutex<Vec<Thumbnail>>,
    pub fail_photo_insert: AtomicBool,
    pub fail_status_update: AtomicBool,
    pub fail_thumbnail_delete: AtomicBool,
    fail_thumbnail_insert: Mutex<Option<ThumbnailKind>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts of the given variant fail
    pub fn fail_thumbnail_insert(&self, kind: ThumbnailKind) {
        *self.fail_thumbnail_insert.lock().unwrap() = Some(kind);
    }

    pub fn photo_count(&self) -> usize {
        self.photos.lock().unwrap().len()
    }

    pub fn thumbnails_of(&self, photo_id: Uuid) -> Vec<Thumbnail> {
        self.thumbnails
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.photo_id == photo_id)
            .cloned()
            .collect()
    }

    pub fn thumbnail_count(&self) -> usize {
        self.thumbnails.lock().unwrap().len()
    }

    pub fn status_of(&self, id: Uuid) -> Option<PhotoStatus> {
        self.photos
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.status)
    }

    /// Move a photo's upload time into the past
    pub fn backdate(&self, id: Uuid, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap();
        for photo in self.photos.lock().unwrap().iter_mut().filter(|p| p.id == id) {
            photo.date_uploaded = photo.date_uploaded.map(|d| d - by);
        }
    }

    /// Insert a thumbnail row directly, bypassing the generator
    pub fn seed_thumbnail(&self, thumbnail: Thumbnail) {
        self.thumbnails.lock().unwrap().push(thumbnail);
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn insert_photo(&self, photo: &NewPhoto) -> Result<(), StoreError> {
        if self.fail_photo_insert.load(Ordering::SeqCst) {
            return Err(injected("insert photo"));
        }
        let mut row = photo.clone().into_photo(PhotoStatus::Pending);
        row.date_uploaded = Some(Utc::now());
        self.photos.lock().unwrap().push(row);
        Ok(())
    }

    async fn get_photo(&self, id: Uuid) -> Result<Option<Photo>, StoreError> {
        Ok(self
            .photos
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list_photos(&self) -> Result<Vec<Photo>, StoreError> {
        Ok(self.photos.lock().unwrap().clone())
    }

    async fn update_photo_date(&self, id: Uuid, date: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut photos = self.photos.lock().unwrap();
        let mut affected = 0;
        for photo in photos.iter_mut().filter(|p| p.id == id) {
            photo.date = Some(date);
            affected += 1;
        }
        Ok(affected)
    }

    async fn update_photo_location(
        &self,
        id: Uuid,
        location: GeoPoint,
    ) -> Result<u64, StoreError> {
        let mut photos = self.photos.lock().unwrap();
        let mut affected = 0;
        for photo in photos.iter_mut().filter(|p| p.id == id) {
            photo.latitude = Some(location.latitude);
            photo.longitude = Some(location.longitude);
            affected += 1;
        }
        Ok(affected)
    }

    async fn set_photo_status(&self, id: Uuid, status: PhotoStatus) -> Result<u64, StoreError> {
        if self.fail_status_update.load(Ordering::SeqCst) {
            return Err(injected("set status"));
        }
        let mut photos = self.photos.lock().unwrap();
        let mut affected = 0;
        for photo in photos.iter_mut().filter(|p| p.id == id) {
            photo.status = status;
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete_photo(&self, id: Uuid) -> Result<u64, StoreError> {
        if self.thumbnails.lock().unwrap().iter().any(|t| t.photo_id == id) {
            return Err(injected("thumbnails still reference photo"));
        }
        let mut photos = self.photos.lock().unwrap();
        let before = photos.len();
        photos.retain(|p| p.id != id);
        Ok((before - photos.len()) as u64)
    }

    async fn list_unsettled_photos(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<Photo>, StoreError> {
        Ok(self
            .photos
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status != PhotoStatus::Committed)
            .filter(|p| p.date_uploaded.map_or(false, |d| d < before))
            .cloned()
            .collect())
    }

    async fn insert_thumbnail(&self, thumbnail: &Thumbnail) -> Result<(), StoreError> {
        if *self.fail_thumbnail_insert.lock().unwrap() == Some(thumbnail.kind) {
            return Err(injected("insert thumbnail"));
        }
        if !self
            .photos
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.id == thumbnail.photo_id)
        {
            return Err(injected("thumbnail references missing photo"));
        }
        self.thumbnails.lock().unwrap().push(thumbnail.clone());
        Ok(())
    }

    async fn list_thumbnails(&self, photo_id: Uuid) -> Result<Vec<Thumbnail>, StoreError> {
        Ok(self.thumbnails_of(photo_id))
    }

    async fn delete_thumbnail(&self, id: Uuid) -> Result<u64, StoreError> {
        if self.fail_thumbnail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete thumbnail"));
        }
        let mut thumbnails = self.thumbnails.lock().unwrap();
        let before = thumbnails.len();
        thumbnails.retain(|t| t.id != id);
        Ok((before - thumbnails.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    fail_put_prefix: Mutex<Option<String>>,
    pub fail_remove: AtomicBool,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make puts under the given key prefix fail
    pub fn fail_puts_under(&self, prefix: &str) {
        *self.fail_put_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.lock().unwrap().contains_key(key.as_str())
    }

    pub fn content_type_of(&self, key: &ObjectKey) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key.as_str())
            .map(|(_, content_type)| content_type.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn insert(&self, key: &ObjectKey, body: Bytes, content_type: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        key: &ObjectKey,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        if let Some(prefix) = self.fail_put_prefix.lock().unwrap().as_deref() {
            if key.as_str().starts_with(prefix) {
                return Err(StoreError::Object(format!("injected failure: put {}", key)));
            }
        }
        self.insert(key, body, content_type);
        Ok(())
    }

    async fn remove(&self, key: &ObjectKey) -> Result<(), StoreError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(StoreError::Object(format!("injected failure: remove {}", key)));
        }
        self.objects.lock().unwrap().remove(key.as_str());
        Ok(())
    }

    async fn exists(&self, key: &ObjectKey) -> Result<bool, StoreError> {
        Ok(self.contains(key))
    }

    async fn presigned_get(
        &self,
        key: &ObjectKey,
        ttl: Duration,
    ) -> Result<SignedUrl, StoreError> {
        Ok(SignedUrl {
            url: format!("https://objects.test/{}?X-Amz-Expires={}", key, ttl.as_secs()),
            expires_at: expiry_from_now(ttl)?,
        })
    }
}

/// A JPEG with a diagonal gradient, so it has more than one color
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    crate::imaging::encode_jpeg(&DynamicImage::ImageRgb8(image), 90).unwrap()
}
