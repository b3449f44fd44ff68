use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::model::{GeoPoint, NewPhoto, Photo, PhotoStatus, Thumbnail};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const PHOTO_COLUMNS: &str = r#"
    id, size, width, height, mime, dominant_color,
    latitude, longitude, date, date_uploaded, status
"#;

const THUMBNAIL_COLUMNS: &str = "id, size, width, height, mime, type, photo_id";

/// Parameterized access to the `photos` and `thumbnails` tables.
///
/// Every mutation is a single statement; counts returned from updates and
/// deletes are rows affected, and callers decide what zero means.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a photo row in `pending` state
    async fn insert_photo(&self, photo: &NewPhoto) -> Result<(), StoreError>;

    async fn get_photo(&self, id: Uuid) -> Result<Option<Photo>, StoreError>;

    /// All photos, in whatever order the database returns them
    async fn list_photos(&self) -> Result<Vec<Photo>, StoreError>;

    async fn update_photo_date(&self, id: Uuid, date: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn update_photo_location(&self, id: Uuid, location: GeoPoint)
        -> Result<u64, StoreError>;

    async fn set_photo_status(&self, id: Uuid, status: PhotoStatus) -> Result<u64, StoreError>;

    async fn delete_photo(&self, id: Uuid) -> Result<u64, StoreError>;

    /// Photos not yet committed that were uploaded before `before`
    async fn list_unsettled_photos(&self, before: DateTime<Utc>)
        -> Result<Vec<Photo>, StoreError>;

    async fn insert_thumbnail(&self, thumbnail: &Thumbnail) -> Result<(), StoreError>;

    async fn list_thumbnails(&self, photo_id: Uuid) -> Result<Vec<Thumbnail>, StoreError>;

    async fn delete_thumbnail(&self, id: Uuid) -> Result<u64, StoreError>;

    /// Round-trip to the database
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Metadata store for photo indexing in PostgreSQL
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    #[instrument(skip(self, photo), fields(photo_id = %photo.id))]
    async fn insert_photo(&self, photo: &NewPhoto) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO photos (
                id, size, width, height, mime, dominant_color,
                latitude, longitude, date, status
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10
            )
            "#,
        )
        .bind(photo.id)
        .bind(photo.size)
        .bind(photo.width)
        .bind(photo.height)
        .bind(&photo.mime)
        .bind(&photo.dominant_color)
        .bind(photo.location.map(|l| l.latitude))
        .bind(photo.location.map(|l| l.longitude))
        .bind(photo.date)
        .bind(PhotoStatus::Pending)
        .execute(&self.pool)
        .await?;

        debug!(photo_id = %photo.id, "Photo row inserted");
        Ok(())
    }

    async fn get_photo(&self, id: Uuid) -> Result<Option<Photo>, StoreError> {
        let sql = format!("SELECT {} FROM photos WHERE id = $1", PHOTO_COLUMNS);
        let photo = sqlx::query_as::<_, Photo>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(photo)
    }

    async fn list_photos(&self) -> Result<Vec<Photo>, StoreError> {
        let sql = format!("SELECT {} FROM photos", PHOTO_COLUMNS);
        let photos = sqlx::query_as::<_, Photo>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(photos)
    }

    async fn update_photo_date(&self, id: Uuid, date: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE photos SET date = $1 WHERE id = $2")
            .bind(date)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn update_photo_location(
        &self,
        id: Uuid,
        location: GeoPoint,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE photos SET latitude = $1, longitude = $2 WHERE id = $3")
            .bind(location.latitude)
            .bind(location.longitude)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn set_photo_status(&self, id: Uuid, status: PhotoStatus) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE photos SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn delete_photo(&self, id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM photos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_unsettled_photos(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<Photo>, StoreError> {
        let sql = format!(
            "SELECT {} FROM photos WHERE status <> 'committed' AND date_uploaded < $1",
            PHOTO_COLUMNS
        );
        let photos = sqlx::query_as::<_, Photo>(&sql)
            .bind(before)
            .fetch_all(&self.pool)
            .await?;

        Ok(photos)
    }

    #[instrument(skip(self, thumbnail), fields(thumbnail_id = %thumbnail.id, photo_id = %thumbnail.photo_id))]
    async fn insert_thumbnail(&self, thumbnail: &Thumbnail) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO thumbnails (id, size, width, height, mime, type, photo_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(thumbnail.id)
        .bind(thumbnail.size)
        .bind(thumbnail.width)
        .bind(thumbnail.height)
        .bind(&thumbnail.mime)
        .bind(thumbnail.kind)
        .bind(thumbnail.photo_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_thumbnails(&self, photo_id: Uuid) -> Result<Vec<Thumbnail>, StoreError> {
        let sql = format!(
            "SELECT {} FROM thumbnails WHERE photo_id = $1 ORDER BY type",
            THUMBNAIL_COLUMNS
        );
        let thumbnails = sqlx::query_as::<_, Thumbnail>(&sql)
            .bind(photo_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(thumbnails)
    }

    async fn delete_thumbnail(&self, id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM thumbnails WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
