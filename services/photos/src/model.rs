//! Photo and thumbnail records shared by the gateways and coordinators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// MIME type of every rendered derivative
pub const THUMBNAIL_MIME: &str = "image/jpeg";

/// Saga state of a photo row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "photo_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PhotoStatus {
    /// Row written, derivatives and/or original not yet confirmed
    Pending,
    /// Row, derivatives and original object all stored
    Committed,
    /// A step after the row write failed
    Failed,
}

impl PhotoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoStatus::Pending => "pending",
            PhotoStatus::Committed => "committed",
            PhotoStatus::Failed => "failed",
        }
    }
}

/// Derivative variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "thumbnail_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ThumbnailKind {
    /// The bounded resize, unmodified
    Normal,
    /// The bounded resize passed through a stack blur
    Blur,
}

impl ThumbnailKind {
    /// Variants every committed photo owns, in generation order
    pub const ALL: [ThumbnailKind; 2] = [ThumbnailKind::Normal, ThumbnailKind::Blur];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThumbnailKind::Normal => "NORMAL",
            ThumbnailKind::Blur => "BLUR",
        }
    }
}

impl fmt::Display for ThumbnailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A geographic point; latitude and longitude are always set together
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Whether both components are inside their valid degree ranges
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Stored photo metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    /// Unique photo ID
    pub id: Uuid,
    /// Original upload size in bytes
    pub size: i64,
    /// Pixel width
    pub width: i32,
    /// Pixel height
    pub height: i32,
    /// Declared content type of the original
    pub mime: String,
    /// Lowercase hex of the most prominent color cluster
    pub dominant_color: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Capture time
    pub date: Option<DateTime<Utc>>,
    /// Set by the database when the row is written
    pub date_uploaded: Option<DateTime<Utc>>,
    pub status: PhotoStatus,
}

impl Photo {
    /// Capture location, if both coordinates are stored
    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// Stored thumbnail metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Thumbnail {
    pub id: Uuid,
    pub size: i64,
    pub width: i32,
    pub height: i32,
    pub mime: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: ThumbnailKind,
    pub photo_id: Uuid,
}

/// Row values for a photo insert
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub id: Uuid,
    pub size: i64,
    pub width: i32,
    pub height: i32,
    pub mime: String,
    pub dominant_color: String,
    pub location: Option<GeoPoint>,
    pub date: Option<DateTime<Utc>>,
}

impl NewPhoto {
    /// The record as returned to callers after ingestion, without a re-read
    pub fn into_photo(self, status: PhotoStatus) -> Photo {
        Photo {
            id: self.id,
            size: self.size,
            width: self.width,
            height: self.height,
            mime: self.mime,
            dominant_color: self.dominant_color,
            latitude: self.location.map(|l| l.latitude),
            longitude: self.location.map(|l| l.longitude),
            date: self.date,
            date_uploaded: None,
            status,
        }
    }
}

/// Capture metadata read from EXIF; both fields absent when unreadable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureMetadata {
    pub date: Option<DateTime<Utc>>,
    pub location: Option<GeoPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_requires_both_coordinates() {
        let mut photo = NewPhoto {
            id: Uuid::new_v4(),
            size: 10,
            width: 2,
            height: 2,
            mime: "image/jpeg".to_string(),
            dominant_color: "ffffff".to_string(),
            location: Some(GeoPoint {
                latitude: 48.8584,
                longitude: 2.2945,
            }),
            date: None,
        }
        .into_photo(PhotoStatus::Pending);

        assert_eq!(photo.location().map(|l| l.longitude), Some(2.2945));

        photo.longitude = None;
        assert!(photo.location().is_none());
    }

    #[test]
    fn test_geo_point_ranges() {
        assert!(GeoPoint { latitude: -90.0, longitude: 180.0 }.is_valid());
        assert!(!GeoPoint { latitude: 90.5, longitude: 0.0 }.is_valid());
        assert!(!GeoPoint { latitude: 0.0, longitude: -181.0 }.is_valid());
    }

    #[test]
    fn test_thumbnail_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&ThumbnailKind::Blur).unwrap(), "\"BLUR\"");
        assert_eq!(ThumbnailKind::ALL[0], ThumbnailKind::Normal);
        assert_eq!(PhotoStatus::Committed.as_str(), "committed");
    }
}
