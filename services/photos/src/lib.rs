//! Shutter Photos Service
//!
//! Photo ingestion and derivative management for the Shutter photo library.
//! Uploaded JPEGs are analyzed (dimensions, EXIF capture time and position,
//! dominant color), recorded in PostgreSQL, rendered into a NORMAL and a BLUR
//! thumbnail, and stored together with the original in S3.
//!
//! ## Features
//!
//! - **Ingestion pipeline**: staged uploads, strictly ordered steps, a
//!   `pending`/`committed`/`failed` status on every photo row
//! - **Derivatives**: two 500px-bounded thumbnails per photo, with a
//!   compensating delete when the second variant fails
//! - **Reconciliation**: a background sweep that completes or garbage-collects
//!   photos left unsettled by a failed ingestion
//! - **Signed URLs**: time-limited read access to originals and thumbnails
//!
//! ## Architecture
//!
//! ```text
//!  HTTP (axum)
//! ┌──────────────┐
//! │ API          │
//! └──────────────┘
//!        │
//!        ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Photo        │────▶│ Ingest       │────▶│ Derivative   │
//! │ Service      │     │ Coordinator  │     │ Generator    │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!   │    │    │               │                    │
//!   │    │    ▼               ▼                    ▼
//!   │    │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!   │    │  │ Deletion     │ │ Metadata     │ │ Object       │
//!   │    │  │ Coordinator  │ │ Store (PG)   │ │ Store (S3)   │
//!   │    │  └──────────────┘ └──────────────┘ └──────────────┘
//!   │    ▼                          ▲                ▲
//!   │  ┌──────────────┐             │                │
//!   │  │ Queries      │─────────────┴────────────────┤
//!   │  └──────────────┘                              │
//!   ▼                                                │
//! ┌──────────────┐                                   │
//! │ Reconciler   │───────────────────────────────────┘
//! └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod deletion;
pub mod derivatives;
pub mod error;
pub mod imaging;
pub mod ingest;
pub mod metadata_store;
pub mod model;
pub mod object_store;
pub mod query;
pub mod reconcile;
pub mod service;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{Compensation, DerivativeError, PhotoError, StoreError};
pub use metadata_store::{MetadataStore, PgMetadataStore};
pub use model::{GeoPoint, Photo, PhotoStatus, Thumbnail, ThumbnailKind};
pub use object_store::{ObjectKey, ObjectStore, S3ObjectStore, SignedUrl};
pub use service::{PhotoService, ServiceSettings};
pub use upload::PhotoUpload;
