//! Settles photos that ingestion left in `pending` or `failed`.
//!
//! A pending photo whose original and both thumbnail variants are present is
//! marked committed. Anything else, including every `failed` photo, is
//! garbage-collected: thumbnail rows and blobs, the original blob and finally
//! the row itself. Missing pieces are skipped.

use crate::error::PhotoError;
use crate::metadata_store::MetadataStore;
use crate::model::{Photo, PhotoStatus, Thumbnail, ThumbnailKind};
use crate::object_store::{ObjectKey, ObjectStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Completed,
    Collected,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Completed => "completed",
            Action::Collected => "collected",
        }
    }
}

/// Counts from a single sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub completed: usize,
    pub collected: usize,
    pub failed: usize,
}

pub struct Reconciler {
    metadata: Arc<dyn MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    grace_period: Duration,
}

impl Reconciler {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        grace_period: Duration,
    ) -> Self {
        Self {
            metadata,
            objects,
            grace_period,
        }
    }

    /// Settle every unsettled photo uploaded before the grace period
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<ReconcileReport, PhotoError> {
        let grace = chrono::Duration::from_std(self.grace_period).map_err(|_| {
            PhotoError::InvalidInput(format!(
                "grace period out of range: {:?}",
                self.grace_period
            ))
        })?;
        let cutoff = Utc::now() - grace;

        let photos = self.metadata.list_unsettled_photos(cutoff).await?;
        let mut report = ReconcileReport::default();

        for photo in &photos {
            match self.settle(photo).await {
                Ok(action) => {
                    metrics::counter!("photos.reconciled", "action" => action.as_str())
                        .increment(1);
                    info!(photo_id = %photo.id, status = photo.status.as_str(), action = action.as_str(), "Photo reconciled");
                    match action {
                        Action::Completed => report.completed += 1,
                        Action::Collected => report.collected += 1,
                    }
                }
                Err(e) => {
                    metrics::counter!("photos.reconciled", "action" => "failed").increment(1);
                    warn!(photo_id = %photo.id, error = %e, "Failed to reconcile photo");
                    report.failed += 1;
                }
            }
        }

        if !photos.is_empty() {
            info!(
                completed = report.completed,
                collected = report.collected,
                failed = report.failed,
                "Reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep on a fixed interval until the task is aborted
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep().await {
                error!(error = %e, "Reconciliation sweep failed");
            }
        }
    }

    async fn settle(&self, photo: &Photo) -> Result<Action, PhotoError> {
        let thumbnails = self.metadata.list_thumbnails(photo.id).await?;
        let original = self.objects.exists(&ObjectKey::photo(photo.id)).await?;

        if photo.status == PhotoStatus::Pending && original && has_every_variant(&thumbnails) {
            if self
                .metadata
                .set_photo_status(photo.id, PhotoStatus::Committed)
                .await?
                == 0
            {
                return Err(PhotoError::PhotoNotFound(photo.id));
            }
            return Ok(Action::Completed);
        }

        for thumbnail in &thumbnails {
            self.metadata.delete_thumbnail(thumbnail.id).await?;
            self.objects
                .remove(&ObjectKey::thumbnail(thumbnail.id))
                .await?;
        }
        self.objects.remove(&ObjectKey::photo(photo.id)).await?;
        self.metadata.delete_photo(photo.id).await?;

        Ok(Action::Collected)
    }
}

/// Exactly one thumbnail of each variant
fn has_every_variant(thumbnails: &[Thumbnail]) -> bool {
    thumbnails.len() == ThumbnailKind::ALL.len()
        && ThumbnailKind::ALL
            .iter()
            .all(|kind| thumbnails.iter().filter(|t| t.kind == *kind).count() == 1)
}
