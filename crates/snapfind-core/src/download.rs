//! Sequential photo download into a local store.
//!
//! Photos are fetched one at a time, in request order, so that only one image
//! body is held in memory and progress is reported in order. A failing item is
//! recorded and the batch moves on; only a storage permission refusal aborts a
//! batch, and it does so before any item is attempted.

use serde::Serialize;

use crate::error::{StorageError, WorkflowError};
use crate::platform::{PhotoSource, PhotoStore};
use crate::types::{PhotoDescriptor, PhotoId};

/// Result of one download attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    pub id: PhotoId,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Where the photo was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl DownloadOutcome {
    fn saved(id: PhotoId, location: String) -> Self {
        Self {
            id,
            succeeded: true,
            error_detail: None,
            location: Some(location),
        }
    }

    fn failed(id: PhotoId, detail: impl Into<String>) -> Self {
        Self {
            id,
            succeeded: false,
            error_detail: Some(detail.into()),
            location: None,
        }
    }
}

/// Outcomes of a batch, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadSummary {
    pub fn new(outcomes: Vec<DownloadOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn saved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_complete(&self) -> bool {
        self.saved() == self.total()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    /// Single line shown after a batch.
    pub fn message(&self) -> String {
        format!("Saved {} of {} photos.", self.saved(), self.total())
    }

    /// `PartialBulkFailure` when any item failed.
    pub fn as_error(&self) -> Option<WorkflowError> {
        (!self.is_complete()).then(|| WorkflowError::PartialBulkFailure {
            saved: self.saved(),
            total: self.total(),
        })
    }
}

pub struct DownloadOrchestrator<'a, P: PhotoSource + ?Sized, S: PhotoStore + ?Sized> {
    source: &'a P,
    store: &'a mut S,
}

impl<'a, P: PhotoSource + ?Sized, S: PhotoStore + ?Sized> DownloadOrchestrator<'a, P, S> {
    pub fn new(source: &'a P, store: &'a mut S) -> Self {
        Self { source, store }
    }

    /// Download a single photo. Never fails; errors land in the outcome.
    pub async fn download_one(&mut self, photo: &PhotoDescriptor) -> DownloadOutcome {
        if let Err(e) = self.store.ensure_write_access().await {
            tracing::warn!(photo = %photo.id, error = %e, "download refused");
            return DownloadOutcome::failed(photo.id.clone(), e.to_string());
        }
        self.transfer(photo).await
    }

    /// Download `photos` strictly in order, one at a time.
    ///
    /// Storage access is checked once up front; a refusal aborts the whole
    /// batch and is the only error returned.
    pub async fn download_many(
        &mut self,
        photos: &[PhotoDescriptor],
    ) -> Result<Vec<DownloadOutcome>, StorageError> {
        self.download_many_with_progress(photos, |_, _, _| {}).await
    }

    /// Like [`download_many`](Self::download_many), calling
    /// `on_progress(done, total, outcome)` after each item.
    pub async fn download_many_with_progress<F>(
        &mut self,
        photos: &[PhotoDescriptor],
        mut on_progress: F,
    ) -> Result<Vec<DownloadOutcome>, StorageError>
    where
        F: FnMut(usize, usize, &DownloadOutcome),
    {
        self.store.ensure_write_access().await.map_err(|e| {
            tracing::warn!(count = photos.len(), error = %e, "batch download aborted");
            e
        })?;

        let total = photos.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, photo) in photos.iter().enumerate() {
            let outcome = self.transfer(photo).await;
            on_progress(i + 1, total, &outcome);
            outcomes.push(outcome);
        }

        let saved = outcomes.iter().filter(|o| o.succeeded).count();
        tracing::info!(saved, total, "batch download finished");
        Ok(outcomes)
    }

    async fn transfer(&mut self, photo: &PhotoDescriptor) -> DownloadOutcome {
        let url = self.source.base().resolve(&photo.download_url);

        let bytes = match self.source.fetch_photo(&url).await {
            Ok(bytes) if bytes.is_empty() => {
                tracing::warn!(photo = %photo.id, %url, "empty photo body");
                return DownloadOutcome::failed(photo.id.clone(), "empty response body");
            }
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(photo = %photo.id, %url, error = %e, "photo fetch failed");
                return DownloadOutcome::failed(photo.id.clone(), e.to_string());
            }
        };

        match self.store.save(photo, &bytes).await {
            Ok(location) => {
                tracing::debug!(photo = %photo.id, bytes = bytes.len(), %location, "photo saved");
                DownloadOutcome::saved(photo.id.clone(), location)
            }
            Err(e) => {
                tracing::warn!(photo = %photo.id, error = %e, "photo write failed");
                DownloadOutcome::failed(photo.id.clone(), e.to_string())
            }
        }
    }
}
