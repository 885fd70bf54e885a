//! Ordered listing + media writes with compensating actions.
//!
//! The backing store only guarantees atomicity per statement. The listing insert
//! registers its compensation only once it succeeded, since a failed insert
//! (an id collision in particular) must never delete a row it did not write.
//! Media linking registers first so a partial batch is undone too. When a later
//! step fails, compensations run in reverse order and the caller learns whether
//! the store is clean again.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::{ListingId, ListingRecord, MediaKind, MediaRecord};
use super::repository::{ListingRepository, MediaRepository, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStep {
    InsertListing,
    LinkMedia,
    PublishImageList,
}

impl CommitStep {
    pub const fn label(self) -> &'static str {
        match self {
            CommitStep::InsertListing => "insert_listing",
            CommitStep::LinkMedia => "link_media",
            CommitStep::PublishImageList => "publish_image_list",
        }
    }
}

impl fmt::Display for CommitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// No listing was created. `rolled_back` is false when a compensation also failed
/// and an orphaned row may remain.
#[derive(Debug, thiserror::Error)]
#[error("no listing was created: {step} failed ({reason}); rolled back: {rolled_back}")]
pub struct CommitError {
    pub step: CommitStep,
    pub rolled_back: bool,
    pub reason: String,
}

/// Everything needed to write one listing.
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub listing: ListingRecord,
    pub image_urls: Vec<String>,
    pub primary_index: usize,
}

#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub listing: ListingRecord,
    pub media: Vec<MediaRecord>,
}

#[derive(Debug)]
enum Compensation {
    DeleteListing(ListingId),
    UnlinkMedia(ListingId),
}

pub struct CommitCoordinator {
    listings: Arc<dyn ListingRepository>,
    media: Arc<dyn MediaRepository>,
}

impl CommitCoordinator {
    pub fn new(listings: Arc<dyn ListingRepository>, media: Arc<dyn MediaRepository>) -> Self {
        Self { listings, media }
    }

    pub fn commit(&self, plan: CommitPlan) -> Result<CommitReceipt, CommitError> {
        let CommitPlan {
            listing,
            image_urls,
            primary_index,
        } = plan;
        let listing_id = listing.id.clone();

        if image_urls.is_empty() && !listing.is_draft() {
            return Err(CommitError {
                step: CommitStep::LinkMedia,
                rolled_back: true,
                reason: "non-draft listing has no images".to_string(),
            });
        }

        let mut saga = Saga::new(self.listings.as_ref(), self.media.as_ref());

        let stored = saga.run_final(CommitStep::InsertListing, || {
            self.listings.insert(listing)
        })?;
        saga.register(Compensation::DeleteListing(listing_id.clone()));

        if image_urls.is_empty() {
            info!(listing_id = %listing_id, "committed draft listing without media");
            return Ok(CommitReceipt {
                listing: stored,
                media: Vec::new(),
            });
        }

        let rows = media_rows(&listing_id, &image_urls, primary_index);
        let media = saga.run(
            CommitStep::LinkMedia,
            Compensation::UnlinkMedia(listing_id.clone()),
            || self.media.insert_batch(rows),
        )?;

        let published = saga.run_final(CommitStep::PublishImageList, || {
            self.listings.set_image_urls(&listing_id, image_urls)
        })?;

        info!(
            listing_id = %listing_id,
            images = media.len(),
            "committed listing with media"
        );

        Ok(CommitReceipt {
            listing: published,
            media,
        })
    }
}

/// Builds media rows in upload order with exactly one primary image.
pub fn media_rows(listing_id: &ListingId, urls: &[String], primary_index: usize) -> Vec<MediaRecord> {
    let primary = if primary_index < urls.len() {
        primary_index
    } else {
        0
    };

    urls.iter()
        .enumerate()
        .map(|(position, url)| MediaRecord {
            listing_id: listing_id.clone(),
            url: url.clone(),
            is_primary: position == primary,
            display_order: position as u32,
            kind: MediaKind::Image,
        })
        .collect()
}

struct Saga<'a> {
    listings: &'a dyn ListingRepository,
    media: &'a dyn MediaRepository,
    compensations: Vec<Compensation>,
}

impl<'a> Saga<'a> {
    fn new(listings: &'a dyn ListingRepository, media: &'a dyn MediaRepository) -> Self {
        Self {
            listings,
            media,
            compensations: Vec::new(),
        }
    }

    fn register(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    /// Registers the compensation first so a partially applied step is undone too.
    fn run<T>(
        &mut self,
        step: CommitStep,
        compensation: Compensation,
        action: impl FnOnce() -> Result<T, RepositoryError>,
    ) -> Result<T, CommitError> {
        self.register(compensation);
        self.run_final(step, action)
    }

    fn run_final<T>(
        &mut self,
        step: CommitStep,
        action: impl FnOnce() -> Result<T, RepositoryError>,
    ) -> Result<T, CommitError> {
        action().map_err(|err| self.unwind(step, err))
    }

    fn unwind(&mut self, step: CommitStep, cause: RepositoryError) -> CommitError {
        warn!(%step, error = %cause, "listing commit failed; compensating");

        let mut rolled_back = true;
        while let Some(compensation) = self.compensations.pop() {
            let outcome = match &compensation {
                Compensation::UnlinkMedia(id) => self.media.delete_for_listing(id).map(|_| ()),
                Compensation::DeleteListing(id) => self.listings.delete(id),
            };

            match outcome {
                Ok(()) | Err(RepositoryError::NotFound) => {}
                Err(err) => {
                    rolled_back = false;
                    error!(
                        ?compensation,
                        error = %err,
                        "compensation failed; store may hold an orphaned record"
                    );
                }
            }
        }

        CommitError {
            step,
            rolled_back,
            reason: cause.to_string(),
        }
    }
}
