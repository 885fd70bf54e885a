use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use mime::Mime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{AccountId, ListingCategory, SiteId};
use super::normalizer::ValidationError;
use super::repository::ObjectStorage;
use super::sanitize::parse_http_url;

const DEFAULT_SALE_CEILING: usize = 25;
const DEFAULT_RENTAL_CEILING: usize = 15;

static UPLOAD_BATCH: AtomicU64 = AtomicU64::new(1);

/// Where the images of a submission come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// URLs of objects the client already uploaded.
    References(Vec<String>),
    /// Base64 bodies (optionally data-URIs) sent by legacy clients.
    Payloads(Vec<String>),
}

impl MediaSource {
    pub fn len(&self) -> usize {
        match self {
            MediaSource::References(items) | MediaSource::Payloads(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maximum images per listing, by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCeilings {
    pub sale: usize,
    pub rental: usize,
}

impl ImageCeilings {
    pub fn for_category(&self, category: ListingCategory) -> usize {
        if category.is_rental() {
            self.rental
        } else {
            self.sale
        }
    }
}

impl Default for ImageCeilings {
    fn default() -> Self {
        Self {
            sale: DEFAULT_SALE_CEILING,
            rental: DEFAULT_RENTAL_CEILING,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("image {index} could not be stored: {reason}")]
    UploadFailed { index: usize, reason: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Object written to storage during the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBlob {
    pub key: String,
    pub url: String,
}

/// Ordered image URLs plus the blobs this request created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaIngestion {
    pub urls: Vec<String>,
    pub uploaded: Vec<UploadedBlob>,
}

/// Storage namespace for one submission's uploads.
#[derive(Debug, Clone, Copy)]
pub struct UploadScope<'a> {
    pub site: &'a SiteId,
    pub owner: &'a AccountId,
}

pub struct MediaIngestor {
    storage: Arc<dyn ObjectStorage>,
    ceilings: ImageCeilings,
}

impl MediaIngestor {
    pub fn new(storage: Arc<dyn ObjectStorage>, ceilings: ImageCeilings) -> Self {
        Self { storage, ceilings }
    }

    pub fn ceilings(&self) -> ImageCeilings {
        self.ceilings
    }

    /// Checks the image count for the category before anything is uploaded.
    pub fn check_count(
        &self,
        source: &MediaSource,
        category: ListingCategory,
        draft: bool,
    ) -> Result<(), ValidationError> {
        if source.is_empty() && !draft {
            return Err(ValidationError::missing("images"));
        }
        if source.len() > self.ceilings.for_category(category) {
            return Err(ValidationError::invalid("images"));
        }
        Ok(())
    }

    /// Resolves every image to a storage URL, uploading raw payloads one at a time.
    ///
    /// On failure the blobs already written by this call are discarded before returning.
    pub fn ingest(
        &self,
        source: &MediaSource,
        scope: UploadScope<'_>,
        category: ListingCategory,
        draft: bool,
    ) -> Result<MediaIngestion, MediaError> {
        self.check_count(source, category, draft)?;

        match source {
            MediaSource::References(references) => {
                let urls = references
                    .iter()
                    .enumerate()
                    .map(|(index, reference)| {
                        parse_http_url(reference)
                            .map(|url| url.to_string())
                            .ok_or_else(|| MediaError::UploadFailed {
                                index,
                                reason: "reference is not an http(s) url".to_string(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(MediaIngestion {
                    urls,
                    uploaded: Vec::new(),
                })
            }
            MediaSource::Payloads(payloads) => self.upload_payloads(payloads, scope),
        }
    }

    fn upload_payloads(
        &self,
        payloads: &[String],
        scope: UploadScope<'_>,
    ) -> Result<MediaIngestion, MediaError> {
        let batch = UPLOAD_BATCH.fetch_add(1, Ordering::Relaxed);
        let mut ingestion = MediaIngestion::default();

        for (index, payload) in payloads.iter().enumerate() {
            let stored = decode_payload(payload).and_then(|(content_type, bytes)| {
                let key = format!(
                    "listings/{}/{}/{batch:06}-{index}.{}",
                    scope.site,
                    scope.owner,
                    extension_for(&content_type)
                );
                self.storage
                    .put(&key, content_type.as_ref(), bytes)
                    .map(|url| UploadedBlob { key, url })
                    .map_err(|err| err.to_string())
            });

            match stored {
                Ok(blob) => {
                    debug!(key = %blob.key, index, "stored listing image");
                    ingestion.urls.push(blob.url.clone());
                    ingestion.uploaded.push(blob);
                }
                Err(reason) => {
                    warn!(index, %reason, "image upload failed; aborting ingestion");
                    self.discard(&ingestion.uploaded);
                    return Err(MediaError::UploadFailed { index, reason });
                }
            }
        }

        Ok(ingestion)
    }

    /// Best-effort removal of blobs that will never be linked to a listing.
    pub fn discard(&self, uploaded: &[UploadedBlob]) {
        for blob in uploaded {
            if let Err(err) = self.storage.delete(&blob.key) {
                warn!(key = %blob.key, error = %err, "orphaned listing image left in storage");
            }
        }
    }
}

fn decode_payload(raw: &str) -> Result<(Mime, Vec<u8>), String> {
    let raw = raw.trim();
    let (content_type, encoded) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| "malformed data uri".to_string())?;
            let declared = meta
                .strip_suffix(";base64")
                .ok_or_else(|| "data uri is not base64 encoded".to_string())?;
            let content_type = declared
                .parse::<Mime>()
                .map_err(|err| format!("invalid content type '{declared}': {err}"))?;
            (content_type, data)
        }
        None => (mime::IMAGE_JPEG, raw),
    };

    if content_type.type_() != mime::IMAGE {
        return Err(format!("unsupported content type {content_type}"));
    }

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| format!("invalid base64 payload: {err}"))?;
    if bytes.is_empty() {
        return Err("empty image payload".to_string());
    }

    Ok((content_type, bytes))
}

fn extension_for(content_type: &Mime) -> &'static str {
    let subtype = content_type.subtype().as_str();
    match mime_guess::get_mime_extensions(content_type) {
        Some(extensions) => extensions
            .iter()
            .copied()
            .find(|extension| *extension == subtype)
            .or_else(|| extensions.first().copied())
            .unwrap_or("bin"),
        None => "bin",
    }
}
