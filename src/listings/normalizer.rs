use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{
    ContactDetails, ListingCategory, Location, PricePeriod, PropertyType, SiteId,
    StructuralAttributes,
};
use super::media::{ImageCeilings, MediaSource};
use super::sanitize::{sanitize_email, sanitize_phone, sanitize_video_url, DegradedToNull};
use super::tenant::TenantRouter;

/// Inbound submission body as sent by current and legacy clients.
///
/// Alternate spellings are folded onto one field through serde aliases; every
/// field is optional here so that validation can report all gaps at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSubmission {
    #[serde(default, alias = "category", alias = "listingType")]
    pub listing_type: Option<String>,
    #[serde(default, alias = "propertyType", alias = "type")]
    pub property_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "asking_price")]
    pub price: Option<FlexibleNumber>,
    #[serde(default, alias = "pricePeriod", alias = "rent_period")]
    pub price_period: Option<String>,
    #[serde(default, alias = "beds", alias = "num_bedrooms")]
    pub bedrooms: Option<FlexibleNumber>,
    #[serde(default, alias = "baths", alias = "num_bathrooms")]
    pub bathrooms: Option<FlexibleNumber>,
    #[serde(default, alias = "square_feet", alias = "area", alias = "size")]
    pub size_sqft: Option<FlexibleNumber>,
    #[serde(default, alias = "yearBuilt")]
    pub year_built: Option<FlexibleNumber>,
    #[serde(default, alias = "land_size", alias = "lotSize")]
    pub lot_size: Option<FlexibleNumber>,
    #[serde(default, alias = "country_code", alias = "countryCode")]
    pub country: Option<String>,
    #[serde(default, alias = "state", alias = "province")]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "street_address")]
    pub address: Option<String>,
    #[serde(default, alias = "zip", alias = "zip_code")]
    pub postal_code: Option<String>,
    #[serde(default, alias = "features")]
    pub amenities: Option<AmenityInput>,
    #[serde(default, alias = "email")]
    pub contact_email: Option<String>,
    #[serde(default, alias = "phone")]
    pub contact_phone: Option<String>,
    #[serde(default, alias = "youtube_url", alias = "videoUrl")]
    pub video_url: Option<String>,
    #[serde(default, alias = "imageUrls", alias = "image_references")]
    pub image_urls: Option<Vec<String>>,
    #[serde(default, alias = "image_data", alias = "photos")]
    pub images: Option<Vec<String>>,
    #[serde(default, alias = "cover_index", alias = "primaryImageIndex")]
    pub primary_image_index: Option<usize>,
    #[serde(default, alias = "attestation", alias = "ownershipAttested")]
    pub ownership_attested: Option<FlexibleBool>,
    #[serde(default, alias = "isDraft")]
    pub is_draft: Option<FlexibleBool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "create_for_user", alias = "targetUserId")]
    pub target_user_id: Option<String>,
}

/// Numeric field that older clients send as a formatted string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlexibleNumber {
    Number(f64),
    Text(String),
}

impl FlexibleNumber {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            FlexibleNumber::Number(value) => *value,
            FlexibleNumber::Text(raw) => {
                let cleaned: String = raw
                    .chars()
                    .filter(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == '-')
                    .collect();
                if cleaned.is_empty() {
                    return None;
                }
                cleaned.parse::<f64>().ok()?
            }
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for FlexibleNumber {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Boolean flag that form-encoded clients send as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlexibleBool {
    Bool(bool),
    Text(String),
}

impl FlexibleBool {
    pub fn is_true(&self) -> bool {
        match self {
            FlexibleBool::Bool(value) => *value,
            FlexibleBool::Text(raw) => matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            ),
        }
    }
}

impl From<bool> for FlexibleBool {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Amenities arrive either as an array or as one delimited string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmenityInput {
    List(Vec<String>),
    Delimited(String),
}

impl AmenityInput {
    pub fn into_set(self) -> BTreeSet<String> {
        let items: Vec<String> = match self {
            AmenityInput::List(items) => items,
            AmenityInput::Delimited(raw) => raw
                .split(&[',', ';', '|'][..])
                .map(str::to_string)
                .collect(),
        };

        items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Canonical, sanitized listing built once from a raw submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalListing {
    pub category: ListingCategory,
    pub property_type: PropertyType,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub price_period: Option<PricePeriod>,
    pub structure: StructuralAttributes,
    pub location: Location,
    pub site_id: SiteId,
    pub amenities: BTreeSet<String>,
    pub contact: ContactDetails,
    pub video_url: Option<String>,
    pub media: MediaSource,
    pub primary_image_index: usize,
    pub attested: bool,
    pub draft: bool,
    pub degraded: Vec<DegradedToNull>,
}

/// Every missing or malformed field found in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub missing_fields: Vec<&'static str>,
    pub invalid_fields: Vec<&'static str>,
}

impl ValidationError {
    pub fn missing(field: &'static str) -> Self {
        Self {
            missing_fields: vec![field],
            invalid_fields: Vec::new(),
        }
    }

    pub fn invalid(field: &'static str) -> Self {
        Self {
            missing_fields: Vec::new(),
            invalid_fields: vec![field],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing_fields.is_empty() && self.invalid_fields.is_empty()
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "submission failed validation")?;
        if !self.missing_fields.is_empty() {
            write!(f, "; missing: {}", self.missing_fields.join(", "))?;
        }
        if !self.invalid_fields.is_empty() {
            write!(f, "; invalid: {}", self.invalid_fields.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Reconciles heterogeneous payload shapes into a [`CanonicalListing`].
#[derive(Debug, Clone, Default)]
pub struct ListingNormalizer {
    tenants: TenantRouter,
    ceilings: ImageCeilings,
}

impl ListingNormalizer {
    pub fn new(tenants: TenantRouter, ceilings: ImageCeilings) -> Self {
        Self { tenants, ceilings }
    }

    pub fn normalize(&self, raw: RawSubmission) -> Result<CanonicalListing, ValidationError> {
        let mut errors = ValidationError::default();

        let draft = raw.is_draft.as_ref().is_some_and(FlexibleBool::is_true)
            || raw
                .status
                .as_deref()
                .is_some_and(|status| status.trim().eq_ignore_ascii_case("draft"));

        let category = match text(raw.listing_type.as_deref()) {
            None => ListingCategory::Sale,
            Some(value) => ListingCategory::parse(value).unwrap_or_else(|| {
                errors.invalid_fields.push("listing_type");
                ListingCategory::Sale
            }),
        };

        let property_type = text(raw.property_type.as_deref()).map(PropertyType::parse);
        let title = text(raw.title.as_deref()).map(str::to_string);

        let price = number(raw.price.as_ref(), "price", &mut errors);
        if price.is_some_and(|value| value <= 0.0) {
            errors.invalid_fields.push("price");
        }

        let price_period = match text(raw.price_period.as_deref()) {
            None => None,
            Some(value) => {
                let parsed = PricePeriod::parse(value);
                if parsed.is_none() {
                    errors.invalid_fields.push("price_period");
                }
                parsed
            }
        };

        let location = Location {
            country_code: text(raw.country.as_deref()).map(|code| code.to_ascii_uppercase()),
            region: text(raw.region.as_deref()).map(str::to_string),
            city: text(raw.city.as_deref()).map(str::to_string),
            address: text(raw.address.as_deref()).map(str::to_string),
            postal_code: text(raw.postal_code.as_deref()).map(str::to_string),
        };
        if location.country_code.as_deref().is_some_and(|code| {
            code.len() != 2 || !code.chars().all(|ch| ch.is_ascii_alphabetic())
        }) {
            errors.invalid_fields.push("country");
        }

        let structure = if property_type.is_some_and(PropertyType::is_land) {
            StructuralAttributes {
                lot_size: number(raw.lot_size.as_ref(), "lot_size", &mut errors),
                ..StructuralAttributes::default()
            }
        } else {
            StructuralAttributes {
                bedrooms: whole(raw.bedrooms.as_ref(), "bedrooms", u16::MAX as f64, &mut errors)
                    .map(|value| value as u16),
                bathrooms: number(raw.bathrooms.as_ref(), "bathrooms", &mut errors)
                    .map(|value| value as f32),
                size_sqft: whole(raw.size_sqft.as_ref(), "size_sqft", u32::MAX as f64, &mut errors)
                    .map(|value| value as u32),
                year_built: whole(raw.year_built.as_ref(), "year_built", 9999.0, &mut errors)
                    .map(|value| value as u16),
                lot_size: number(raw.lot_size.as_ref(), "lot_size", &mut errors),
            }
        };

        let attested = raw
            .ownership_attested
            .as_ref()
            .is_some_and(FlexibleBool::is_true);

        let media = match (raw.image_urls, raw.images) {
            (Some(references), _) if !references.is_empty() => MediaSource::References(references),
            (_, Some(payloads)) if !payloads.is_empty() => MediaSource::Payloads(payloads),
            _ => MediaSource::References(Vec::new()),
        };

        if title.is_none() {
            errors.missing_fields.push("title");
        }
        if media.len() > self.ceilings.for_category(category) {
            errors.invalid_fields.push("images");
        }
        if !draft {
            if property_type.is_none() {
                errors.missing_fields.push("property_type");
            }
            if raw.price.is_none() {
                errors.missing_fields.push("price");
            }
            if category.is_rental() && text(raw.price_period.as_deref()).is_none() {
                errors.missing_fields.push("price_period");
            }
            if location.country_code.is_none() {
                errors.missing_fields.push("country");
            }
            if location.city.is_none() {
                errors.missing_fields.push("city");
            }
            if !attested {
                errors.missing_fields.push("ownership_attested");
            }
            if media.is_empty() {
                errors.missing_fields.push("images");
            }
        }

        errors.into_result()?;

        let mut degraded = Vec::new();
        let contact = ContactDetails {
            email: keep_or_degrade(sanitize_email(raw.contact_email.as_deref()), &mut degraded),
            phone: keep_or_degrade(sanitize_phone(raw.contact_phone.as_deref()), &mut degraded),
        };
        let video_url = keep_or_degrade(sanitize_video_url(raw.video_url.as_deref()), &mut degraded);

        let site_id = self.tenants.route(location.country_code.as_deref());

        Ok(CanonicalListing {
            category,
            property_type: property_type.unwrap_or(PropertyType::Other),
            title: title.unwrap_or_default(),
            description: text(raw.description.as_deref()).map(str::to_string),
            price,
            price_period,
            structure,
            location,
            site_id,
            amenities: raw.amenities.map(AmenityInput::into_set).unwrap_or_default(),
            contact,
            video_url,
            media,
            primary_image_index: raw.primary_image_index.unwrap_or(0),
            attested,
            draft,
            degraded,
        })
    }

    pub fn tenants(&self) -> &TenantRouter {
        &self.tenants
    }
}

fn text(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

fn number(
    raw: Option<&FlexibleNumber>,
    field: &'static str,
    errors: &mut ValidationError,
) -> Option<f64> {
    let raw = raw?;
    match raw.as_f64() {
        Some(value) if value >= 0.0 => Some(value),
        _ => {
            errors.invalid_fields.push(field);
            None
        }
    }
}

fn whole(
    raw: Option<&FlexibleNumber>,
    field: &'static str,
    max: f64,
    errors: &mut ValidationError,
) -> Option<f64> {
    let value = number(raw, field, errors)?;
    if value.fract() != 0.0 || value > max {
        errors.invalid_fields.push(field);
        return None;
    }
    Some(value)
}

fn keep_or_degrade(
    sanitized: Result<Option<String>, DegradedToNull>,
    degraded: &mut Vec<DegradedToNull>,
) -> Option<String> {
    match sanitized {
        Ok(value) => value,
        Err(issue) => {
            degraded.push(issue);
            None
        }
    }
}
