//! Contact-field sanitizers.
//!
//! A sanitizer never fails the submission. `Ok(None)` means the client omitted the
//! field, `Err(DegradedToNull)` means a value was supplied but rejected and will be
//! stored as null.

use std::fmt;

use serde::Serialize;
use url::Url;

const MIN_EMAIL_LENGTH: usize = 6;
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

/// Record of a supplied value that was discarded during sanitizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedToNull {
    pub field: &'static str,
    pub reason: &'static str,
}

impl fmt::Display for DegradedToNull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stored as null: {}", self.field, self.reason)
    }
}

pub type Sanitized<T> = Result<Option<T>, DegradedToNull>;

fn degraded(field: &'static str, reason: &'static str) -> DegradedToNull {
    DegradedToNull { field, reason }
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

pub fn sanitize_email(raw: Option<&str>) -> Sanitized<String> {
    const FIELD: &str = "contact_email";

    let Some(value) = present(raw) else {
        return Ok(None);
    };

    let email = value.to_ascii_lowercase();
    if email.len() < MIN_EMAIL_LENGTH {
        return Err(degraded(FIELD, "too short to be an address"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(degraded(FIELD, "contains whitespace"));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(degraded(FIELD, "missing @"));
    };
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(degraded(FIELD, "malformed domain"));
    }

    Ok(Some(email))
}

/// Normalizes to a dialable form: digits only, with a leading `+` for international numbers.
pub fn sanitize_phone(raw: Option<&str>) -> Sanitized<String> {
    const FIELD: &str = "contact_phone";

    let Some(value) = present(raw) else {
        return Ok(None);
    };

    let mut international = false;
    let mut digits = String::with_capacity(value.len());
    for (position, ch) in value.chars().enumerate() {
        match ch {
            '+' if position == 0 => international = true,
            '0'..='9' => digits.push(ch),
            ' ' | '-' | '.' | '(' | ')' | '/' => {}
            _ => return Err(degraded(FIELD, "unexpected character")),
        }
    }

    if !international && digits.starts_with("00") {
        digits.drain(..2);
        international = true;
    }

    if digits.len() < MIN_PHONE_DIGITS || digits.len() > MAX_PHONE_DIGITS {
        return Err(degraded(FIELD, "implausible number of digits"));
    }

    if international {
        Ok(Some(format!("+{digits}")))
    } else {
        Ok(Some(digits))
    }
}

pub fn sanitize_video_url(raw: Option<&str>) -> Sanitized<String> {
    let Some(value) = present(raw) else {
        return Ok(None);
    };

    parse_http_url(value)
        .map(|url| Some(url.to_string()))
        .ok_or_else(|| degraded("video_url", "not a well-formed http(s) url"))
}

/// Parses an absolute http/https URL with a host.
pub(crate) fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if url.host_str().map_or(true, str::is_empty) {
        return None;
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_requires_at_sign_and_plausible_length() {
        assert_eq!(
            sanitize_email(Some("  Seller@Example.COM ")),
            Ok(Some("seller@example.com".to_string()))
        );
        assert!(sanitize_email(Some("a@b")).is_err());
        assert!(sanitize_email(Some("seller.example.com")).is_err());
        assert!(sanitize_email(Some("@example.com")).is_err());
        assert!(sanitize_email(Some("seller@localhost")).is_err());
        assert_eq!(sanitize_email(Some("   ")), Ok(None));
        assert_eq!(sanitize_email(None), Ok(None));
    }

    #[test]
    fn phone_is_normalized_to_dialable_form() {
        assert_eq!(
            sanitize_phone(Some("+1 (555) 123-4567")),
            Ok(Some("+15551234567".to_string()))
        );
        assert_eq!(
            sanitize_phone(Some("0044 20 7946 0958")),
            Ok(Some("+442079460958".to_string()))
        );
        assert_eq!(
            sanitize_phone(Some("555.123.4567")),
            Ok(Some("5551234567".to_string()))
        );
        assert!(sanitize_phone(Some("12345")).is_err());
        assert!(sanitize_phone(Some("call me maybe")).is_err());
        assert!(sanitize_phone(Some("555+1234567")).is_err());
    }

    #[test]
    fn video_url_requires_http_scheme() {
        assert_eq!(
            sanitize_video_url(Some("https://www.youtube.com/watch?v=abc123")),
            Ok(Some("https://www.youtube.com/watch?v=abc123".to_string()))
        );
        assert!(sanitize_video_url(Some("javascript:alert(1)")).is_err());
        assert!(sanitize_video_url(Some("ftp://files.example.com/tour.mp4")).is_err());
        assert!(sanitize_video_url(Some("not a url")).is_err());
    }

    #[test]
    fn sanitizers_are_idempotent() {
        let emails = ["Buyer@Example.org", "x.y@sub.domain.co"];
        for raw in emails {
            let once = sanitize_email(Some(raw)).expect("valid").expect("present");
            let twice = sanitize_email(Some(&once)).expect("valid").expect("present");
            assert_eq!(once, twice);
        }

        let phones = ["+1 555 123 4567", "00 33 1 23 45 67 89", "(020) 7946-0958"];
        for raw in phones {
            let once = sanitize_phone(Some(raw)).expect("valid").expect("present");
            let twice = sanitize_phone(Some(&once)).expect("valid").expect("present");
            assert_eq!(once, twice);
        }

        let urls = ["HTTPS://Example.com/tour", "http://vimeo.com/12345?t=10"];
        for raw in urls {
            let once = sanitize_video_url(Some(raw))
                .expect("valid")
                .expect("present");
            let twice = sanitize_video_url(Some(&once))
                .expect("valid")
                .expect("present");
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn omitted_and_rejected_fields_are_distinguishable() {
        assert_eq!(sanitize_video_url(None), Ok(None));
        let rejected = sanitize_video_url(Some("mailto:agent@example.com"))
            .expect_err("mailto is rejected");
        assert_eq!(rejected.field, "video_url");
    }
}
