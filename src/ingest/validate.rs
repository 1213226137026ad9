use crate::event::{Device, Engagement, Location, Session, TechnicalData, VisitorEvent};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Caps applied to client-supplied strings; oversized values are truncated
/// rather than rejected.
const MAX_FIELD_LEN: usize = 256;
const MAX_URL_LEN: usize = 2048;
const MAX_USER_AGENT_LEN: usize = 1024;

/// Inbound payload from the tracking client. Everything except `id` is
/// optional; absent sub-records canonicalize to their defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<String>,
    /// Client-supplied creation time. Informational only; the ingest
    /// endpoint overwrites it with the server clock.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub engagement: Engagement,
    #[serde(default)]
    pub technical_data: TechnicalData,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ValidationError {
    MissingId,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingId => write!(f, "'id' is required and must be a non-empty string"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate and canonicalize a raw payload into a [`VisitorEvent`].
///
/// Pure function: rejects a missing/empty `id`, sanitizes and truncates
/// client strings, clamps out-of-range values, and fills every sub-record so
/// downstream aggregation never sees a gap. `timestamp` and `ip` remain
/// placeholders until the ingest endpoint stamps the authoritative values.
pub fn validate(raw: RawEvent) -> Result<VisitorEvent, ValidationError> {
    let id = raw
        .id
        .as_deref()
        .map(|id| sanitize_string(id, MAX_FIELD_LEN))
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::MissingId)?;

    let location = Location {
        country: sanitize_opt(raw.location.country, MAX_FIELD_LEN),
        region: sanitize_opt(raw.location.region, MAX_FIELD_LEN),
        city: sanitize_opt(raw.location.city, MAX_FIELD_LEN),
        timezone: sanitize_opt(raw.location.timezone, MAX_FIELD_LEN),
        lat: raw.location.lat,
        lon: raw.location.lon,
        isp: sanitize_opt(raw.location.isp, MAX_FIELD_LEN),
        org: sanitize_opt(raw.location.org, MAX_FIELD_LEN),
        asn: sanitize_opt(raw.location.asn, MAX_FIELD_LEN),
    };

    let device = Device {
        device_type: canonical_device_type(&raw.device.device_type),
        os: sanitize_string(&raw.device.os, MAX_FIELD_LEN),
        browser: sanitize_string(&raw.device.browser, MAX_FIELD_LEN),
        screen_resolution: sanitize_string(&raw.device.screen_resolution, MAX_FIELD_LEN),
    };

    let session = Session {
        session_id: sanitize_string(&raw.session.session_id, MAX_FIELD_LEN),
        is_new_session: raw.session.is_new_session,
        duration: raw.session.duration,
        page_views: raw.session.page_views.max(1),
        referrer: sanitize_string(&raw.session.referrer, MAX_URL_LEN),
        entry_page: sanitize_string(&raw.session.entry_page, MAX_URL_LEN),
        exit_page: sanitize_string(&raw.session.exit_page, MAX_URL_LEN),
    };

    let mut engagement = raw.engagement;
    engagement.scroll_depth = if engagement.scroll_depth.is_finite() {
        engagement.scroll_depth.clamp(0.0, 100.0)
    } else {
        0.0
    };

    let technical_data = TechnicalData {
        language: sanitize_string(&raw.technical_data.language, MAX_FIELD_LEN),
        ..raw.technical_data
    };

    Ok(VisitorEvent {
        id,
        timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        ip: None,
        user_agent: sanitize_string(&raw.user_agent, MAX_USER_AGENT_LEN),
        location,
        device,
        session,
        engagement,
        technical_data,
    })
}

/// Canonicalize a device type to `mobile`, `tablet`, or `desktop`.
/// Unknown or absent values become `desktop`.
fn canonical_device_type(raw: &str) -> String {
    match raw.to_ascii_lowercase().as_str() {
        "mobile" => "mobile".to_string(),
        "tablet" => "tablet".to_string(),
        _ => "desktop".to_string(),
    }
}

/// Sanitize a string by truncating to max length and removing control
/// characters.
fn sanitize_string(input: &str, max_len: usize) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .take(max_len)
        .collect()
}

/// Sanitize an optional string; values that end up empty become `None`.
fn sanitize_opt(value: Option<String>, max_len: usize) -> Option<String> {
    value
        .map(|s| sanitize_string(&s, max_len))
        .filter(|s| !s.is_empty())
}
