use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored record per page visit. The wire shape is camelCase because the
/// client tracking library speaks the original JSON dialect.
///
/// `timestamp` and `ip` are authoritative server-side values stamped at
/// ingest; everything else arrives from the client and is canonicalized by
/// the validator so downstream code never sees a missing sub-record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorEvent {
    /// Opaque visitor identifier, stable across a browser's lifetime.
    /// Many events share one id; never empty after validation.
    pub id: String,
    /// Server receipt time.
    pub timestamp: DateTime<Utc>,
    /// Best-effort originating address resolved from proxy headers.
    #[serde(default)]
    pub ip: Option<String>,
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

/// Geographic fields supplied by the client's geo-IP lookup. Trusted as-is;
/// this service performs no verification of its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default, rename = "as")]
    pub asn: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// One of `mobile`, `tablet`, `desktop` after canonicalization.
    #[serde(default, rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub browser: String,
    #[serde(default)]
    pub screen_resolution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub is_new_session: bool,
    /// Session duration in milliseconds.
    #[serde(default)]
    pub duration: u64,
    /// Pages viewed so far in the session; floored at 1 by the validator.
    #[serde(default = "default_page_views")]
    pub page_views: u32,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub entry_page: String,
    #[serde(default)]
    pub exit_page: String,
}

const fn default_page_views() -> u32 {
    1
}

impl Default for Session {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            is_new_session: false,
            duration: 0,
            page_views: 1,
            referrer: String::new(),
            entry_page: String::new(),
            exit_page: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    /// Milliseconds on site.
    #[serde(default)]
    pub time_on_site: u64,
    /// Percentage, clamped to [0, 100] by the validator.
    #[serde(default)]
    pub scroll_depth: f64,
    #[serde(default)]
    pub click_count: u32,
    #[serde(default)]
    pub tab_switches: u32,
    #[serde(default)]
    pub last_active_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalData {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub color_depth: u32,
    #[serde(default)]
    pub pixel_ratio: f64,
    #[serde(default)]
    pub cookies_enabled: bool,
    #[serde(default)]
    pub java_script_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_event() {
        let json = r#"{"id":"v1","timestamp":"2024-06-01T12:00:00Z"}"#;
        let event: VisitorEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, "v1");
        assert!(event.ip.is_none());
        assert_eq!(event.session.page_views, 1);
        assert!(event.engagement.scroll_depth.abs() < f64::EPSILON);
        assert!(event.location.country.is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::json!({
            "id": "v1",
            "timestamp": "2024-06-01T12:00:00Z",
            "userAgent": "Mozilla/5.0",
            "device": {"type": "mobile", "screenResolution": "390x844"},
            "location": {"country": "US", "as": "AS13335"},
            "session": {"sessionId": "s1", "isNewSession": true, "pageViews": 3, "entryPage": "/"},
            "engagement": {"timeOnSite": 1200, "scrollDepth": 55.5, "lastActiveTime": "2024-06-01T12:01:00Z"},
            "technicalData": {"javaScriptEnabled": true, "colorDepth": 24}
        });
        let event: VisitorEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.user_agent, "Mozilla/5.0");
        assert_eq!(event.device.device_type, "mobile");
        assert_eq!(event.device.screen_resolution, "390x844");
        assert_eq!(event.location.asn.as_deref(), Some("AS13335"));
        assert_eq!(event.session.session_id, "s1");
        assert!(event.session.is_new_session);
        assert_eq!(event.session.page_views, 3);
        assert!((event.engagement.scroll_depth - 55.5).abs() < f64::EPSILON);
        assert!(event.engagement.last_active_time.is_some());
        assert!(event.technical_data.java_script_enabled);
        assert_eq!(event.technical_data.color_depth, 24);
    }

    #[test]
    fn test_serialize_round_trip_keeps_camel_case() {
        let event = VisitorEvent {
            id: "v1".to_string(),
            timestamp: Utc::now(),
            ip: Some("1.2.3.4".to_string()),
            user_agent: "UA".to_string(),
            location: Location::default(),
            device: Device::default(),
            session: Session::default(),
            engagement: Engagement::default(),
            technical_data: TechnicalData::default(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("userAgent").is_some());
        assert!(value.get("technicalData").is_some());
        assert!(value["session"].get("pageViews").is_some());
    }
}
