use chrono::{DateTime, Duration, Utc};

/// Named query window, resolved against "now" at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Hour,
    Day,
    Week,
    Month,
}

impl TimeRange {
    /// Parse a named range token. Unknown tokens are an error for the
    /// caller to surface, never a silent default.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "1h" => Some(Self::Hour),
            "24h" => Some(Self::Day),
            "7d" => Some(Self::Week),
            "30d" => Some(Self::Month),
            _ => None,
        }
    }

    fn duration(self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::hours(24),
            Self::Week => Duration::days(7),
            Self::Month => Duration::days(30),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum WindowError {
    UnknownRange(String),
    BadDate(String),
    /// `startDate` given without `endDate` or vice versa.
    HalfOpenPair,
}

impl std::fmt::Display for WindowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownRange(token) => {
                write!(f, "unknown timeRange '{token}', expected one of 1h, 24h, 7d, 30d")
            }
            Self::BadDate(raw) => write!(f, "'{raw}' is not an RFC-3339 date-time"),
            Self::HalfOpenPair => {
                write!(f, "startDate and endDate must be provided together")
            }
        }
    }
}

impl std::error::Error for WindowError {}

/// Resolve a query window from either an explicit `[startDate, endDate]`
/// pair or a named range converted to `[now - duration, now]`.
pub fn resolve_window(
    time_range: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), WindowError> {
    match (start_date, end_date) {
        (Some(start), Some(end)) => Ok((parse_date(start)?, parse_date(end)?)),
        (Some(_), None) | (None, Some(_)) => Err(WindowError::HalfOpenPair),
        (None, None) => {
            let token = time_range.unwrap_or("24h");
            let range = TimeRange::from_token(token)
                .ok_or_else(|| WindowError::UnknownRange(token.to_string()))?;
            Ok((now - range.duration(), now))
        }
    }
}

pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, WindowError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| WindowError::BadDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_named_ranges() {
        let (from, to) = resolve_window(Some("1h"), None, None, now()).unwrap();
        assert_eq!(to, now());
        assert_eq!(now() - from, Duration::hours(1));

        let (from, _) = resolve_window(Some("24h"), None, None, now()).unwrap();
        assert_eq!(now() - from, Duration::hours(24));

        let (from, _) = resolve_window(Some("7d"), None, None, now()).unwrap();
        assert_eq!(now() - from, Duration::days(7));

        let (from, _) = resolve_window(Some("30d"), None, None, now()).unwrap();
        assert_eq!(now() - from, Duration::days(30));
    }

    #[test]
    fn test_default_is_24h() {
        let (from, to) = resolve_window(None, None, None, now()).unwrap();
        assert_eq!(to - from, Duration::hours(24));
    }

    #[test]
    fn test_unknown_range_is_an_error() {
        let err = resolve_window(Some("90d"), None, None, now()).unwrap_err();
        assert_eq!(err, WindowError::UnknownRange("90d".to_string()));
    }

    #[test]
    fn test_explicit_dates_override_range() {
        let (from, to) = resolve_window(
            Some("1h"),
            Some("2024-05-01T00:00:00Z"),
            Some("2024-05-02T00:00:00Z"),
            now(),
        )
        .unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_half_open_pair_rejected() {
        let err = resolve_window(None, Some("2024-05-01T00:00:00Z"), None, now()).unwrap_err();
        assert_eq!(err, WindowError::HalfOpenPair);
    }

    #[test]
    fn test_bad_date_rejected() {
        let err =
            resolve_window(None, Some("yesterday"), Some("2024-05-02T00:00:00Z"), now())
                .unwrap_err();
        assert!(matches!(err, WindowError::BadDate(_)));
    }

    #[test]
    fn test_offset_dates_normalized_to_utc() {
        let parsed = parse_date("2024-05-01T02:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    }
}
