use crate::event::{Device, Engagement, Location, Session, TechnicalData, VisitorEvent};
use crate::storage::{DistinctField, EventStore, StorageError};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use duckdb::types::Type;
use duckdb::Connection;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// SQL statement to create the events table. One wide row per visitor event,
/// sub-records flattened into columns.
const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS events (
    id                  VARCHAR NOT NULL,
    timestamp           TIMESTAMP NOT NULL,
    ip                  VARCHAR,
    user_agent          VARCHAR NOT NULL,
    country             VARCHAR,
    region              VARCHAR,
    city                VARCHAR,
    timezone            VARCHAR,
    lat                 DOUBLE,
    lon                 DOUBLE,
    isp                 VARCHAR,
    org                 VARCHAR,
    asn                 VARCHAR,
    device_type         VARCHAR NOT NULL,
    os                  VARCHAR NOT NULL,
    browser             VARCHAR NOT NULL,
    screen_resolution   VARCHAR NOT NULL,
    session_id          VARCHAR NOT NULL,
    is_new_session      BOOLEAN NOT NULL,
    session_duration_ms BIGINT NOT NULL,
    page_views          INTEGER NOT NULL,
    referrer            VARCHAR NOT NULL,
    entry_page          VARCHAR NOT NULL,
    exit_page           VARCHAR NOT NULL,
    time_on_site_ms     BIGINT NOT NULL,
    scroll_depth        DOUBLE NOT NULL,
    click_count         INTEGER NOT NULL,
    tab_switches        INTEGER NOT NULL,
    last_active_time    TIMESTAMP,
    language            VARCHAR NOT NULL,
    color_depth         INTEGER NOT NULL,
    pixel_ratio         DOUBLE NOT NULL,
    cookies_enabled     BOOLEAN NOT NULL,
    javascript_enabled  BOOLEAN NOT NULL
)
";

/// Column list shared by the scan queries; must stay in step with
/// `row_to_event`. Timestamps are cast to VARCHAR so the row mapper does not
/// depend on driver-side timestamp conversions.
const SELECT_COLUMNS: &str = "\
    id, CAST(timestamp AS VARCHAR), ip, user_agent, \
    country, region, city, timezone, lat, lon, isp, org, asn, \
    device_type, os, browser, screen_resolution, \
    session_id, is_new_session, session_duration_ms, page_views, \
    referrer, entry_page, exit_page, \
    time_on_site_ms, scroll_depth, click_count, tab_switches, \
    CAST(last_active_time AS VARCHAR), \
    language, color_depth, pixel_ratio, cookies_enabled, javascript_enabled";

/// Embedded DuckDB event store.
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Open a file-backed store, or an in-process one for the special path
    /// `:memory:`. Runs schema creation.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-process store for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open(Path::new(":memory:"))
    }
}

/// Initialize the database schema. Idempotent.
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(CREATE_EVENTS_TABLE)?;
    Ok(())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parse the VARCHAR form DuckDB produces for a TIMESTAMP. The fractional
/// part is omitted when zero, so `%.f` is used to match it optionally.
fn parse_ts(s: &str, idx: usize) -> Result<DateTime<Utc>, duckdb::Error> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn row_to_event(row: &duckdb::Row<'_>) -> Result<VisitorEvent, duckdb::Error> {
    let timestamp = parse_ts(&row.get::<_, String>(1)?, 1)?;
    let last_active_time = row
        .get::<_, Option<String>>(28)?
        .map(|s| parse_ts(&s, 28))
        .transpose()?;

    Ok(VisitorEvent {
        id: row.get(0)?,
        timestamp,
        ip: row.get(2)?,
        user_agent: row.get(3)?,
        location: Location {
            country: row.get(4)?,
            region: row.get(5)?,
            city: row.get(6)?,
            timezone: row.get(7)?,
            lat: row.get(8)?,
            lon: row.get(9)?,
            isp: row.get(10)?,
            org: row.get(11)?,
            asn: row.get(12)?,
        },
        device: Device {
            device_type: row.get(13)?,
            os: row.get(14)?,
            browser: row.get(15)?,
            screen_resolution: row.get(16)?,
        },
        session: Session {
            session_id: row.get(17)?,
            is_new_session: row.get(18)?,
            duration: row.get::<_, i64>(19)?.max(0) as u64,
            page_views: row.get::<_, i32>(20)?.max(1) as u32,
            referrer: row.get(21)?,
            entry_page: row.get(22)?,
            exit_page: row.get(23)?,
        },
        engagement: Engagement {
            time_on_site: row.get::<_, i64>(24)?.max(0) as u64,
            scroll_depth: row.get(25)?,
            click_count: row.get::<_, i32>(26)?.max(0) as u32,
            tab_switches: row.get::<_, i32>(27)?.max(0) as u32,
            last_active_time,
        },
        technical_data: TechnicalData {
            language: row.get(29)?,
            color_depth: row.get::<_, i32>(30)?.max(0) as u32,
            pixel_ratio: row.get(31)?,
            cookies_enabled: row.get(32)?,
            java_script_enabled: row.get(33)?,
        },
    })
}

impl EventStore for DuckDbStore {
    fn insert(&self, event: &VisitorEvent) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO events (
                id, timestamp, ip, user_agent,
                country, region, city, timezone, lat, lon, isp, org, asn,
                device_type, os, browser, screen_resolution,
                session_id, is_new_session, session_duration_ms, page_views,
                referrer, entry_page, exit_page,
                time_on_site_ms, scroll_depth, click_count, tab_switches, last_active_time,
                language, color_depth, pixel_ratio, cookies_enabled, javascript_enabled
            ) VALUES (?, CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                      ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?)",
            duckdb::params![
                event.id,
                format_ts(event.timestamp),
                event.ip,
                event.user_agent,
                event.location.country,
                event.location.region,
                event.location.city,
                event.location.timezone,
                event.location.lat,
                event.location.lon,
                event.location.isp,
                event.location.org,
                event.location.asn,
                event.device.device_type,
                event.device.os,
                event.device.browser,
                event.device.screen_resolution,
                event.session.session_id,
                event.session.is_new_session,
                i64::try_from(event.session.duration).unwrap_or(i64::MAX),
                i32::try_from(event.session.page_views).unwrap_or(i32::MAX),
                event.session.referrer,
                event.session.entry_page,
                event.session.exit_page,
                i64::try_from(event.engagement.time_on_site).unwrap_or(i64::MAX),
                event.engagement.scroll_depth,
                i32::try_from(event.engagement.click_count).unwrap_or(i32::MAX),
                i32::try_from(event.engagement.tab_switches).unwrap_or(i32::MAX),
                event.engagement.last_active_time.map(format_ts),
                event.technical_data.language,
                i32::try_from(event.technical_data.color_depth).unwrap_or(i32::MAX),
                event.technical_data.pixel_ratio,
                event.technical_data.cookies_enabled,
                event.technical_data.java_script_enabled,
            ],
        )?;
        Ok(())
    }

    fn scan_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<VisitorEvent>, StorageError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM events
             WHERE timestamp >= CAST(? AS TIMESTAMP) AND timestamp <= CAST(? AS TIMESTAMP)"
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(
                duckdb::params![format_ts(from), format_ts(to)],
                row_to_event,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn recent(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<VisitorEvent>, StorageError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM events
             WHERE timestamp >= CAST(? AS TIMESTAMP) AND timestamp <= CAST(? AS TIMESTAMP)
             ORDER BY timestamp DESC LIMIT ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(
                duckdb::params![
                    format_ts(from),
                    format_ts(to),
                    i64::try_from(limit).unwrap_or(i64::MAX)
                ],
                row_to_event,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn count_distinct(
        &self,
        field: DistinctField,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let column = match field {
            DistinctField::VisitorId => "id",
            DistinctField::SessionId => "session_id",
        };
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT COUNT(DISTINCT NULLIF({column}, '')) FROM events
             WHERE timestamp >= CAST(? AS TIMESTAMP) AND timestamp <= CAST(? AS TIMESTAMP)"
        );
        let mut stmt = conn.prepare(&sql)?;
        let count: i64 = stmt.query_row(
            duckdb::params![format_ts(from), format_ts(to)],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM events WHERE timestamp < CAST(? AS TIMESTAMP)",
            duckdb::params![format_ts(cutoff)],
        )?;
        Ok(deleted as u64)
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs_offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs_offset)
    }

    fn make_event(id: &str, session_id: &str, timestamp: DateTime<Utc>) -> VisitorEvent {
        VisitorEvent {
            id: id.to_string(),
            timestamp,
            ip: Some("203.0.113.7".to_string()),
            user_agent: "Mozilla/5.0".to_string(),
            location: Location {
                country: Some("US".to_string()),
                ..Location::default()
            },
            device: Device {
                device_type: "desktop".to_string(),
                browser: "Firefox".to_string(),
                ..Device::default()
            },
            session: Session {
                session_id: session_id.to_string(),
                duration: 30_000,
                page_views: 2,
                ..Session::default()
            },
            engagement: Engagement {
                scroll_depth: 80.0,
                last_active_time: Some(timestamp),
                ..Engagement::default()
            },
            technical_data: TechnicalData::default(),
        }
    }

    #[test]
    fn test_schema_idempotent() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let conn = store.conn.lock();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn test_insert_and_scan_round_trip() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let event = make_event("v1", "s1", ts(0));
        store.insert(&event).unwrap();

        let scanned = store.scan_range(ts(-10), ts(10)).unwrap();
        assert_eq!(scanned.len(), 1);
        let got = &scanned[0];
        assert_eq!(got.id, "v1");
        assert_eq!(got.timestamp, event.timestamp);
        assert_eq!(got.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(got.location.country.as_deref(), Some("US"));
        assert_eq!(got.device.browser, "Firefox");
        assert_eq!(got.session.session_id, "s1");
        assert_eq!(got.session.duration, 30_000);
        assert_eq!(got.session.page_views, 2);
        assert!((got.engagement.scroll_depth - 80.0).abs() < f64::EPSILON);
        assert_eq!(got.engagement.last_active_time, Some(event.timestamp));
    }

    #[test]
    fn test_scan_range_is_inclusive() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.insert(&make_event("v1", "s1", ts(0))).unwrap();
        store.insert(&make_event("v2", "s2", ts(60))).unwrap();
        store.insert(&make_event("v3", "s3", ts(120))).unwrap();

        let scanned = store.scan_range(ts(0), ts(60)).unwrap();
        assert_eq!(scanned.len(), 2);
    }

    #[test]
    fn test_scan_empty_range() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.insert(&make_event("v1", "s1", ts(0))).unwrap();
        let scanned = store.scan_range(ts(1000), ts(2000)).unwrap();
        assert!(scanned.is_empty());
    }

    #[test]
    fn test_recent_newest_first_with_limit() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.insert(&make_event("v1", "s1", ts(0))).unwrap();
        store.insert(&make_event("v2", "s2", ts(60))).unwrap();
        store.insert(&make_event("v3", "s3", ts(120))).unwrap();

        let recent = store.recent(ts(-10), ts(200), 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "v3");
        assert_eq!(recent[1].id, "v2");
    }

    #[test]
    fn test_count_distinct_visitors() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.insert(&make_event("v1", "s1", ts(0))).unwrap();
        store.insert(&make_event("v1", "s2", ts(10))).unwrap();
        store.insert(&make_event("v2", "s3", ts(20))).unwrap();

        let visitors = store
            .count_distinct(DistinctField::VisitorId, ts(-10), ts(100))
            .unwrap();
        assert_eq!(visitors, 2);
        let sessions = store
            .count_distinct(DistinctField::SessionId, ts(-10), ts(100))
            .unwrap();
        assert_eq!(sessions, 3);
    }

    #[test]
    fn test_count_distinct_skips_empty_session_ids() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.insert(&make_event("v1", "", ts(0))).unwrap();
        store.insert(&make_event("v2", "s1", ts(10))).unwrap();

        let sessions = store
            .count_distinct(DistinctField::SessionId, ts(-10), ts(100))
            .unwrap();
        assert_eq!(sessions, 1);
    }

    #[test]
    fn test_delete_before() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.insert(&make_event("v1", "s1", ts(0))).unwrap();
        store.insert(&make_event("v2", "s2", ts(1000))).unwrap();

        let deleted = store.delete_before(ts(500)).unwrap();
        assert_eq!(deleted, 1);
        let remaining = store.scan_range(ts(-10), ts(2000)).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "v2");
    }

    #[test]
    fn test_nullable_fields_round_trip() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let mut event = make_event("v1", "s1", ts(0));
        event.ip = None;
        event.location = Location::default();
        event.engagement.last_active_time = None;
        store.insert(&event).unwrap();

        let scanned = store.scan_range(ts(-10), ts(10)).unwrap();
        assert!(scanned[0].ip.is_none());
        assert!(scanned[0].location.country.is_none());
        assert!(scanned[0].engagement.last_active_time.is_none());
    }
}
