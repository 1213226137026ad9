use crate::event::VisitorEvent;
use chrono::{DateTime, Duration, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const TOP_COUNTRIES: usize = 10;
const TOP_BROWSERS: usize = 5;
/// Horizon for the realtime visitor count, anchored to the wall clock.
pub const REALTIME_WINDOW_MINUTES: i64 = 5;

/// Derived statistics over a query window. Never persisted; recomputed per
/// query from the event scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_visitors: u64,
    pub unique_visitors: u64,
    pub total_sessions: u64,
    /// Mean session duration in milliseconds; 0 for an empty window.
    pub average_session_duration: f64,
    pub average_page_views: f64,
    /// Percentage of sessions with exactly one page view.
    pub bounce_rate: f64,
    pub top_countries: Vec<CountryCount>,
    pub device_types: BTreeMap<String, u64>,
    pub browsers: Vec<BrowserCount>,
    /// 24 buckets indexed by local hour of day.
    pub hourly_visits: [u64; 24],
    /// Distinct visitors active in the last five minutes of wall-clock time,
    /// independent of the requested window.
    pub real_time_visitors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryCount {
    pub country: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserCount {
    pub browser: String,
    pub count: u64,
}

/// Grouped counter preserving first-encountered order for tie-breaking.
#[derive(Default)]
struct GroupCounter {
    index: HashMap<String, usize>,
    entries: Vec<(String, u64)>,
}

impl GroupCounter {
    fn increment(&mut self, key: &str) {
        if key.is_empty() {
            return;
        }
        if let Some(&i) = self.index.get(key) {
            self.entries[i].1 += 1;
        } else {
            self.index.insert(key.to_string(), self.entries.len());
            self.entries.push((key.to_string(), 1));
        }
    }

    /// Top `n` by count descending; stable sort keeps first-seen order for
    /// equal counts.
    fn top_n(mut self, n: usize) -> Vec<(String, u64)> {
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries.truncate(n);
        self.entries
    }
}

/// Compute the derived statistics in a single pass over the window's events.
///
/// `unique_visitors` and `total_sessions` come from the store's distinct
/// counts, and `real_time_visitors` from [`count_active_visitors`] over a
/// wall-clock-recent scan; everything else folds over the scanned sequence.
/// Empty-window averages and bounce rate are 0 by convention, never NaN.
///
/// Read-only: events are consumed as a snapshot, storage is not touched.
#[allow(clippy::cast_precision_loss)]
pub fn compute_stats(
    events: &[VisitorEvent],
    unique_visitors: u64,
    total_sessions: u64,
    real_time_visitors: u64,
) -> AggregateStats {
    // Durations are client-controlled u64s; summing in f64 avoids overflow.
    let mut duration_sum: f64 = 0.0;
    let mut page_views_sum: u64 = 0;
    let mut session_pages: HashMap<&str, u32> = HashMap::new();
    let mut countries = GroupCounter::default();
    let mut browsers = GroupCounter::default();
    let mut device_types: BTreeMap<String, u64> = BTreeMap::new();
    let mut hourly_visits = [0u64; 24];

    for event in events {
        duration_sum += event.session.duration as f64;
        page_views_sum += u64::from(event.session.page_views);

        if !event.session.session_id.is_empty() {
            let pages = session_pages.entry(&event.session.session_id).or_insert(0);
            *pages = (*pages).max(event.session.page_views);
        }

        if let Some(country) = &event.location.country {
            countries.increment(country);
        }
        browsers.increment(&event.device.browser);
        if !event.device.device_type.is_empty() {
            *device_types.entry(event.device.device_type.clone()).or_insert(0) += 1;
        }

        let hour = event.timestamp.with_timezone(&Local).hour() as usize;
        hourly_visits[hour] += 1;
    }

    let total = events.len() as u64;
    let (average_session_duration, average_page_views) = if total == 0 {
        (0.0, 0.0)
    } else {
        (
            duration_sum / total as f64,
            page_views_sum as f64 / total as f64,
        )
    };

    let bounce_rate = if session_pages.is_empty() {
        0.0
    } else {
        let single_page = session_pages.values().filter(|&&pages| pages == 1).count();
        single_page as f64 / session_pages.len() as f64 * 100.0
    };

    AggregateStats {
        total_visitors: total,
        unique_visitors,
        total_sessions,
        average_session_duration,
        average_page_views,
        bounce_rate,
        top_countries: countries
            .top_n(TOP_COUNTRIES)
            .into_iter()
            .map(|(country, count)| CountryCount { country, count })
            .collect(),
        device_types,
        browsers: browsers
            .top_n(TOP_BROWSERS)
            .into_iter()
            .map(|(browser, count)| BrowserCount { browser, count })
            .collect(),
        hourly_visits,
        real_time_visitors,
    }
}

/// Distinct visitors whose reported activity falls inside the realtime
/// horizon. Fed from a scan of the last few minutes, so the count tracks the
/// wall clock regardless of the window a query asked for.
pub fn count_active_visitors(events: &[VisitorEvent], now: DateTime<Utc>) -> u64 {
    let cutoff = now - Duration::minutes(REALTIME_WINDOW_MINUTES);
    let active: HashSet<&str> = events
        .iter()
        .filter(|event| {
            event
                .engagement
                .last_active_time
                .is_some_and(|t| t >= cutoff)
        })
        .map(|event| event.id.as_str())
        .collect();
    active.len() as u64
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::event::{Device, Engagement, Location, Session, TechnicalData};
    use proptest::prelude::*;

    fn event_with(session_id: String, page_views: u32, duration: u64) -> VisitorEvent {
        VisitorEvent {
            id: "v".to_string(),
            timestamp: Utc::now(),
            ip: None,
            user_agent: String::new(),
            location: Location::default(),
            device: Device::default(),
            session: Session {
                session_id,
                duration,
                page_views,
                ..Session::default()
            },
            engagement: Engagement::default(),
            technical_data: TechnicalData::default(),
        }
    }

    proptest! {
        /// Bounce rate stays within [0, 100] and the averages stay finite for
        /// any mix of sessions, durations included at their extremes.
        #[test]
        fn prop_bounce_rate_bounded(
            sessions in proptest::collection::vec(("[a-d]", 1u32..6u32, any::<u64>()), 0..40)
        ) {
            let events: Vec<VisitorEvent> = sessions
                .into_iter()
                .map(|(sid, pages, duration)| event_with(sid, pages, duration))
                .collect();
            let stats = compute_stats(&events, 0, 0, 0);
            prop_assert!(stats.bounce_rate >= 0.0);
            prop_assert!(stats.bounce_rate <= 100.0);
            prop_assert!(stats.average_session_duration >= 0.0);
            prop_assert!(stats.average_session_duration.is_finite());
            prop_assert!(stats.average_page_views >= 0.0);
            prop_assert_eq!(stats.hourly_visits.iter().sum::<u64>(), stats.total_visitors);
        }
    }
}
