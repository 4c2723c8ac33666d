use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ping::LocationPing;

/// Fields supplied by the caller; id, sequence and `recorded_at` are stamped here.
#[derive(Debug, Clone)]
pub struct PingRecord {
    pub collection_id: Option<Uuid>,
    pub agent_id: Uuid,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub battery_level: Option<f64>,
    pub stop: bool,
    pub ts: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

/// Append-only location samples, partitioned by agent.
pub struct PingStore {
    by_agent: DashMap<Uuid, Vec<LocationPing>>,
    next_sequence: AtomicU64,
}

impl PingStore {
    pub fn new() -> Self {
        Self {
            by_agent: DashMap::new(),
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn append(&self, record: PingRecord) -> LocationPing {
        let recorded_at = Utc::now();
        let ping = LocationPing {
            id: Uuid::new_v4(),
            collection_id: record.collection_id,
            agent_id: record.agent_id,
            lat: record.lat,
            lng: record.lng,
            battery_level: record.battery_level,
            stop: record.stop,
            ts: record.ts.unwrap_or(recorded_at),
            recorded_at,
            raw: record.raw,
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        };

        self.by_agent
            .entry(ping.agent_id)
            .or_default()
            .push(ping.clone());

        ping
    }

    /// Latest ping per requested agent by server arrival; every id gets an entry.
    pub fn latest_by_agents(&self, agent_ids: &[Uuid]) -> HashMap<Uuid, Option<LocationPing>> {
        agent_ids
            .iter()
            .map(|agent_id| {
                let latest = self.by_agent.get(agent_id).and_then(|pings| {
                    pings
                        .iter()
                        .max_by_key(|ping| (ping.recorded_at, ping.sequence))
                        .cloned()
                });
                (*agent_id, latest)
            })
            .collect()
    }

    /// Stop pings whose client timestamp falls on `date` in `offset` local time.
    pub fn stops_count(
        &self,
        agent_id: Uuid,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> Result<usize, AppError> {
        let (start, end) = day_bounds(date, offset)?;

        let count = self
            .by_agent
            .get(&agent_id)
            .map(|pings| {
                pings
                    .iter()
                    .filter(|ping| ping.stop && ping.ts >= start && ping.ts <= end)
                    .count()
            })
            .unwrap_or(0);

        Ok(count)
    }

    /// Pings tagged with the collection, in arrival order.
    pub fn for_collection(&self, collection_id: Uuid) -> Vec<LocationPing> {
        let mut pings: Vec<LocationPing> = self
            .by_agent
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|ping| ping.collection_id == Some(collection_id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        pings.sort_by_key(|ping| (ping.recorded_at, ping.sequence));
        pings
    }

    pub fn len(&self) -> usize {
        self.by_agent.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PingStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Inclusive `[00:00:00.000, 23:59:59.999]` of `date` in `offset`, as UTC instants.
/// Fails with a validation error when the window falls outside the representable range.
pub fn day_bounds(
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
    let out_of_range = || AppError::Validation(format!("date out of range: {date}"));

    let start = date
        .and_time(NaiveTime::MIN)
        .checked_sub_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))
        .ok_or_else(out_of_range)?
        .and_utc();
    let end = start
        .checked_add_signed(TimeDelta::days(1) - TimeDelta::milliseconds(1))
        .ok_or_else(out_of_range)?;

    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use chrono::{Offset, TimeZone};

    use super::*;

    fn record(agent_id: Uuid, stop: bool, ts: Option<DateTime<Utc>>) -> PingRecord {
        PingRecord {
            collection_id: None,
            agent_id,
            lat: Some(13.0),
            lng: Some(80.2),
            battery_level: Some(87.0),
            stop,
            ts,
            raw: serde_json::Value::Null,
        }
    }

    fn utc_ms(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap() + TimeDelta::milliseconds(ms as i64)
    }

    #[test]
    fn latest_by_agents_reports_null_for_silent_agents() {
        let store = PingStore::new();
        let a1 = Uuid::new_v4();
        let a2 = Uuid::new_v4();

        store.append(record(a1, false, None));
        let second = store.append(record(a1, false, None));

        let latest = store.latest_by_agents(&[a1, a2]);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&a1].as_ref().unwrap().id, second.id);
        assert!(latest[&a2].is_none());
    }

    #[test]
    fn latest_ignores_out_of_order_client_timestamps() {
        let store = PingStore::new();
        let agent = Uuid::new_v4();

        store.append(record(agent, false, Some(utc_ms(2024, 5, 1, 12, 0, 0, 0))));
        let buffered = store.append(record(agent, false, Some(utc_ms(2024, 5, 1, 9, 0, 0, 0))));

        let latest = store.latest_by_agents(&[agent]);
        assert_eq!(latest[&agent].as_ref().unwrap().id, buffered.id);
    }

    #[test]
    fn stops_count_window_is_inclusive_to_the_millisecond() {
        let store = PingStore::new();
        let agent = Uuid::new_v4();
        let utc = Utc.fix();

        store.append(record(agent, true, Some(utc_ms(2024, 5, 1, 0, 0, 0, 0))));
        store.append(record(agent, true, Some(utc_ms(2024, 5, 1, 23, 59, 59, 999))));
        store.append(record(agent, true, Some(utc_ms(2024, 5, 2, 0, 0, 0, 0))));
        store.append(record(agent, true, Some(utc_ms(2024, 4, 30, 23, 59, 59, 999))));
        store.append(record(agent, false, Some(utc_ms(2024, 5, 1, 10, 0, 0, 0))));

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(store.stops_count(agent, date, utc).unwrap(), 2);
    }

    #[test]
    fn stops_count_respects_server_offset() {
        let store = PingStore::new();
        let agent = Uuid::new_v4();
        let ist = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();

        // 2024-05-01 00:30 IST is still 2024-04-30 in UTC.
        store.append(record(agent, true, Some(utc_ms(2024, 4, 30, 19, 0, 0, 0))));

        let may_first = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(store.stops_count(agent, may_first, ist).unwrap(), 1);
        assert_eq!(store.stops_count(agent, may_first, Utc.fix()).unwrap(), 0);
    }

    #[test]
    fn day_bounds_span_one_day_minus_a_millisecond() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let (start, end) = day_bounds(date, Utc.fix()).unwrap();
        assert_eq!(start, utc_ms(2024, 5, 1, 0, 0, 0, 0));
        assert_eq!(end, utc_ms(2024, 5, 1, 23, 59, 59, 999));
    }

    #[test]
    fn day_bounds_outside_chrono_range_is_a_validation_error() {
        let west = FixedOffset::west_opt(5 * 3600).unwrap();
        let east = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();

        assert!(matches!(
            day_bounds(NaiveDate::MAX, west),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            day_bounds(NaiveDate::MIN, east),
            Err(AppError::Validation(_))
        ));

        let store = PingStore::new();
        assert!(store.stops_count(Uuid::new_v4(), NaiveDate::MAX, west).is_err());
    }

    #[test]
    fn for_collection_filters_and_orders_by_arrival() {
        let store = PingStore::new();
        let collection = Uuid::new_v4();
        let agent = Uuid::new_v4();

        let mut tagged = record(agent, false, None);
        tagged.collection_id = Some(collection);
        let first = store.append(tagged.clone());
        store.append(record(agent, false, None));
        let second = store.append(tagged);

        let trace = store.for_collection(collection);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].id, first.id);
        assert_eq!(trace[1].id, second.id);
        assert_eq!(store.len(), 3);
    }
}
