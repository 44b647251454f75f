use crate::{TimeLine, TimeStamp};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Timestamp-indexed table of named profiles.
///
/// Construction via [`TimeSeriesTable::try_new`] guarantees an ascending,
/// gap-free index of uniform frequency and equal column lengths. The timestep
/// resolver builds its outputs through [`TimeSeriesTable::from_parts`] which
/// only checks the lengths, as resampled indices are not necessarily uniform.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TimeSeriesTable {
    time_stamps: TimeLine,
    columns: IndexMap<String, Vec<f64>>,
}

impl TimeSeriesTable {
    pub fn try_new(
        time_stamps: TimeLine,
        columns: IndexMap<String, Vec<f64>>,
    ) -> Result<Self, String> {
        if time_stamps.is_empty() {
            return Err("time series should have at least one time step".to_string());
        }
        if time_stamps.len() > 1 {
            let step = time_stamps[1] - time_stamps[0];
            if step <= TimeDelta::zero() {
                return Err("time stamps should be strictly ascending".to_string());
            }
            for window in time_stamps.windows(2) {
                let delta = window[1] - window[0];
                if delta <= TimeDelta::zero() {
                    return Err("time stamps should be strictly ascending".to_string());
                }
                if delta != step {
                    return Err(format!(
                        "non-uniform time step between {} and {}",
                        window[0], window[1]
                    ));
                }
            }
        }
        Self::from_parts(time_stamps, columns)
    }

    pub fn from_parts(
        time_stamps: TimeLine,
        columns: IndexMap<String, Vec<f64>>,
    ) -> Result<Self, String> {
        for (name, values) in &columns {
            if values.len() != time_stamps.len() {
                return Err(format!(
                    "column '{}' has {} values for {} time steps",
                    name,
                    values.len(),
                    time_stamps.len()
                ));
            }
        }
        Ok(TimeSeriesTable {
            time_stamps,
            columns,
        })
    }

    pub fn time_stamps(&self) -> &TimeLine {
        &self.time_stamps
    }

    pub fn len(&self) -> usize {
        self.time_stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_stamps.is_empty()
    }

    pub fn step(&self) -> Option<TimeDelta> {
        if self.time_stamps.len() < 2 {
            return None;
        }
        Some(self.time_stamps[1] - self.time_stamps[0])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Vec<f64>> {
        self.columns.get(name)
    }

    pub fn columns(&self) -> &IndexMap<String, Vec<f64>> {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }
}

/// Parses spreadsheet-style time stamps; the common formats are tried in
/// order, a bare date resolving to midnight.
pub fn parse_time_stamp(text: &str) -> Result<TimeStamp, String> {
    let trimmed = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(stamp);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).expect("midnight should exist"));
    }
    Err(format!("invalid time stamp '{}'", trimmed))
}

/// Builds an hourly time line of the given length; handy in tests and when a
/// workbook defines its index by start and period count only.
pub fn hourly_time_line(start: TimeStamp, periods: usize) -> TimeLine {
    let mut stamps = Vec::with_capacity(periods);
    for i in 0..periods {
        stamps.push(start + TimeDelta::hours(i as i64));
    }
    stamps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> TimeStamp {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .expect("date should be valid")
            .and_hms_opt(0, 0, 0)
            .expect("midnight should exist")
    }

    #[test]
    fn constructs_uniform_table() {
        let stamps = hourly_time_line(start(), 4);
        let mut columns = IndexMap::new();
        columns.insert("pv_profile".to_string(), vec![0.0, 0.2, 0.5, 0.3]);
        let table = TimeSeriesTable::try_new(stamps, columns)
            .expect("constructing uniform table should succeed");
        assert_eq!(table.len(), 4);
        assert_eq!(table.step(), Some(TimeDelta::hours(1)));
        assert!(table.has_column("pv_profile"));
        assert!(!table.has_column("load_profile"));
    }

    #[test]
    fn rejects_mismatched_column_length() {
        let stamps = hourly_time_line(start(), 3);
        let mut columns = IndexMap::new();
        columns.insert("load".to_string(), vec![1.0, 2.0]);
        match TimeSeriesTable::try_new(stamps, columns) {
            Err(message) => assert!(message.contains("2 values for 3 time steps")),
            Ok(..) => panic!("validation should have failed"),
        }
    }

    #[test]
    fn rejects_non_uniform_index() {
        let mut stamps = hourly_time_line(start(), 3);
        stamps.push(*stamps.last().unwrap() + TimeDelta::minutes(30));
        match TimeSeriesTable::try_new(stamps, IndexMap::new()) {
            Err(message) => assert!(message.contains("non-uniform")),
            Ok(..) => panic!("validation should have failed"),
        }
    }

    #[test]
    fn rejects_descending_index() {
        let stamps = vec![start() + TimeDelta::hours(1), start()];
        match TimeSeriesTable::try_new(stamps, IndexMap::new()) {
            Err(message) => assert!(message.contains("ascending")),
            Ok(..) => panic!("validation should have failed"),
        }
    }

    #[test]
    fn rejects_empty_index() {
        assert!(TimeSeriesTable::try_new(Vec::new(), IndexMap::new()).is_err());
    }

    #[test]
    fn parses_common_time_stamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 31)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        assert_eq!(
            parse_time_stamp("2025-01-31 23:00").expect("parsing should succeed"),
            expected
        );
        assert_eq!(
            parse_time_stamp("2025-01-31 23:00:00").expect("parsing should succeed"),
            expected
        );
        assert_eq!(
            parse_time_stamp("2025-01-31").expect("parsing should succeed"),
            NaiveDate::from_ymd_opt(2025, 1, 31)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert!(parse_time_stamp("31.01.2025").is_err());
    }
}
