use crate::errors::TimestepError;
use crate::time_series::{parse_time_stamp, TimeSeriesTable};
use crate::TimeLine;
use crate::TimeStamp;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// The closed set of timestep reduction strategies. Selection is static per
/// run; dispatch happens once, inside [`resolve`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Strategy {
    Full,
    TimeRange { start: TimeStamp, end: TimeStamp },
    Averaging { hours: i64 },
    Sampling { n: f64 },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match *self {
            Strategy::Full => "full",
            Strategy::TimeRange { .. } => "time_range",
            Strategy::Averaging { .. } => "averaging",
            Strategy::Sampling { .. } => "sampling_24n",
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TimestepConfig {
    pub enabled: bool,
    pub strategy: Strategy,
}

impl Default for TimestepConfig {
    fn default() -> Self {
        TimestepConfig {
            enabled: false,
            strategy: Strategy::Full,
        }
    }
}

fn parse_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

impl TimestepConfig {
    /// Builds a configuration from the flat parameter/value rows of the
    /// `timestep_settings` sheet. Recognized parameter names are `enabled`,
    /// `timestep_strategy`, `hours`, `start_date`, `end_date` and `n`.
    pub fn from_parameters(parameters: &[(String, String)]) -> Result<Self, TimestepError> {
        let get = |name: &str| {
            parameters
                .iter()
                .find(|(parameter, _)| parameter == name)
                .map(|(_, value)| value.trim())
        };
        let enabled = get("enabled").map(parse_enabled).unwrap_or(false);
        // A disabled configuration always resolves as full, so its strategy
        // parameters are not validated at all.
        if !enabled {
            return Ok(TimestepConfig::default());
        }
        let strategy_name = get("timestep_strategy").unwrap_or("full");
        let strategy = match strategy_name {
            "full" => Strategy::Full,
            "time_range" => {
                let start = get("start_date")
                    .ok_or(TimestepError::MissingParameter("start_date"))?;
                let end = get("end_date").ok_or(TimestepError::MissingParameter("end_date"))?;
                Strategy::TimeRange {
                    start: parse_time_stamp(start).map_err(|_| {
                        TimestepError::InvalidParameter {
                            name: "start_date",
                            value: start.to_string(),
                        }
                    })?,
                    end: parse_time_stamp(end).map_err(|_| TimestepError::InvalidParameter {
                        name: "end_date",
                        value: end.to_string(),
                    })?,
                }
            }
            "averaging" => {
                let hours = get("hours").ok_or(TimestepError::MissingParameter("hours"))?;
                Strategy::Averaging {
                    hours: hours
                        .parse()
                        .map_err(|_| TimestepError::InvalidParameter {
                            name: "hours",
                            value: hours.to_string(),
                        })?,
                }
            }
            "sampling_24n" => {
                let n = get("n").ok_or(TimestepError::MissingParameter("n"))?;
                Strategy::Sampling {
                    n: n.parse().map_err(|_| TimestepError::InvalidParameter {
                        name: "n",
                        value: n.to_string(),
                    })?,
                }
            }
            other => return Err(TimestepError::UnknownStrategy(other.to_string())),
        };
        Ok(TimestepConfig { enabled, strategy })
    }
}

/// How much the resolution pass shrank the time line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReductionStats {
    pub strategy: &'static str,
    pub original_rows: usize,
    pub final_rows: usize,
    pub reduction_factor: f64,
}

impl ReductionStats {
    fn new(strategy: &'static str, original_rows: usize, final_rows: usize) -> Self {
        ReductionStats {
            strategy,
            original_rows,
            final_rows,
            reduction_factor: if original_rows == 0 {
                1.0
            } else {
                final_rows as f64 / original_rows as f64
            },
        }
    }
}

/// The reduced time line with every column resampled against it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedTimeseries {
    pub table: TimeSeriesTable,
    pub stats: ReductionStats,
}

fn take_rows(table: &TimeSeriesTable, indices: &[usize]) -> TimeSeriesTable {
    let time_stamps: TimeLine = indices
        .iter()
        .map(|&i| table.time_stamps()[i])
        .collect();
    let columns: IndexMap<String, Vec<f64>> = table
        .columns()
        .iter()
        .map(|(name, values)| {
            (
                name.clone(),
                indices.iter().map(|&i| values[i]).collect(),
            )
        })
        .collect();
    TimeSeriesTable::from_parts(time_stamps, columns)
        .expect("selected columns should match the reduced index")
}

fn resolve_time_range(
    table: &TimeSeriesTable,
    start: TimeStamp,
    end: TimeStamp,
) -> Result<TimeSeriesTable, TimestepError> {
    if end < start {
        return Err(TimestepError::InvalidRange { start, end });
    }
    let indices: Vec<usize> = table
        .time_stamps()
        .iter()
        .enumerate()
        .filter(|(_, stamp)| start <= **stamp && **stamp <= end)
        .map(|(i, _)| i)
        .collect();
    if indices.is_empty() {
        return Err(TimestepError::EmptyRange { start, end });
    }
    Ok(take_rows(table, &indices))
}

/// Replaces each block of `hours` consecutive rows with a single row carrying
/// the block's first timestamp and per-column arithmetic means. The trailing
/// partial block is averaged over however many rows remain, never dropped.
fn resolve_averaging(
    table: &TimeSeriesTable,
    hours: i64,
) -> Result<TimeSeriesTable, TimestepError> {
    if hours <= 0 {
        return Err(TimestepError::InvalidHours(hours));
    }
    let block = hours as usize;
    let row_count = table.len();
    let mut time_stamps: TimeLine = Vec::new();
    for block_start in (0..row_count).step_by(block) {
        time_stamps.push(table.time_stamps()[block_start]);
    }
    let columns: IndexMap<String, Vec<f64>> = table
        .columns()
        .iter()
        .map(|(name, values)| {
            let averaged: Vec<f64> = values
                .chunks(block)
                .map(|chunk| chunk.iter().sum::<f64>() / chunk.len() as f64)
                .collect();
            (name.clone(), averaged)
        })
        .collect();
    Ok(TimeSeriesTable::from_parts(time_stamps, columns)
        .expect("averaged columns should match the reduced index"))
}

/// Keeps one row per `24 * n` rows starting at the first timestamp. With an
/// hourly index, `n=1` keeps one row per day and `n=0.5` one row every twelve
/// hours. Fractional strides accumulate and round to the nearest row.
fn resolve_sampling(table: &TimeSeriesTable, n: f64) -> Result<TimeSeriesTable, TimestepError> {
    if n <= 0.0 {
        return Err(TimestepError::InvalidFactor(n));
    }
    let stride = 24.0 * n;
    let row_count = table.len();
    let mut indices = Vec::new();
    let mut step = 0usize;
    loop {
        let index = (step as f64 * stride).round() as usize;
        if index >= row_count {
            break;
        }
        if indices.last() != Some(&index) {
            indices.push(index);
        }
        step += 1;
    }
    Ok(take_rows(table, &indices))
}

/// Applies the configured strategy to the time series, returning the reduced
/// index with all columns resampled consistently. When `enabled` is false the
/// input passes through unchanged regardless of the configured strategy.
pub fn resolve(
    table: &TimeSeriesTable,
    config: &TimestepConfig,
) -> Result<ResolvedTimeseries, TimestepError> {
    let original_rows = table.len();
    let (resolved, strategy_name) = if !config.enabled {
        (table.clone(), Strategy::Full.name())
    } else {
        match config.strategy {
            Strategy::Full => (table.clone(), Strategy::Full.name()),
            Strategy::TimeRange { start, end } => (
                resolve_time_range(table, start, end)?,
                config.strategy.name(),
            ),
            Strategy::Averaging { hours } => {
                (resolve_averaging(table, hours)?, config.strategy.name())
            }
            Strategy::Sampling { n } => (resolve_sampling(table, n)?, config.strategy.name()),
        }
    };
    let stats = ReductionStats::new(strategy_name, original_rows, resolved.len());
    info!(
        strategy = stats.strategy,
        original_rows = stats.original_rows,
        final_rows = stats.final_rows,
        reduction_factor = stats.reduction_factor,
        "time line resolved"
    );
    Ok(ResolvedTimeseries {
        table: resolved,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_series::hourly_time_line;
    use chrono::NaiveDate;

    fn start() -> TimeStamp {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn hourly_table(periods: usize) -> TimeSeriesTable {
        let mut columns = IndexMap::new();
        columns.insert(
            "load".to_string(),
            (0..periods).map(|i| i as f64).collect(),
        );
        TimeSeriesTable::try_new(hourly_time_line(start(), periods), columns)
            .expect("test table construction should succeed")
    }

    fn enabled(strategy: Strategy) -> TimestepConfig {
        TimestepConfig {
            enabled: true,
            strategy,
        }
    }

    #[test]
    fn full_strategy_is_identity() {
        let table = hourly_table(10);
        let resolved =
            resolve(&table, &enabled(Strategy::Full)).expect("resolution should succeed");
        assert_eq!(resolved.table, table);
        assert_eq!(resolved.stats.final_rows, 10);
        assert_eq!(resolved.stats.reduction_factor, 1.0);
    }

    #[test]
    fn disabled_configuration_passes_through_unchanged() {
        let table = hourly_table(10);
        let config = TimestepConfig {
            enabled: false,
            strategy: Strategy::Averaging { hours: 4 },
        };
        let resolved = resolve(&table, &config).expect("resolution should succeed");
        assert_eq!(resolved.table, table);
        assert_eq!(resolved.stats.strategy, "full");
    }

    #[test]
    fn averaging_keeps_partial_trailing_block() {
        let table = hourly_table(10);
        let resolved = resolve(&table, &enabled(Strategy::Averaging { hours: 4 }))
            .expect("resolution should succeed");
        assert_eq!(resolved.table.len(), 3);
        // [0..3], [4..7] and the 2-row remainder [8..9].
        assert_eq!(
            resolved.table.column("load").expect("column should survive"),
            &vec![1.5, 5.5, 8.5]
        );
        let stamps = resolved.table.time_stamps();
        assert_eq!(stamps[0], table.time_stamps()[0]);
        assert_eq!(stamps[1], table.time_stamps()[4]);
        assert_eq!(stamps[2], table.time_stamps()[8]);
    }

    #[test]
    fn averaging_over_single_hours_is_identity() {
        let table = hourly_table(7);
        let resolved = resolve(&table, &enabled(Strategy::Averaging { hours: 1 }))
            .expect("resolution should succeed");
        assert_eq!(resolved.table, table);
    }

    #[test]
    fn averaging_rejects_non_positive_hours() {
        let table = hourly_table(4);
        match resolve(&table, &enabled(Strategy::Averaging { hours: 0 })) {
            Err(error) => assert_eq!(error, TimestepError::InvalidHours(0)),
            Ok(..) => panic!("resolution should have failed"),
        }
    }

    #[test]
    fn time_range_filters_inclusively() {
        let table = hourly_table(24);
        let range_start = table.time_stamps()[5];
        let range_end = table.time_stamps()[8];
        let resolved = resolve(
            &table,
            &enabled(Strategy::TimeRange {
                start: range_start,
                end: range_end,
            }),
        )
        .expect("resolution should succeed");
        assert_eq!(resolved.table.len(), 4);
        assert_eq!(resolved.table.time_stamps()[0], range_start);
        assert_eq!(resolved.table.time_stamps()[3], range_end);
        assert_eq!(
            resolved.table.column("load").expect("column should survive"),
            &vec![5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn time_range_rejects_inverted_bounds() {
        let table = hourly_table(24);
        let result = resolve(
            &table,
            &enabled(Strategy::TimeRange {
                start: table.time_stamps()[8],
                end: table.time_stamps()[5],
            }),
        );
        match result {
            Err(TimestepError::InvalidRange { .. }) => {}
            other => panic!("expected InvalidRange, got {:?}", other),
        }
    }

    #[test]
    fn time_range_outside_data_is_empty() {
        let table = hourly_table(24);
        let result = resolve(
            &table,
            &enabled(Strategy::TimeRange {
                start: start() + chrono::TimeDelta::days(10),
                end: start() + chrono::TimeDelta::days(11),
            }),
        );
        match result {
            Err(TimestepError::EmptyRange { .. }) => {}
            other => panic!("expected EmptyRange, got {:?}", other),
        }
    }

    #[test]
    fn daily_sampling_keeps_one_row_per_day() {
        let table = hourly_table(8760);
        let resolved = resolve(&table, &enabled(Strategy::Sampling { n: 1.0 }))
            .expect("resolution should succeed");
        assert_eq!(resolved.table.len(), 365);
        assert_eq!(resolved.table.time_stamps()[0], table.time_stamps()[0]);
        assert_eq!(resolved.table.time_stamps()[1], table.time_stamps()[24]);
        assert_eq!(
            *resolved.table.time_stamps().last().unwrap(),
            table.time_stamps()[8736]
        );
    }

    #[test]
    fn fractional_factor_samples_within_days() {
        let table = hourly_table(48);
        let resolved = resolve(&table, &enabled(Strategy::Sampling { n: 0.5 }))
            .expect("resolution should succeed");
        assert_eq!(
            resolved.table.column("load").expect("column should survive"),
            &vec![0.0, 12.0, 24.0, 36.0]
        );
    }

    #[test]
    fn sampling_rejects_non_positive_factor() {
        let table = hourly_table(24);
        match resolve(&table, &enabled(Strategy::Sampling { n: 0.0 })) {
            Err(error) => assert_eq!(error, TimestepError::InvalidFactor(0.0)),
            Ok(..) => panic!("resolution should have failed"),
        }
    }

    fn parameters(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn parses_time_range_parameters() {
        let config = TimestepConfig::from_parameters(&parameters(&[
            ("enabled", "True"),
            ("timestep_strategy", "time_range"),
            ("start_date", "2025-01-01 00:00"),
            ("end_date", "2025-01-31 23:00"),
        ]))
        .expect("parsing should succeed");
        assert!(config.enabled);
        match config.strategy {
            Strategy::TimeRange { start, end } => {
                assert_eq!(start, start_of("2025-01-01 00:00"));
                assert_eq!(end, start_of("2025-01-31 23:00"));
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }

    fn start_of(text: &str) -> TimeStamp {
        crate::time_series::parse_time_stamp(text).expect("test time stamp should parse")
    }

    #[test]
    fn parses_averaging_and_sampling_parameters() {
        let config = TimestepConfig::from_parameters(&parameters(&[
            ("enabled", "yes"),
            ("timestep_strategy", "averaging"),
            ("hours", "6"),
        ]))
        .expect("parsing should succeed");
        assert_eq!(config.strategy, Strategy::Averaging { hours: 6 });

        let config = TimestepConfig::from_parameters(&parameters(&[
            ("enabled", "1"),
            ("timestep_strategy", "sampling_24n"),
            ("n", "0.5"),
        ]))
        .expect("parsing should succeed");
        assert_eq!(config.strategy, Strategy::Sampling { n: 0.5 });
    }

    #[test]
    fn defaults_to_disabled_full_strategy() {
        let config =
            TimestepConfig::from_parameters(&[]).expect("empty parameters should be valid");
        assert_eq!(config, TimestepConfig::default());
    }

    #[test]
    fn rejects_unknown_strategy_and_missing_parameters() {
        match TimestepConfig::from_parameters(&parameters(&[
            ("enabled", "true"),
            ("timestep_strategy", "downsample"),
        ])) {
            Err(TimestepError::UnknownStrategy(name)) => assert_eq!(name, "downsample"),
            other => panic!("expected UnknownStrategy, got {:?}", other),
        }
        match TimestepConfig::from_parameters(&parameters(&[
            ("enabled", "true"),
            ("timestep_strategy", "averaging"),
        ])) {
            Err(TimestepError::MissingParameter("hours")) => {}
            other => panic!("expected MissingParameter, got {:?}", other),
        }
    }

    #[test]
    fn disabled_configuration_skips_strategy_parameter_validation() {
        let config = TimestepConfig::from_parameters(&parameters(&[
            ("enabled", "false"),
            ("timestep_strategy", "time_range"),
        ]))
        .expect("disabled configuration should not validate strategy parameters");
        assert!(!config.enabled);
        assert_eq!(config.strategy, Strategy::Full);
    }
}
