use crate::errors::ReadError;
use crate::schema::{BUSES, CONVERTERS, SINKS, SOURCES, STORAGES};
use crate::tables::{BusRow, ConverterRow, InputTables, SinkRow, SourceRow, StorageRow};
use crate::time_series::{parse_time_stamp, TimeSeriesTable};
use crate::TimeLine;
use calamine::{open_workbook_auto, DataType, Range, Reader, Sheets};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

pub const TIMESERIES: &str = "timeseries";
pub const TIMESTEP_SETTINGS: &str = "timestep_settings";

/// Columns carrying boolean flags in the entity sheets. Everything else is a
/// number or text and classification is left to validation.
const BOOL_COLUMNS: [&str; 3] = ["include", "balanced", "investment"];

fn cell_to_bool(cell: &DataType) -> Result<bool, String> {
    match *cell {
        DataType::Bool(value) => Ok(value),
        DataType::Int(value) => Ok(value != 0),
        DataType::Float(value) => Ok(value != 0.0),
        DataType::String(ref text) => match text.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(format!("'{}' is not a boolean", other)),
        },
        ref other => Err(format!("{:?} is not a boolean", other)),
    }
}

fn cell_to_value(cell: &DataType) -> Result<Value, String> {
    match *cell {
        DataType::Int(value) => Ok(Value::from(value)),
        DataType::Float(value) => serde_json::Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| format!("{} is not a representable number", value)),
        DataType::String(ref text) => Ok(Value::String(text.trim().to_string())),
        DataType::Bool(value) => Ok(Value::Bool(value)),
        DataType::DateTime(..) => cell
            .as_datetime()
            .map(|stamp| Value::String(stamp.format("%Y-%m-%d %H:%M:%S").to_string()))
            .ok_or_else(|| "unrepresentable date cell".to_string()),
        DataType::Error(ref error) => Err(format!("cell error {:?}", error)),
        DataType::Empty => Ok(Value::Null),
    }
}

fn cell_to_number(cell: &DataType) -> Result<f64, String> {
    match *cell {
        DataType::Float(value) => Ok(value),
        DataType::Int(value) => Ok(value as f64),
        DataType::String(ref text) => text
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a number", text.trim())),
        ref other => Err(format!("{:?} is not a number", other)),
    }
}

fn cell_to_text(cell: &DataType) -> Result<String, String> {
    match *cell {
        DataType::String(ref text) => Ok(text.trim().to_string()),
        DataType::Int(value) => Ok(value.to_string()),
        DataType::Float(value) => Ok(value.to_string()),
        DataType::Bool(value) => Ok(value.to_string()),
        DataType::DateTime(..) => cell
            .as_datetime()
            .map(|stamp| stamp.format("%Y-%m-%d %H:%M:%S").to_string())
            .ok_or_else(|| "unrepresentable date cell".to_string()),
        ref other => Err(format!("{:?} is not text", other)),
    }
}

fn is_blank_row(row: &[DataType]) -> bool {
    row.iter().all(|cell| matches!(*cell, DataType::Empty))
}

fn header_names(row: &[DataType]) -> Vec<String> {
    row.iter()
        .map(|cell| {
            cell.get_string()
                .map(|name| name.trim().to_lowercase())
                .unwrap_or_default()
        })
        .collect()
}

/// Parses an entity sheet into typed rows. The first row names the columns;
/// each following row becomes a JSON object keyed by those names and is
/// deserialized into the row type, so optional columns may simply be absent.
pub fn parse_entity_rows<T: DeserializeOwned>(
    sheet: &'static str,
    range: &Range<DataType>,
) -> Result<Vec<T>, ReadError> {
    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_names(header_row),
        None => return Ok(Vec::new()),
    };
    let mut parsed = Vec::new();
    for (offset, row) in rows.enumerate() {
        let row_number = offset + 2;
        if is_blank_row(row) {
            continue;
        }
        let mut record = Map::new();
        for (index, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let cell = match row.get(index) {
                Some(cell) => cell,
                None => continue,
            };
            if matches!(*cell, DataType::Empty) {
                continue;
            }
            let value = if BOOL_COLUMNS.contains(&header.as_str()) {
                cell_to_bool(cell).map(Value::Bool)
            } else {
                cell_to_value(cell)
            }
            .map_err(|detail| ReadError::Cell {
                sheet,
                row: row_number,
                column: header.clone(),
                detail,
            })?;
            record.insert(header.clone(), value);
        }
        let entity = serde_json::from_value(Value::Object(record)).map_err(|error| {
            ReadError::Row {
                sheet,
                row: row_number,
                detail: error.to_string(),
            }
        })?;
        parsed.push(entity);
    }
    Ok(parsed)
}

/// Parses the time series sheet: the first column is the timestamp index,
/// every further column a numeric profile named by its header.
pub fn parse_time_series(range: &Range<DataType>) -> Result<TimeSeriesTable, ReadError> {
    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_names(header_row),
        None => {
            return Err(ReadError::MissingColumn {
                sheet: TIMESERIES,
                column: "timestamp",
            })
        }
    };
    if headers.is_empty() || headers[0].is_empty() {
        return Err(ReadError::MissingColumn {
            sheet: TIMESERIES,
            column: "timestamp",
        });
    }
    let column_names: Vec<String> = headers[1..].to_vec();
    let mut time_stamps: TimeLine = Vec::new();
    let mut columns: IndexMap<String, Vec<f64>> = column_names
        .iter()
        .map(|name| (name.clone(), Vec::new()))
        .collect();
    for (offset, row) in rows.enumerate() {
        let row_number = offset + 2;
        if is_blank_row(row) {
            continue;
        }
        let stamp_cell = row.first().unwrap_or(&DataType::Empty);
        let stamp = match *stamp_cell {
            DataType::DateTime(..) => stamp_cell
                .as_datetime()
                .ok_or_else(|| "unrepresentable date cell".to_string()),
            DataType::String(ref text) => parse_time_stamp(text),
            ref other => Err(format!("{:?} is not a time stamp", other)),
        }
        .map_err(|detail| ReadError::Cell {
            sheet: TIMESERIES,
            row: row_number,
            column: headers[0].clone(),
            detail,
        })?;
        time_stamps.push(stamp);
        for (index, name) in column_names.iter().enumerate() {
            let cell = row.get(index + 1).unwrap_or(&DataType::Empty);
            let value = cell_to_number(cell).map_err(|detail| ReadError::Cell {
                sheet: TIMESERIES,
                row: row_number,
                column: name.clone(),
                detail,
            })?;
            columns
                .get_mut(name)
                .expect("column vector should exist for every header")
                .push(value);
        }
    }
    TimeSeriesTable::try_new(time_stamps, columns).map_err(ReadError::TimeSeries)
}

/// Parses the flat parameter/value rows of the timestep settings sheet.
pub fn parse_timestep_parameters(
    range: &Range<DataType>,
) -> Result<Vec<(String, String)>, ReadError> {
    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_names(header_row),
        None => return Ok(Vec::new()),
    };
    let parameter_index = headers.iter().position(|name| name == "parameter").ok_or(
        ReadError::MissingColumn {
            sheet: TIMESTEP_SETTINGS,
            column: "parameter",
        },
    )?;
    let value_index =
        headers
            .iter()
            .position(|name| name == "value")
            .ok_or(ReadError::MissingColumn {
                sheet: TIMESTEP_SETTINGS,
                column: "value",
            })?;
    let mut parameters = Vec::new();
    for (offset, row) in rows.enumerate() {
        let row_number = offset + 2;
        if is_blank_row(row) {
            continue;
        }
        let parameter = cell_to_text(row.get(parameter_index).unwrap_or(&DataType::Empty))
            .map_err(|detail| ReadError::Cell {
                sheet: TIMESTEP_SETTINGS,
                row: row_number,
                column: "parameter".to_string(),
                detail,
            })?;
        let value = cell_to_text(row.get(value_index).unwrap_or(&DataType::Empty)).map_err(
            |detail| ReadError::Cell {
                sheet: TIMESTEP_SETTINGS,
                row: row_number,
                column: "value".to_string(),
                detail,
            },
        )?;
        parameters.push((parameter, value));
    }
    Ok(parameters)
}

type Workbook = Sheets<BufReader<File>>;

fn optional_sheet(
    workbook: &mut Workbook,
    name: &'static str,
) -> Result<Option<Range<DataType>>, ReadError> {
    match workbook.worksheet_range(name) {
        Some(range) => Ok(Some(range?)),
        None => Ok(None),
    }
}

fn required_sheet(
    workbook: &mut Workbook,
    name: &'static str,
) -> Result<Range<DataType>, ReadError> {
    optional_sheet(workbook, name)?.ok_or(ReadError::MissingSheet(name))
}

fn optional_entities<T: DeserializeOwned>(
    workbook: &mut Workbook,
    sheet: &'static str,
) -> Result<Vec<T>, ReadError> {
    match optional_sheet(workbook, sheet)? {
        Some(range) => parse_entity_rows(sheet, &range),
        None => Ok(Vec::new()),
    }
}

/// Reads every input table from the workbook at `path`. The bus and time
/// series sheets are required; the other entity sheets and the timestep
/// settings sheet default to empty when absent.
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<InputTables, ReadError> {
    let mut workbook = open_workbook_auto(path.as_ref())?;
    let buses: Vec<BusRow> = parse_entity_rows(BUSES, &required_sheet(&mut workbook, BUSES)?)?;
    let sources: Vec<SourceRow> = optional_entities(&mut workbook, SOURCES)?;
    let sinks: Vec<SinkRow> = optional_entities(&mut workbook, SINKS)?;
    let converters: Vec<ConverterRow> = optional_entities(&mut workbook, CONVERTERS)?;
    let storages: Vec<StorageRow> = optional_entities(&mut workbook, STORAGES)?;
    let time_series = parse_time_series(&required_sheet(&mut workbook, TIMESERIES)?)?;
    let timestep_parameters = match optional_sheet(&mut workbook, TIMESTEP_SETTINGS)? {
        Some(range) => parse_timestep_parameters(&range)?,
        None => Vec::new(),
    };
    info!(
        buses = buses.len(),
        sources = sources.len(),
        sinks = sinks.len(),
        converters = converters.len(),
        storages = storages.len(),
        time_steps = time_series.len(),
        "workbook read"
    );
    Ok(InputTables {
        buses,
        sources,
        sinks,
        converters,
        storages,
        time_series,
        timestep_parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::RawField;
    use chrono::NaiveDate;

    fn range_of(cells: Vec<Vec<DataType>>) -> Range<DataType> {
        let rows = cells.len() as u32;
        let columns = cells
            .iter()
            .map(|row| row.len())
            .max()
            .expect("test range should have rows") as u32;
        let mut range = Range::new((0, 0), (rows - 1, columns - 1));
        for (row_index, row) in cells.into_iter().enumerate() {
            for (column_index, cell) in row.into_iter().enumerate() {
                range.set_value((row_index as u32, column_index as u32), cell);
            }
        }
        range
    }

    fn text(value: &str) -> DataType {
        DataType::String(value.to_string())
    }

    #[test]
    fn parses_source_rows_with_optional_columns_absent() {
        let range = range_of(vec![
            vec![
                text("label"),
                text("output"),
                text("max"),
                text("investment"),
                text("capex"),
                text("wacc"),
            ],
            vec![
                text("pv"),
                text("el_bus"),
                text("pv_profile"),
                DataType::Bool(true),
                DataType::Float(850.0),
                DataType::Float(0.05),
            ],
            vec![text("grid"), text("el_bus"), DataType::Float(100.0)],
        ]);
        let sources: Vec<SourceRow> =
            parse_entity_rows(SOURCES, &range).expect("parsing should succeed");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].label, "pv");
        assert!(sources[0].include);
        assert_eq!(sources[0].attributes.max, Some(RawField::text("pv_profile")));
        assert_eq!(sources[0].attributes.investment, Some(true));
        assert_eq!(sources[0].attributes.wacc, Some(0.05));
        assert_eq!(sources[1].attributes.max, Some(RawField::Number(100.0)));
        assert_eq!(sources[1].attributes.investment, None);
    }

    #[test]
    fn boolean_cells_accept_spreadsheet_spellings() {
        let range = range_of(vec![
            vec![text("label"), text("include")],
            vec![text("a"), text("yes")],
            vec![text("b"), DataType::Int(0)],
            vec![text("c"), DataType::Bool(false)],
        ]);
        let buses: Vec<BusRow> = parse_entity_rows(BUSES, &range).expect("parsing should succeed");
        assert!(buses[0].include);
        assert!(!buses[1].include);
        assert!(!buses[2].include);
    }

    #[test]
    fn invalid_boolean_cell_is_a_cell_error() {
        let range = range_of(vec![
            vec![text("label"), text("include")],
            vec![text("a"), text("maybe")],
        ]);
        match parse_entity_rows::<BusRow>(BUSES, &range) {
            Err(ReadError::Cell { sheet, row, column, .. }) => {
                assert_eq!(sheet, BUSES);
                assert_eq!(row, 2);
                assert_eq!(column, "include");
            }
            other => panic!("expected cell error, got {:?}", other),
        }
    }

    #[test]
    fn missing_label_is_a_row_error() {
        let range = range_of(vec![
            vec![text("label"), text("output")],
            vec![DataType::Empty, text("el_bus")],
        ]);
        match parse_entity_rows::<SourceRow>(SOURCES, &range) {
            Err(ReadError::Row { sheet, row, ref detail }) => {
                assert_eq!(sheet, SOURCES);
                assert_eq!(row, 2);
                assert!(detail.contains("label"));
            }
            other => panic!("expected row error, got {:?}", other),
        }
    }

    #[test]
    fn blank_rows_are_skipped() {
        let range = range_of(vec![
            vec![text("label")],
            vec![DataType::Empty],
            vec![text("el_bus")],
        ]);
        let buses: Vec<BusRow> = parse_entity_rows(BUSES, &range).expect("parsing should succeed");
        assert_eq!(buses.len(), 1);
        assert_eq!(buses[0].label, "el_bus");
    }

    #[test]
    fn parses_time_series_from_text_stamps() {
        let range = range_of(vec![
            vec![text("timestamp"), text("load"), text("pv_profile")],
            vec![
                text("2025-01-01 00:00"),
                DataType::Float(1.5),
                DataType::Int(0),
            ],
            vec![
                text("2025-01-01 01:00"),
                DataType::Float(1.25),
                DataType::Float(0.1),
            ],
        ]);
        let table = parse_time_series(&range).expect("parsing should succeed");
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.time_stamps()[0],
            NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert_eq!(table.column("load"), Some(&vec![1.5, 1.25]));
        assert_eq!(table.column("pv_profile"), Some(&vec![0.0, 0.1]));
    }

    #[test]
    fn non_numeric_profile_cell_is_a_cell_error() {
        let range = range_of(vec![
            vec![text("timestamp"), text("load")],
            vec![text("2025-01-01 00:00"), text("n/a")],
        ]);
        match parse_time_series(&range) {
            Err(ReadError::Cell { row, ref column, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "load");
            }
            other => panic!("expected cell error, got {:?}", other),
        }
    }

    #[test]
    fn parses_timestep_parameter_rows() {
        let range = range_of(vec![
            vec![text("Parameter"), text("Value")],
            vec![text("enabled"), DataType::Bool(true)],
            vec![text("timestep_strategy"), text("averaging")],
            vec![text("hours"), DataType::Int(6)],
        ]);
        let parameters = parse_timestep_parameters(&range).expect("parsing should succeed");
        assert_eq!(
            parameters,
            vec![
                ("enabled".to_string(), "true".to_string()),
                ("timestep_strategy".to_string(), "averaging".to_string()),
                ("hours".to_string(), "6".to_string()),
            ]
        );
    }

    #[test]
    fn missing_workbook_file_is_a_workbook_error() {
        let temp_dir = tempfile::tempdir().expect("temporary directory creation should be possible");
        let path = temp_dir.path().join("no_such_workbook.xlsx");
        match read_workbook(&path) {
            Err(ReadError::Workbook(..)) => {}
            other => panic!("expected workbook error, got {:?}", other),
        }
    }

    #[test]
    fn timestep_sheet_requires_parameter_and_value_columns() {
        let range = range_of(vec![vec![text("name"), text("setting")]]);
        match parse_timestep_parameters(&range) {
            Err(ReadError::MissingColumn { column, .. }) => assert_eq!(column, "parameter"),
            other => panic!("expected missing column error, got {:?}", other),
        }
    }
}
