use crate::time_series::TimeSeriesTable;
use serde::{Deserialize, Serialize};

/// Raw cell content of a field that may hold either a literal number or the
/// name of a time series column. Classification into one or the other happens
/// once, during validation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawField {
    Number(f64),
    Text(String),
}

impl RawField {
    pub fn text(value: impl Into<String>) -> Self {
        RawField::Text(value.into())
    }
}

impl From<f64> for RawField {
    fn from(value: f64) -> Self {
        RawField::Number(value)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BusRow {
    pub label: String,
    #[serde(default)]
    pub carrier: String,
    #[serde(default = "default_true")]
    pub balanced: bool,
    #[serde(default = "default_true")]
    pub include: bool,
}

/// Economic and per-timestep attributes shared by every component kind.
/// Optional cells stay `None` here; defaulting is the schema's job.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AttributeRow {
    pub existing: Option<f64>,
    pub investment: Option<bool>,
    pub investment_min: Option<f64>,
    pub investment_max: Option<f64>,
    pub capex: Option<f64>,
    pub lifetime: Option<f64>,
    pub wacc: Option<f64>,
    pub max: Option<RawField>,
    pub min: Option<RawField>,
    pub fix: Option<RawField>,
    pub variable_costs: Option<RawField>,
    pub availability: Option<RawField>,
    pub emissions: Option<f64>,
    pub full_load_time_max: Option<f64>,
    pub full_load_time_min: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SourceRow {
    pub label: String,
    #[serde(default = "default_true")]
    pub include: bool,
    pub output: String,
    #[serde(flatten)]
    pub attributes: AttributeRow,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SinkRow {
    pub label: String,
    #[serde(default = "default_true")]
    pub include: bool,
    pub input: String,
    #[serde(flatten)]
    pub attributes: AttributeRow,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConverterRow {
    pub label: String,
    #[serde(default = "default_true")]
    pub include: bool,
    /// Semicolon-delimited bus lists, e.g. `"gas_bus"` or `"el_bus; gas_bus"`.
    pub inputs: String,
    pub outputs: String,
    /// Semicolon-delimited factors aligned with `inputs`/`outputs`; each entry
    /// is a number or a time series column name.
    pub input_conversions: Option<String>,
    pub output_conversions: Option<String>,
    pub startup_costs: Option<f64>,
    pub shutdown_costs: Option<f64>,
    pub maintenance_interval: Option<f64>,
    pub part_load_efficiency: Option<f64>,
    #[serde(flatten)]
    pub attributes: AttributeRow,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StorageRow {
    pub label: String,
    #[serde(default = "default_true")]
    pub include: bool,
    pub bus: String,
    pub max_storage_level: Option<f64>,
    pub min_storage_level: Option<f64>,
    pub inflow_conversion_factor: Option<f64>,
    pub outflow_conversion_factor: Option<f64>,
    pub loss_rate: Option<f64>,
    pub initial_storage_level: Option<f64>,
    #[serde(flatten)]
    pub attributes: AttributeRow,
}

/// Everything the spreadsheet loader hands to validation: one row collection
/// per entity sheet, the time series table and the flat timestep
/// parameter/value rows.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct InputTables {
    pub buses: Vec<BusRow>,
    pub sources: Vec<SourceRow>,
    pub sinks: Vec<SinkRow>,
    pub converters: Vec<ConverterRow>,
    pub storages: Vec<StorageRow>,
    pub time_series: TimeSeriesTable,
    pub timestep_parameters: Vec<(String, String)>,
}
