use crate::errors::{SchemaError, SchemaErrorKind};
use crate::tables::{AttributeRow, InputTables, RawField};
use crate::time_series::TimeSeriesTable;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Delimiter of converter bus and conversion factor lists.
pub const LIST_DELIMITER: char = ';';

pub const BUSES: &str = "buses";
pub const SOURCES: &str = "sources";
pub const SINKS: &str = "sinks";
pub const CONVERTERS: &str = "converters";
pub const STORAGES: &str = "storages";

/// A field resolved during validation to either a literal constant or a
/// reference to a time series column. Downstream code works on this form
/// only; the raw cell is never re-parsed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum FieldValue {
    Literal(f64),
    ColumnRef(String),
}

impl FieldValue {
    fn classify(
        raw: &RawField,
        time_series: &TimeSeriesTable,
        table: &'static str,
        row: &str,
        field: &'static str,
    ) -> Result<FieldValue, SchemaError> {
        let text = match raw {
            RawField::Number(value) => return Ok(FieldValue::Literal(*value)),
            RawField::Text(text) => text.trim(),
        };
        Self::classify_text(text, time_series, table, row, field)
    }

    fn classify_text(
        text: &str,
        time_series: &TimeSeriesTable,
        table: &'static str,
        row: &str,
        field: &'static str,
    ) -> Result<FieldValue, SchemaError> {
        let names_column = time_series.has_column(text);
        match text.parse::<f64>() {
            Ok(value) => {
                if names_column {
                    Err(SchemaError::in_field(
                        SchemaErrorKind::InvalidBound(format!(
                            "'{}' is both a numeric constant and a time series column",
                            text
                        )),
                        table,
                        row,
                        field,
                    ))
                } else {
                    Ok(FieldValue::Literal(value))
                }
            }
            Err(..) => {
                if names_column {
                    Ok(FieldValue::ColumnRef(text.to_string()))
                } else {
                    Err(SchemaError::in_field(
                        SchemaErrorKind::UnknownColumnReference(text.to_string()),
                        table,
                        row,
                        field,
                    ))
                }
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Bus {
    pub label: String,
    pub carrier: String,
    pub balanced: bool,
}

/// Investment and annuity inputs of a component.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Economics {
    pub existing: f64,
    pub investment: bool,
    pub investment_min: f64,
    pub investment_max: Option<f64>,
    pub capex: f64,
    pub lifetime: f64,
    pub wacc: Option<f64>,
}

impl Economics {
    fn from_row(
        attributes: &AttributeRow,
        table: &'static str,
        row: &str,
    ) -> Result<Self, SchemaError> {
        let existing = attributes.existing.unwrap_or(0.0);
        if existing < 0.0 {
            return Err(SchemaError::in_field(
                SchemaErrorKind::InvalidBound(format!(
                    "existing capacity should be non-negative, got {}",
                    existing
                )),
                table,
                row,
                "existing",
            ));
        }
        let investment = attributes.investment.unwrap_or(false);
        let investment_min = attributes.investment_min.unwrap_or(0.0);
        if let Some(investment_max) = attributes.investment_max {
            if investment_min > investment_max {
                return Err(SchemaError::in_field(
                    SchemaErrorKind::InvalidBound(format!(
                        "investment_min {} exceeds investment_max {}",
                        investment_min, investment_max
                    )),
                    table,
                    row,
                    "investment_min",
                ));
            }
        }
        if investment && attributes.wacc.is_none() {
            return Err(SchemaError::in_field(
                SchemaErrorKind::InvalidBound(
                    "wacc is required when investment is enabled".to_string(),
                ),
                table,
                row,
                "wacc",
            ));
        }
        Ok(Economics {
            existing,
            investment,
            investment_min,
            investment_max: attributes.investment_max,
            capex: attributes.capex.unwrap_or(0.0),
            lifetime: attributes.lifetime.unwrap_or(20.0),
            wacc: attributes.wacc,
        })
    }

    /// Equivalent periodical cost of one unit of invested capacity: the
    /// annuity of `capex` over `lifetime` at interest `wacc`, falling back to
    /// straight-line depreciation when either is missing.
    pub fn annualized_capex(&self) -> f64 {
        let wacc = self.wacc.unwrap_or(0.0);
        if wacc > 0.0 && self.lifetime > 0.0 {
            let growth = (1.0 + wacc).powf(self.lifetime);
            return self.capex * (wacc * growth) / (growth - 1.0);
        }
        if self.lifetime > 0.0 {
            self.capex / self.lifetime
        } else {
            self.capex
        }
    }
}

/// Per-timestep bounds and cost attributes of a component's flow.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FlowParams {
    pub max: Option<FieldValue>,
    pub min: Option<FieldValue>,
    pub fix: Option<FieldValue>,
    pub variable_costs: FieldValue,
    pub availability: FieldValue,
    pub emissions: f64,
    pub full_load_time_max: Option<f64>,
    pub full_load_time_min: Option<f64>,
}

impl FlowParams {
    fn from_row(
        attributes: &AttributeRow,
        time_series: &TimeSeriesTable,
        table: &'static str,
        row: &str,
    ) -> Result<Self, SchemaError> {
        let classify = |raw: &Option<RawField>, field: &'static str| match raw {
            Some(raw) => FieldValue::classify(raw, time_series, table, row, field).map(Some),
            None => Ok(None),
        };
        if let (Some(min), Some(max)) =
            (attributes.full_load_time_min, attributes.full_load_time_max)
        {
            if min > max {
                return Err(SchemaError::in_field(
                    SchemaErrorKind::InvalidBound(format!(
                        "full_load_time_min {} exceeds full_load_time_max {}",
                        min, max
                    )),
                    table,
                    row,
                    "full_load_time_min",
                ));
            }
        }
        Ok(FlowParams {
            max: classify(&attributes.max, "max")?,
            min: classify(&attributes.min, "min")?,
            fix: classify(&attributes.fix, "fix")?,
            variable_costs: classify(&attributes.variable_costs, "variable_costs")?
                .unwrap_or(FieldValue::Literal(0.0)),
            availability: classify(&attributes.availability, "availability")?
                .unwrap_or(FieldValue::Literal(1.0)),
            emissions: attributes.emissions.unwrap_or(0.0),
            full_load_time_max: attributes.full_load_time_max,
            full_load_time_min: attributes.full_load_time_min,
        })
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Source {
    pub label: String,
    pub output: String,
    pub flow: FlowParams,
    pub economics: Economics,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Sink {
    pub label: String,
    pub input: String,
    pub flow: FlowParams,
    pub economics: Economics,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ConverterOperation {
    pub startup_costs: f64,
    pub shutdown_costs: f64,
    pub maintenance_interval: Option<f64>,
    pub part_load_efficiency: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Converter {
    pub label: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Aligned positionally with `inputs`.
    pub input_conversions: Vec<FieldValue>,
    /// Aligned positionally with `outputs`.
    pub output_conversions: Vec<FieldValue>,
    pub operation: ConverterOperation,
    pub flow: FlowParams,
    pub economics: Economics,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StorageLevels {
    pub max_storage_level: f64,
    pub min_storage_level: f64,
    pub inflow_conversion_factor: f64,
    pub outflow_conversion_factor: f64,
    pub loss_rate: f64,
    pub initial_storage_level: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Storage {
    pub label: String,
    pub bus: String,
    pub levels: StorageLevels,
    pub flow: FlowParams,
    pub economics: Economics,
}

/// The validated in-memory energy system description. No dangling
/// references, no arity mismatches, all defaults applied.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NormalizedSystem {
    pub buses: IndexMap<String, Bus>,
    pub sources: Vec<Source>,
    pub sinks: Vec<Sink>,
    pub converters: Vec<Converter>,
    pub storages: Vec<Storage>,
    pub time_series: TimeSeriesTable,
}

impl NormalizedSystem {
    pub fn component_count(&self) -> usize {
        self.sources.len() + self.sinks.len() + self.converters.len() + self.storages.len()
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(LIST_DELIMITER)
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn check_bus_reference(
    bus: &str,
    buses: &IndexMap<String, Bus>,
    table: &'static str,
    row: &str,
    field: &'static str,
) -> Result<String, SchemaError> {
    let bus = bus.trim();
    if !buses.contains_key(bus) {
        return Err(SchemaError::in_field(
            SchemaErrorKind::UnknownBusReference(bus.to_string()),
            table,
            row,
            field,
        ));
    }
    Ok(bus.to_string())
}

fn claim_label(
    label: &str,
    seen: &mut HashSet<String>,
    table: &'static str,
) -> Result<(), SchemaError> {
    if !seen.insert(label.to_string()) {
        return Err(SchemaError::new(
            SchemaErrorKind::DuplicateLabel(label.to_string()),
            table,
            label,
        ));
    }
    Ok(())
}

/// Parses a semicolon-delimited conversion factor list and checks its arity
/// against the connection list it belongs to. A missing list defaults to a
/// factor of 1.0 per connection.
fn resolve_conversions(
    raw: &Option<String>,
    connections: usize,
    time_series: &TimeSeriesTable,
    row: &str,
    field: &'static str,
) -> Result<Vec<FieldValue>, SchemaError> {
    let text = match raw {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Ok(vec![FieldValue::Literal(1.0); connections]),
    };
    let entries = split_list(text);
    if entries.len() != connections {
        return Err(SchemaError::in_field(
            SchemaErrorKind::ArityMismatch {
                connections,
                conversions: entries.len(),
            },
            CONVERTERS,
            row,
            field,
        ));
    }
    entries
        .iter()
        .map(|entry| FieldValue::classify_text(entry, time_series, CONVERTERS, row, field))
        .collect()
}

/// Validates the raw input tables into a [`NormalizedSystem`].
///
/// Rows with `include=false` are dropped first; the remaining rows are
/// checked for duplicate labels, dangling bus references, unresolvable
/// column references and converter arity. The first defect aborts
/// validation; no partial system is ever returned.
pub fn validate(tables: &InputTables) -> Result<NormalizedSystem, SchemaError> {
    let mut buses = IndexMap::new();
    for row in tables.buses.iter().filter(|row| row.include) {
        let label = row.label.trim().to_string();
        if buses
            .insert(
                label.clone(),
                Bus {
                    label: label.clone(),
                    carrier: row.carrier.clone(),
                    balanced: row.balanced,
                },
            )
            .is_some()
        {
            return Err(SchemaError::new(
                SchemaErrorKind::DuplicateLabel(label.clone()),
                BUSES,
                label,
            ));
        }
    }

    let time_series = &tables.time_series;
    // Flow keys pair component and bus labels, so a component sharing a bus
    // label would make its flow keys ambiguous.
    let mut seen_labels: HashSet<String> = buses.keys().cloned().collect();

    let mut sources = Vec::new();
    for row in tables.sources.iter().filter(|row| row.include) {
        claim_label(&row.label, &mut seen_labels, SOURCES)?;
        sources.push(Source {
            label: row.label.clone(),
            output: check_bus_reference(&row.output, &buses, SOURCES, &row.label, "output")?,
            flow: FlowParams::from_row(&row.attributes, time_series, SOURCES, &row.label)?,
            economics: Economics::from_row(&row.attributes, SOURCES, &row.label)?,
        });
    }

    let mut sinks = Vec::new();
    for row in tables.sinks.iter().filter(|row| row.include) {
        claim_label(&row.label, &mut seen_labels, SINKS)?;
        sinks.push(Sink {
            label: row.label.clone(),
            input: check_bus_reference(&row.input, &buses, SINKS, &row.label, "input")?,
            flow: FlowParams::from_row(&row.attributes, time_series, SINKS, &row.label)?,
            economics: Economics::from_row(&row.attributes, SINKS, &row.label)?,
        });
    }

    let mut converters = Vec::new();
    for row in tables.converters.iter().filter(|row| row.include) {
        claim_label(&row.label, &mut seen_labels, CONVERTERS)?;
        let inputs = split_list(&row.inputs);
        let outputs = split_list(&row.outputs);
        if inputs.is_empty() || outputs.is_empty() {
            return Err(SchemaError::new(
                SchemaErrorKind::InvalidBound(
                    "converter needs at least one input and one output bus".to_string(),
                ),
                CONVERTERS,
                &row.label,
            ));
        }
        for bus in &inputs {
            check_bus_reference(bus, &buses, CONVERTERS, &row.label, "inputs")?;
        }
        for bus in &outputs {
            check_bus_reference(bus, &buses, CONVERTERS, &row.label, "outputs")?;
        }
        converters.push(Converter {
            label: row.label.clone(),
            input_conversions: resolve_conversions(
                &row.input_conversions,
                inputs.len(),
                time_series,
                &row.label,
                "input_conversions",
            )?,
            output_conversions: resolve_conversions(
                &row.output_conversions,
                outputs.len(),
                time_series,
                &row.label,
                "output_conversions",
            )?,
            inputs,
            outputs,
            operation: ConverterOperation {
                startup_costs: row.startup_costs.unwrap_or(0.0),
                shutdown_costs: row.shutdown_costs.unwrap_or(0.0),
                maintenance_interval: row.maintenance_interval,
                part_load_efficiency: row.part_load_efficiency,
            },
            flow: FlowParams::from_row(&row.attributes, time_series, CONVERTERS, &row.label)?,
            economics: Economics::from_row(&row.attributes, CONVERTERS, &row.label)?,
        });
    }

    let mut storages = Vec::new();
    for row in tables.storages.iter().filter(|row| row.include) {
        claim_label(&row.label, &mut seen_labels, STORAGES)?;
        let levels = StorageLevels {
            max_storage_level: row.max_storage_level.unwrap_or(1.0),
            min_storage_level: row.min_storage_level.unwrap_or(0.0),
            inflow_conversion_factor: row.inflow_conversion_factor.unwrap_or(1.0),
            outflow_conversion_factor: row.outflow_conversion_factor.unwrap_or(1.0),
            loss_rate: row.loss_rate.unwrap_or(0.0),
            initial_storage_level: row.initial_storage_level,
        };
        if levels.min_storage_level > levels.max_storage_level {
            return Err(SchemaError::in_field(
                SchemaErrorKind::InvalidBound(format!(
                    "min_storage_level {} exceeds max_storage_level {}",
                    levels.min_storage_level, levels.max_storage_level
                )),
                STORAGES,
                &row.label,
                "min_storage_level",
            ));
        }
        storages.push(Storage {
            label: row.label.clone(),
            bus: check_bus_reference(&row.bus, &buses, STORAGES, &row.label, "bus")?,
            levels,
            flow: FlowParams::from_row(&row.attributes, time_series, STORAGES, &row.label)?,
            economics: Economics::from_row(&row.attributes, STORAGES, &row.label)?,
        });
    }

    debug!(
        buses = buses.len(),
        sources = sources.len(),
        sinks = sinks.len(),
        converters = converters.len(),
        storages = storages.len(),
        "input tables validated"
    );
    Ok(NormalizedSystem {
        buses,
        sources,
        sinks,
        converters,
        storages,
        time_series: tables.time_series.clone(),
    })
}
