use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Per-flow output of the external optimizer, keyed by (source label, target
/// label) pairs. The optimizer serializes those pairs as single strings of the
/// form `"(grid, el_bus)"`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct OptimizationResult {
    #[serde(deserialize_with = "deserialize_flow_results")]
    pub flows: BTreeMap<(String, String), FlowResult>,
    #[serde(default)]
    pub meta: MetaResult,
}

/// A single flow's results. `scalars` is shape-ambiguous at the interface
/// boundary: depending on the optimizer's serialization path it arrives either
/// as a bare named-value map or as a one-row table.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FlowResult {
    pub scalars: Option<ScalarContainer>,
    #[serde(default)]
    pub sequences: IndexMap<String, Vec<f64>>,
}

/// The two serialized shapes a flow's scalar block can take.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarContainer {
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    NamedValues(IndexMap<String, serde_json::Value>),
}

impl ScalarContainer {
    /// Normalizes either shape into a single named-value view. A table shape
    /// is valid only when it carries exactly one row; anything else is a
    /// malformed entry and yields an error for the caller to log.
    pub fn named_values(&self) -> Result<IndexMap<String, serde_json::Value>, String> {
        match *self {
            ScalarContainer::NamedValues(ref values) => Ok(values.clone()),
            ScalarContainer::Table {
                ref columns,
                ref rows,
            } => {
                if rows.len() != 1 {
                    return Err(format!(
                        "scalar table should have exactly one row, got {}",
                        rows.len()
                    ));
                }
                let row = &rows[0];
                if row.len() != columns.len() {
                    return Err(format!(
                        "scalar table row has {} values for {} columns",
                        row.len(),
                        columns.len()
                    ));
                }
                Ok(columns.iter().cloned().zip(row.iter().cloned()).collect())
            }
        }
    }
}

pub fn parse_flow_key(key: &str) -> Result<(String, String), String> {
    let parts = key
        .trim_matches(|c| c == '(' || c == ')')
        .split(", ")
        .map(|part| part.trim_matches(|c| c == '"' || c == '\'').to_string())
        .collect::<Vec<_>>();
    if parts.len() != 2 {
        return Err(format!("invalid flow key '{}'", key));
    }
    Ok((parts[0].clone(), parts[1].clone()))
}

fn deserialize_flow_results<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<(String, String), FlowResult>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlowResultsVisitor;

    impl<'de> Visitor<'de> for FlowResultsVisitor {
        type Value = BTreeMap<(String, String), FlowResult>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter
                .write_str("a map with (source, target) formatted as tuple (String, String) keys")
        }

        fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut map = BTreeMap::new();
            while let Some((key, value)) = access.next_entry::<String, FlowResult>()? {
                let key = parse_flow_key(&key).map_err(de::Error::custom)?;
                map.insert(key, value);
            }
            Ok(map)
        }
    }
    deserializer.deserialize_map(FlowResultsVisitor)
}

/// Solver bookkeeping returned alongside the flow results.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MetaResult {
    pub objective: Option<f64>,
    pub solver: Option<String>,
    pub termination_condition: Option<String>,
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    match *value {
        serde_json::Value::Number(ref number) => number.as_f64(),
        serde_json::Value::String(ref text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Collects the investment decision of every flow that has one.
///
/// A flow contributes when its scalar block carries a field whose name
/// contains "invest" (case-insensitive) with a strictly positive value. Flows
/// without such a field, or with a zero or negative value, are absent from the
/// output. A malformed entry is logged and skipped so that one bad flow never
/// loses the rest.
pub fn extract_investments(
    result: &OptimizationResult,
) -> BTreeMap<(String, String), f64> {
    let mut investments = BTreeMap::new();
    for (key, flow) in &result.flows {
        let container = match flow.scalars {
            Some(ref container) => container,
            None => continue,
        };
        let values = match container.named_values() {
            Ok(values) => values,
            Err(detail) => {
                warn!(
                    source = key.0.as_str(),
                    target = key.1.as_str(),
                    detail = detail.as_str(),
                    "skipping malformed flow result"
                );
                continue;
            }
        };
        for (name, value) in values
            .iter()
            .filter(|(name, _)| name.to_lowercase().contains("invest"))
        {
            match as_number(value) {
                Some(number) if number > 0.0 => {
                    investments.insert(key.clone(), number);
                }
                Some(..) => {}
                None => warn!(
                    source = key.0.as_str(),
                    target = key.1.as_str(),
                    field = name.as_str(),
                    "skipping non-numeric investment value"
                ),
            }
        }
    }
    investments
}

/// Total objective value, or `None` when the solver did not report one.
pub fn extract_total_cost(meta: &MetaResult) -> Option<f64> {
    meta.objective
}
