use fremof::excel_reader;
use fremof::results::{extract_investments, extract_total_cost, OptimizationResult};
use fremof::schema;
use fremof::settings::{self, Settings};
use fremof::timestep::{self, TimestepConfig};
use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{}", error);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    let workbook_path = args
        .get(1)
        .ok_or("first argument should be the path to the input workbook")?;
    let results_path = args.get(2);

    let settings = settings::make_settings(
        &settings::map_from_environment_variables(),
        &settings::make_settings_file_path(),
    )?;
    info!(
        solver = settings.solver.as_str(),
        output_format = settings.output_format.as_str(),
        "settings loaded"
    );

    let tables = excel_reader::read_workbook(workbook_path)?;
    let system = schema::validate(&tables)?;
    info!(
        buses = system.buses.len(),
        components = system.component_count(),
        profiles = system.time_series.columns().len(),
        "input tables validated"
    );

    let config = TimestepConfig::from_parameters(&tables.timestep_parameters)?;
    let resolved = timestep::resolve(&system.time_series, &config)?;
    info!(
        original_rows = resolved.stats.original_rows,
        final_rows = resolved.stats.final_rows,
        strategy = resolved.stats.strategy,
        "model time line ready for the optimizer"
    );

    if let Some(path) = results_path {
        report_results(path, &settings)?;
    }
    Ok(())
}

fn report_results(path: &str, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let content = fs::read_to_string(path)?;
    let result: OptimizationResult = serde_json::from_str(&content)?;
    let sequence_count: usize = result
        .flows
        .values()
        .map(|flow| flow.sequences.len())
        .sum();
    info!(
        flows = result.flows.len(),
        sequences = sequence_count,
        "optimizer results loaded"
    );
    let investments = extract_investments(&result);
    match extract_total_cost(&result.meta) {
        Some(total_cost) => info!(total_cost, "objective value"),
        None => info!("optimizer reported no objective value"),
    }
    if investments.is_empty() {
        info!("no positive investment decisions in the results");
        return Ok(());
    }
    let output_path = Path::new(path).with_file_name(match settings.output_format.as_str() {
        "json" => "investments.json",
        _ => "investments.csv",
    });
    match settings.output_format.as_str() {
        "json" => {
            let named: BTreeMap<String, f64> = investments
                .iter()
                .map(|((source, target), value)| (format!("{} -> {}", source, target), *value))
                .collect();
            fs::write(&output_path, serde_json::to_string_pretty(&named)?)?;
        }
        _ => {
            let mut writer = csv::Writer::from_path(&output_path)?;
            writer.write_record(["source", "target", "investment"])?;
            for ((source, target), value) in &investments {
                writer.write_record([source.as_str(), target.as_str(), &value.to_string()])?;
            }
            writer.flush()?;
        }
    }
    info!(
        investments = investments.len(),
        output = %output_path.display(),
        "investment decisions written"
    );
    Ok(())
}
