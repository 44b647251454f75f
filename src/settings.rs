use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

const SOLVER_FIELD: &str = "solver";
const OUTPUT_FORMAT_FIELD: &str = "output_format";

const SOLVER_VARIABLE: &str = "FREMOF_SOLVER";
const DEFAULT_SOLVER: &str = "cbc";
const DEFAULT_OUTPUT_FORMAT: &str = "csv";

#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    pub solver: String,
    pub output_format: String,
}

pub fn map_from_environment_variables() -> HashMap<String, String> {
    let mut map = HashMap::<String, String>::new();
    for (key, value) in env::vars() {
        map.insert(key, value);
    }
    map
}

pub fn make_settings_file_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "Fremof")
        .expect("system should have a home directory")
        .preference_dir()
        .join("settings.toml")
}

fn make_config_builder(
    environment_variables: &HashMap<String, String>,
) -> ConfigBuilder<DefaultState> {
    let solver = environment_variables
        .get(SOLVER_VARIABLE)
        .map(String::as_str)
        .unwrap_or(DEFAULT_SOLVER);
    Config::builder()
        .set_default(SOLVER_FIELD, solver)
        .expect("key should be convertible to string")
        .set_default(OUTPUT_FORMAT_FIELD, DEFAULT_OUTPUT_FORMAT)
        .expect("key should be convertible to string")
}

pub fn make_settings(
    environment_variables: &HashMap<String, String>,
    settings_file_path: &PathBuf,
) -> Result<Settings, ConfigError> {
    let builder = make_config_builder(environment_variables);
    let builder = builder.add_source(
        config::File::new(
            settings_file_path
                .to_str()
                .expect("file path should be convertible to string"),
            config::FileFormat::Toml,
        )
        .required(false),
    );
    let config = builder.build()?;
    config.try_deserialize::<Settings>()
}
