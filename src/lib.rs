pub mod errors;
pub mod excel_reader;
pub mod results;
pub mod schema;
pub mod settings;
pub mod tables;
pub mod time_series;
pub mod timestep;

use chrono::NaiveDateTime;

pub type TimeStamp = NaiveDateTime;
pub type TimeLine = Vec<TimeStamp>;
