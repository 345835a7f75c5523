pub mod data_models;
pub mod feature_table;
pub mod run_report;

pub use data_models::*;
pub use feature_table::*;
pub use run_report::*;
