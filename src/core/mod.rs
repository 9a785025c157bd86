// SensorIngest - core/mod.rs
//
// Core business logic layer: header decode, parsing, checks, site profiles,
// writers.
// Must NOT depend on: app or platform. Filesystem access is limited to
// directory walking in `discovery`.

pub mod checks;
pub mod discovery;
pub mod export;
pub mod header;
pub mod model;
pub mod parser;
pub mod site;
