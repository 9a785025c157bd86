// SensorIngest - platform/mod.rs
//
// Platform abstraction layer: config directory resolution, config.toml
// loading, file reading and artifact writing.

pub mod config;
pub mod fs;
