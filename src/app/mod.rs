// SensorIngest - app/mod.rs
//
// Application layer: review sessions, artifact composition, ingest driver.
// Dependencies: core layer, platform file reading.

pub mod compose;
pub mod ingest;
pub mod session;
