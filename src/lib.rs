pub mod configuration;
pub mod data;
pub mod db;
pub mod domain;
pub mod jobs;
pub mod riot;
pub mod schema;
pub mod scoring;
pub mod startup;
pub mod telemetry;

// re-export for ease of use in binaries and integration tests
pub use domain::error::{Error, ErrorKind, Result};
