//! Infrastructure adapters and runtime bootstrap.

use std::path::Path;

use crate::config::{self, Settings};

pub mod error;
pub mod memory;
pub mod telemetry;

use error::InfraError;

/// Load settings and install telemetry, in that order.
pub fn bootstrap(config_file: Option<&Path>) -> Result<Settings, InfraError> {
    let settings = config::load(config_file)?;
    telemetry::init(&settings.logging)?;
    Ok(settings)
}
