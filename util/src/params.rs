//! Generic parameters functions
//!
//! Parameter structures are deserialised from TOML files with serde. Each
//! module defines its own parameter struct and loads it through this module.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot read the parameter file: {0}")]
    FileLoadError(#[from] std::io::Error),

    #[error("Cannot deserialise the parameter file: {0}")]
    DeserialiseError(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file.
pub fn load<P>(param_file_path: &Path) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    load_str(read_to_string(param_file_path)?.as_str())
}

/// Parse a parameter struct from a TOML string.
pub fn load_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    Ok(toml::from_str(params_str)?)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct TestParams {
        rate_hz: f64,
        axis_limits_rad: [f64; 3],
    }

    #[test]
    fn test_load_str() {
        let params: TestParams = load_str(
            "rate_hz = 200.0\naxis_limits_rad = [0.1, 0.2, 0.3]",
        )
        .unwrap();

        assert_eq!(params.rate_hz, 200.0);
        assert_eq!(params.axis_limits_rad, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_load_str_rejects_malformed() {
        let result: Result<TestParams, LoadError> = load_str("rate_hz = \"fast\"");
        assert!(matches!(result, Err(LoadError::DeserialiseError(_))));
    }
}
