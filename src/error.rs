//! Error taxonomy for the reduction pipeline.
//!
//! Every failure the pipeline can report has a named variant. Loading failures wrap the
//! underlying I/O or parse error, numeric degeneracies carry the offending value, and a failure
//! while correcting the reference channel is wrapped in [`Error::ReferenceChannel`] because
//! every other channel depends on it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown temperature probe {probe} specified for channel {channel}")]
    UnknownProbe { channel: usize, probe: String },

    #[error("Input data error: {0}")]
    InputData(String),

    #[error("Specification out of range: no meter band covers {0} Ohm")]
    SpecificationOutOfRange(f64),

    #[error("Division by zero magnitude")]
    DivisionByZero,

    #[error("Cannot estimate from an empty sample")]
    EmptySample,

    #[error("Insufficient samples: {0} sample(s) leave no degrees of freedom")]
    InsufficientSamples(usize),

    #[error("Invalid standard uncertainty {0}: must be finite and non-negative")]
    InvalidUncertainty(f64),

    #[error("Invalid degrees of freedom {0}: must be positive")]
    InvalidDegreesOfFreedom(f64),

    #[error("No calibration record for resistor {0}")]
    UnknownResistor(String),

    #[error("Invalid channel label {0}")]
    InvalidChannelLabel(String),

    #[error("Invalid timestamp {0}")]
    InvalidTimestamp(String),

    #[error("Reference channel {label} could not be corrected: {source}")]
    ReferenceChannel {
        label: String,
        #[source]
        source: Box<Error>,
    },
}
