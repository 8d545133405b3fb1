use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Result;

/// Raw samples captured on one scanner channel
///
/// The temperature log is sampled on its own schedule, so `temperatures` and `resistances`
/// generally differ in length.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ChannelTrace {
    #[serde(rename = "R_name")]
    pub resistor_name: String,
    #[serde(rename = "R_vals")]
    pub resistances: Vec<f64>,
    pub temperatures: Vec<f64>,
    #[serde(rename = "V_test")]
    pub test_voltage: f64,
    pub times: Vec<String>,
}

/// Everything captured during one acquisition run, keyed by channel label
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RawTrace {
    #[serde(rename = "ambient_T")]
    pub ambient_temperature: Vec<f64>,
    #[serde(rename = "ambient_RH")]
    pub ambient_humidity: Vec<f64>,
    #[serde(flatten)]
    pub channels: BTreeMap<String, ChannelTrace>,
}

impl RawTrace {
    /// Read a raw trace from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not hold a complete trace.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let trace: Self = serde_json::from_str(&contents)?;
        info!("read {} channel trace(s) from {path:?}", trace.channels.len());
        Ok(trace)
    }

    /// Write the trace as indented JSON
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("wrote {} channel trace(s) to {path:?}", self.channels.len());
        Ok(())
    }
}
