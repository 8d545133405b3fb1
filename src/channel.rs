use serde::ser::Serializer;
use serde::Serialize;

use crate::estimate::{estimate, mean_timestamp};
use crate::trace::ChannelTrace;
use crate::uncertain::UncertainValue;
use crate::{Error, Result};

/// Number of channels on the scanner
pub const MAX_CHANNELS: usize = 16;

/// The label of a zero-based scanner channel: `0 -> "A01"`, `15 -> "A16"`
#[must_use]
pub fn label(number: usize) -> String {
    format!("A{:02}", number + 1)
}

/// The zero-based scanner channel of a label: `"A01" -> 0`
///
/// # Errors
/// Returns [`Error::InvalidChannelLabel`] if `label` does not name a scanner channel.
pub fn number(label: &str) -> Result<usize> {
    let invalid = || Error::InvalidChannelLabel(label.to_owned());
    let one_based: usize = label
        .strip_prefix('A')
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| invalid())?;

    if one_based == 0 || one_based > MAX_CHANNELS {
        return Err(invalid());
    }
    Ok(one_based - 1)
}

/// The reduced measurement of one scanner channel
#[derive(Clone, Debug)]
pub struct ChannelMeasurement {
    pub channel_number: usize,
    pub label: String,
    pub resistor_name: String,
    pub is_reference: bool,
    pub value: UncertainValue,
    pub temperature: UncertainValue,
    pub test_voltage: f64,
    pub mean_timestamp: String,
}

impl ChannelMeasurement {
    /// Reduce the raw trace of the channel labelled `label`
    ///
    /// # Errors
    /// Returns an error if the label is not a scanner channel, or the resistance, temperature
    /// or time series cannot be reduced.
    pub fn from_trace(label: &str, trace: &ChannelTrace, is_reference: bool) -> Result<Self> {
        Ok(Self {
            channel_number: number(label)?,
            label: label.to_owned(),
            resistor_name: trace.resistor_name.clone(),
            is_reference,
            value: estimate(&trace.resistances, format!("{label} R"))?,
            temperature: estimate(&trace.temperatures, format!("{label} T"))?,
            test_voltage: trace.test_voltage,
            mean_timestamp: mean_timestamp(&trace.times)?,
        })
    }
}

/// A channel measurement with the corrected value of its resistor attached
#[derive(Clone, Debug)]
pub struct CorrectedChannel {
    pub measurement: ChannelMeasurement,
    pub true_value: UncertainValue,
}

#[derive(Serialize)]
struct CorrectedChannelRecord<'a> {
    chan_no: usize,
    name: &'a str,
    reference: bool,
    #[serde(rename = "value(meas)")]
    measured: &'a UncertainValue,
    value: &'a UncertainValue,
    #[serde(rename = "Temp")]
    temperature: &'a UncertainValue,
    #[serde(rename = "V_test")]
    test_voltage: f64,
    time: &'a str,
}

impl Serialize for CorrectedChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let measurement = &self.measurement;
        CorrectedChannelRecord {
            chan_no: measurement.channel_number,
            name: &measurement.resistor_name,
            reference: measurement.is_reference,
            measured: &measurement.value,
            value: &self.true_value,
            temperature: &measurement.temperature,
            test_voltage: measurement.test_voltage,
            time: &measurement.mean_timestamp,
        }
        .serialize(serializer)
    }
}
