use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::channel::{ChannelMeasurement, CorrectedChannel};
use crate::codec::{optional_quantity, quantity};
use crate::uncertain::UncertainValue;
use crate::{Error, Result};

/// Which of the two calibration sets of a resistor applies to a test
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoltageSet {
    Low,
    High,
}

/// The stored characteristics of a calibrated reference resistor
///
/// Each resistor is calibrated at a low and a high test voltage. Any numeric field may be stored
/// either as a tagged uncertain value or as a plain number, in which case it is exact.
#[derive(Clone, Debug, Deserialize)]
pub struct CalibrationRecord {
    #[serde(rename = "R0_LV", deserialize_with = "quantity")]
    pub nominal_value_low_voltage: UncertainValue,
    #[serde(rename = "R0_HV", deserialize_with = "quantity")]
    pub nominal_value_high_voltage: UncertainValue,
    #[serde(rename = "TRef_LV", deserialize_with = "quantity")]
    pub reference_temperature_low: UncertainValue,
    #[serde(rename = "TRef_HV", deserialize_with = "quantity")]
    pub reference_temperature_high: UncertainValue,
    #[serde(rename = "VRef_LV", deserialize_with = "quantity")]
    pub reference_voltage_low: UncertainValue,
    #[serde(rename = "VRef_HV", deserialize_with = "quantity")]
    pub reference_voltage_high: UncertainValue,
    /// Linear temperature coefficient, 1/°C
    #[serde(deserialize_with = "quantity")]
    pub alpha: UncertainValue,
    /// Quadratic temperature coefficient, 1/°C². Absent means nil.
    #[serde(default, deserialize_with = "optional_quantity")]
    pub beta: Option<UncertainValue>,
    /// Voltage coefficient, 1/V
    #[serde(deserialize_with = "quantity")]
    pub gamma: UncertainValue,
}

/// The calibration values that apply at a particular test voltage
#[derive(Clone, Copy, Debug)]
pub struct CalibrationPoint<'a> {
    pub set: VoltageSet,
    pub nominal_value: &'a UncertainValue,
    pub reference_temperature: &'a UncertainValue,
    pub reference_voltage: &'a UncertainValue,
}

impl CalibrationRecord {
    /// Choose the calibration set whose reference voltage is nearest `test_voltage`
    ///
    /// Equidistant voltages select the high-voltage set.
    #[must_use]
    pub fn select(&self, test_voltage: f64) -> CalibrationPoint<'_> {
        let low_distance = (self.reference_voltage_low.estimate() - test_voltage).abs();
        let high_distance = (self.reference_voltage_high.estimate() - test_voltage).abs();

        if low_distance >= high_distance {
            CalibrationPoint {
                set: VoltageSet::High,
                nominal_value: &self.nominal_value_high_voltage,
                reference_temperature: &self.reference_temperature_high,
                reference_voltage: &self.reference_voltage_high,
            }
        } else {
            CalibrationPoint {
                set: VoltageSet::Low,
                nominal_value: &self.nominal_value_low_voltage,
                reference_temperature: &self.reference_temperature_low,
                reference_voltage: &self.reference_voltage_low,
            }
        }
    }

    /// The value of the resistor at the conditions of a test
    ///
    /// $$
    ///     R = R_0 \left(1 + \alpha \Delta T + \beta \Delta T^2 + \gamma \Delta V\right)
    /// $$
    ///
    /// where $\Delta T$ and $\Delta V$ are measured relative to the reference conditions of the
    /// selected calibration set. Calibration uncertainties propagate into the result.
    #[must_use]
    pub fn true_value(&self, temperature: &UncertainValue, test_voltage: f64) -> UncertainValue {
        let point = self.select(test_voltage);
        debug!("using {:?} calibration set", point.set);

        let delta_t = temperature - point.reference_temperature;
        let delta_v = test_voltage - point.reference_voltage;

        let mut factor = &(1.0 + &(&self.alpha * &delta_t)) + &(&self.gamma * &delta_v);
        if let Some(beta) = &self.beta {
            factor = &factor + &(&(beta * &delta_t) * &delta_t);
        }

        point.nominal_value * &factor
    }
}

/// Correct the reference channel to the conditions of its test
#[must_use]
pub fn correct_reference(
    reference: ChannelMeasurement,
    record: &CalibrationRecord,
) -> CorrectedChannel {
    let true_value = record
        .true_value(&reference.temperature, reference.test_voltage)
        .with_label(reference.resistor_name.clone());
    info!(
        "reference {} ({}) true value {true_value}",
        reference.label, reference.resistor_name
    );
    CorrectedChannel {
        measurement: reference,
        true_value,
    }
}

/// Calibration records keyed by resistor name
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct CalibrationDatabase {
    records: BTreeMap<String, CalibrationRecord>,
}

impl CalibrationDatabase {
    /// Read a calibration database from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or any record is malformed. A missing file is
    /// never treated as an empty database.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let database: Self = serde_json::from_str(&contents)?;
        info!(
            "read {} calibration record(s) from {path:?}",
            database.records.len()
        );
        Ok(database)
    }

    pub fn insert(&mut self, name: impl Into<String>, record: CalibrationRecord) {
        self.records.insert(name.into(), record);
    }

    /// # Errors
    /// Returns [`Error::UnknownResistor`] if there is no record for `name`.
    pub fn get(&self, name: &str) -> Result<&CalibrationRecord> {
        self.records
            .get(name)
            .ok_or_else(|| Error::UnknownResistor(name.to_owned()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
