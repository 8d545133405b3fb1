use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::calibration::{correct_reference, CalibrationDatabase};
use crate::channel::{self, ChannelMeasurement, CorrectedChannel};
use crate::config::{Config, InstrumentDatabase};
use crate::estimate::estimate;
use crate::specification::MeterSpecification;
use crate::trace::RawTrace;
use crate::transfer::RatioTransfer;
use crate::uncertain::UncertainValue;
use crate::{Error, Result};

/// The outcome of reducing one acquisition run
///
/// Serializes to a single map holding `ambient_T`, `ambient_RH` and one entry per corrected
/// channel label. Failures and unknown probes are not serialized.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisResult {
    #[serde(rename = "ambient_T")]
    pub ambient_temperature: UncertainValue,
    #[serde(rename = "ambient_RH")]
    pub ambient_humidity: UncertainValue,
    /// Corrected channels keyed by label, the reference included
    #[serde(flatten)]
    pub channels: BTreeMap<String, CorrectedChannel>,
    /// Channels that could not be corrected, with the reason
    #[serde(skip)]
    pub failures: BTreeMap<String, String>,
    /// Channels whose temperature probe is missing from the instrument database
    #[serde(skip)]
    pub unknown_probes: Vec<usize>,
}

fn reference_failure(label: &str, source: Error) -> Error {
    Error::ReferenceChannel {
        label: label.to_owned(),
        source: Box::new(source),
    }
}

/// Reduce a raw trace to corrected resistances
///
/// The reference channel is corrected from its calibration record, then every other channel
/// is corrected relative to it. A channel that fails is recorded in
/// [`AnalysisResult::failures`] and does not stop the others.
///
/// # Errors
/// Returns an error if the ambient series cannot be reduced, or if the reference channel is
/// missing or cannot be corrected.
pub fn analyse(
    trace: &RawTrace,
    calibration: &CalibrationDatabase,
    reference_channel: usize,
    specification: &MeterSpecification,
) -> Result<AnalysisResult> {
    let ambient_temperature = estimate(&trace.ambient_temperature, "ambient_T")?;
    let ambient_humidity = estimate(&trace.ambient_humidity, "ambient_RH")?;
    info!("ambient temperature {ambient_temperature}, relative humidity {ambient_humidity}");

    let reference_label = channel::label(reference_channel);
    let reference_trace = trace.channels.get(&reference_label).ok_or_else(|| {
        reference_failure(
            &reference_label,
            Error::InputData("no trace for the reference channel".into()),
        )
    })?;
    let reference = ChannelMeasurement::from_trace(&reference_label, reference_trace, true)
        .and_then(|measurement| {
            let record = calibration.get(&measurement.resistor_name)?;
            Ok(correct_reference(measurement, record))
        })
        .map_err(|e| reference_failure(&reference_label, e))?;

    let mut channels = BTreeMap::new();
    let mut failures = BTreeMap::new();
    {
        let transfer = RatioTransfer::new(&reference, specification)
            .map_err(|e| reference_failure(&reference_label, e))?;

        for (label, channel_trace) in &trace.channels {
            let corrected = match channel::number(label) {
                Ok(number) if number == reference_channel => continue,
                Ok(_) => ChannelMeasurement::from_trace(label, channel_trace, false)
                    .and_then(|measurement| transfer.correct(measurement)),
                Err(e) => Err(e),
            };

            match corrected {
                Ok(corrected) => {
                    info!(
                        "{label} ({}) corrected value {}",
                        corrected.measurement.resistor_name, corrected.true_value
                    );
                    channels.insert(label.clone(), corrected);
                }
                Err(e) => {
                    warn!("skipping channel {label}: {e}");
                    failures.insert(label.clone(), e.to_string());
                }
            }
        }
    }
    channels.insert(reference_label, reference);

    Ok(AnalysisResult {
        ambient_temperature,
        ambient_humidity,
        channels,
        failures,
        unknown_probes: vec![],
    })
}

#[derive(Serialize)]
struct ReportRow<'a> {
    channel: &'a str,
    resistor: &'a str,
    reference: bool,
    value: f64,
    uncertainty: f64,
    dof: String,
    temperature: f64,
    test_voltage: f64,
    time: &'a str,
}

fn format_dof(value: &UncertainValue) -> String {
    if value.has_infinite_dof() {
        "inf".into()
    } else {
        format!("{:.1}", value.degrees_of_freedom())
    }
}

impl AnalysisResult {
    /// Write the result as indented JSON, uncertain values in their tagged form
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("wrote results for {} channel(s) to {path:?}", self.channels.len());
        Ok(())
    }

    /// Write a one-row-per-channel CSV summary
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_report(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for (label, channel) in &self.channels {
            let measurement = &channel.measurement;
            writer.serialize(ReportRow {
                channel: label,
                resistor: &measurement.resistor_name,
                reference: measurement.is_reference,
                value: channel.true_value.estimate(),
                uncertainty: channel.true_value.standard_uncertainty(),
                dof: format_dof(&channel.true_value),
                temperature: measurement.temperature.estimate(),
                test_voltage: measurement.test_voltage,
                time: &measurement.mean_timestamp,
            })?;
        }
        writer.flush()?;
        info!("wrote report to {path:?}");
        Ok(())
    }
}

/// Run a complete analysis in `working_directory`
///
/// Checks the configured temperature probes against the instrument database (if one is named),
/// reads the raw trace and calibration database, reduces the trace and writes the results (and
/// the report, if configured). Channels with unknown probes are kept in
/// [`AnalysisResult::unknown_probes`].
///
/// # Errors
/// Returns an error if any input cannot be read, probe validation fails under
/// [`crate::config::ProbePolicy::Fail`], the analysis fails, or an output cannot be written.
pub fn run(working_directory: &Path, config: &Config) -> Result<AnalysisResult> {
    config.validate()?;
    let files = &config.files;

    let unknown_probes = match &files.instruments {
        Some(instruments) => {
            let instruments = InstrumentDatabase::from_file(&working_directory.join(instruments))?;
            config.check_probes(&instruments)?
        }
        None => vec![],
    };

    let trace = RawTrace::from_file(&working_directory.join(&files.trace))?;
    for assignment in &config.channels {
        let label = channel::label(assignment.number);
        match trace.channels.get(&label) {
            Some(channel_trace) if channel_trace.resistor_name != assignment.resistor => warn!(
                "channel {label} is assigned {} but the trace records {}",
                assignment.resistor, channel_trace.resistor_name
            ),
            Some(_) => {}
            None => warn!("channel {label} is assigned but has no trace"),
        }
    }

    let calibration = CalibrationDatabase::from_file(&working_directory.join(&files.resistors))?;
    let mut result = analyse(
        &trace,
        &calibration,
        config.reference_channel,
        &config.meter_specification,
    )?;
    result.unknown_probes = unknown_probes;

    result.to_file(&working_directory.join(&files.results))?;
    if let Some(report) = &files.report {
        result.write_report(&working_directory.join(report))?;
    }

    Ok(result)
}
