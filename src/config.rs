use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::channel::MAX_CHANNELS;
use crate::codec::optional_quantity;
use crate::specification::MeterSpecification;
use crate::uncertain::UncertainValue;
use crate::{Error, Result};

/// What to do when a channel names a temperature probe the instrument database lacks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbePolicy {
    /// Log the problem and carry on
    #[default]
    Warn,
    /// Abort the run
    Fail,
}

/// Locations of the files an analysis reads and writes, relative to the working directory
///
/// The instrument database and the CSV report are only used when named.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Files {
    pub trace: PathBuf,
    pub resistors: PathBuf,
    pub instruments: Option<PathBuf>,
    pub results: PathBuf,
    pub report: Option<PathBuf>,
}

impl Default for Files {
    fn default() -> Self {
        Self {
            trace: "T-Ohm_Measurements.json".into(),
            resistors: "T-Ohm_Resistors.json".into(),
            instruments: None,
            results: "T-Ohm_Results.json".into(),
            report: None,
        }
    }
}

/// The resistor and temperature probe wired to a scanner channel
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChannelAssignment {
    pub number: usize,
    pub resistor: String,
    pub probe: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Zero-based scanner channel of the reference resistor
    pub reference_channel: usize,
    #[serde(default)]
    pub probe_policy: ProbePolicy,
    #[serde(default)]
    pub files: Files,
    #[serde(default)]
    pub channels: Vec<ChannelAssignment>,
    #[serde(default)]
    pub meter_specification: MeterSpecification,
}

impl Config {
    #[must_use]
    pub fn new(reference_channel: usize) -> Self {
        Self {
            reference_channel,
            probe_policy: ProbePolicy::default(),
            files: Files::default(),
            channels: vec![],
            meter_specification: MeterSpecification::default(),
        }
    }

    /// Read and validate a configuration from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        info!("read configuration from {path:?}");
        Ok(config)
    }

    /// # Errors
    /// Returns [`Error::Configuration`] if a channel number is out of range or assigned twice,
    /// or the meter specification is malformed.
    pub fn validate(&self) -> Result<()> {
        if self.reference_channel >= MAX_CHANNELS {
            return Err(Error::Configuration(format!(
                "reference channel {} is not one of the {MAX_CHANNELS} scanner channels",
                self.reference_channel
            )));
        }

        let mut seen = BTreeSet::new();
        for assignment in &self.channels {
            if assignment.number >= MAX_CHANNELS {
                return Err(Error::Configuration(format!(
                    "channel {} is not one of the {MAX_CHANNELS} scanner channels",
                    assignment.number
                )));
            }
            if !seen.insert(assignment.number) {
                return Err(Error::Configuration(format!(
                    "channel {} is assigned more than once",
                    assignment.number
                )));
            }
        }

        self.meter_specification.validate()
    }

    /// Check every assigned temperature probe is present in the instrument database
    ///
    /// Returns the channels whose probe is unknown when the policy is [`ProbePolicy::Warn`].
    ///
    /// # Errors
    /// Returns [`Error::UnknownProbe`] for the first unknown probe when the policy is
    /// [`ProbePolicy::Fail`].
    pub fn check_probes(&self, instruments: &InstrumentDatabase) -> Result<Vec<usize>> {
        let mut unknown = vec![];
        for assignment in &self.channels {
            if instruments.contains(&assignment.probe) {
                info!("{}: OK", assignment.probe);
                continue;
            }

            match self.probe_policy {
                ProbePolicy::Warn => {
                    warn!(
                        "unknown temperature probe {} specified for channel {}",
                        assignment.probe, assignment.number
                    );
                    unknown.push(assignment.number);
                }
                ProbePolicy::Fail => {
                    return Err(Error::UnknownProbe {
                        channel: assignment.number,
                        probe: assignment.probe.clone(),
                    })
                }
            }
        }
        Ok(unknown)
    }
}

/// An entry of the instrument database
///
/// Only the correction terms are interpreted here; bus addresses and other settings used by the
/// acquisition side are kept verbatim.
#[derive(Clone, Debug, Deserialize)]
pub struct InstrumentRecord {
    #[serde(
        rename = "T_correction",
        default,
        deserialize_with = "optional_quantity"
    )]
    pub temperature_correction: Option<UncertainValue>,
    #[serde(
        rename = "RH_correction",
        default,
        deserialize_with = "optional_quantity"
    )]
    pub humidity_correction: Option<UncertainValue>,
    #[serde(flatten)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

/// Instruments and probes keyed by name
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct InstrumentDatabase {
    records: BTreeMap<String, InstrumentRecord>,
}

impl InstrumentDatabase {
    /// Read an instrument database from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let database: Self = serde_json::from_str(&contents)?;
        info!("read {} instrument record(s) from {path:?}", database.records.len());
        Ok(database)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&InstrumentRecord> {
        self.records.get(name)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Config, InstrumentDatabase, ProbePolicy};
    use crate::{Error, Result};

    const CONFIG: &str = r#"
        reference_channel = 0
        probe_policy = "fail"

        [files]
        trace = "raw.json"
        instruments = "T-Ohm_Instruments.json"
        report = "report.csv"

        [[channels]]
        number = 0
        resistor = "CHANGEME 1G"
        probe = "GMH_1"

        [[channels]]
        number = 1
        resistor = "CHANGEME 500M"
        probe = "GMH_2"
    "#;

    fn instruments() -> Result<InstrumentDatabase> {
        Ok(serde_json::from_value(json!({
            "G6530": {"str_addr": "GPIB0::4::INSTR"},
            "GMH_1": {
                "addr": 5,
                "T_correction": {"__ureal__": true, "value": -0.02, "uncert": 0.01, "dof": 8, "label": "GMH_1"}
            }
        }))?)
    }

    #[test]
    fn configuration_is_read_with_defaults() -> Result<()> {
        let config: Config = toml::from_str(CONFIG)?;
        config.validate()?;

        assert_eq!(config.reference_channel, 0);
        assert_eq!(config.probe_policy, ProbePolicy::Fail);
        assert_eq!(config.files.trace.to_str(), Some("raw.json"));
        assert_eq!(config.files.resistors.to_str(), Some("T-Ohm_Resistors.json"));
        assert_eq!(
            config.files.instruments.as_deref().and_then(|path| path.to_str()),
            Some("T-Ohm_Instruments.json")
        );
        assert_eq!(config.channels.len(), 2);
        assert!(config.meter_specification.bound(1e9).is_ok());
        Ok(())
    }

    #[test]
    fn instrument_database_is_unused_unless_named() -> Result<()> {
        let config: Config = toml::from_str(
            r#"
            reference_channel = 0

            [files]
            trace = "raw.json"
        "#,
        )?;
        assert!(config.files.instruments.is_none());
        assert!(config.files.report.is_none());
        assert!(Config::new(3).files.instruments.is_none());
        Ok(())
    }

    #[test]
    fn out_of_range_or_duplicate_channels_are_rejected() -> Result<()> {
        let mut config: Config = toml::from_str(CONFIG)?;
        config.reference_channel = 16;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config: Config = toml::from_str(CONFIG)?;
        config.channels[1].number = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        Ok(())
    }

    #[test]
    fn unknown_probes_fail_under_the_fail_policy() -> Result<()> {
        let config: Config = toml::from_str(CONFIG)?;
        let result = config.check_probes(&instruments()?);
        assert!(matches!(
            result,
            Err(Error::UnknownProbe { channel: 1, ref probe }) if probe == "GMH_2"
        ));
        Ok(())
    }

    #[test]
    fn unknown_probes_are_reported_under_the_warn_policy() -> Result<()> {
        let mut config: Config = toml::from_str(CONFIG)?;
        config.probe_policy = ProbePolicy::Warn;
        assert_eq!(config.check_probes(&instruments()?)?, vec![1]);
        Ok(())
    }

    #[test]
    fn instrument_corrections_are_decoded() -> Result<()> {
        let instruments = instruments()?;
        let probe = instruments.get("GMH_1").expect("probe present");
        let correction = probe.temperature_correction.as_ref().expect("correction present");
        approx::assert_relative_eq!(correction.estimate(), -0.02);
        assert!(probe.humidity_correction.is_none());
        assert_eq!(probe.settings["addr"], json!(5));
        Ok(())
    }
}
