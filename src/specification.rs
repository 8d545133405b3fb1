use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::uncertain::UncertainValue;
use crate::{Error, Result};

/// How a band turns a resistance into a specified uncertainty
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rule {
    /// `coefficient * R`
    Proportional,
    /// `coefficient`, independent of `R`
    Fixed,
}

/// One range of the meter's accuracy table, covering `(lower, upper]` Ohm
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Band {
    pub lower: f64,
    pub upper: f64,
    pub rule: Rule,
    pub coefficient: f64,
}

impl Band {
    const fn proportional(lower: f64, upper: f64, coefficient: f64) -> Self {
        Self {
            lower,
            upper,
            rule: Rule::Proportional,
            coefficient,
        }
    }

    fn contains(&self, resistance: f64) -> bool {
        self.lower < resistance && resistance <= self.upper
    }

    fn bound(&self, resistance: f64) -> f64 {
        match self.rule {
            Rule::Proportional => self.coefficient * resistance,
            Rule::Fixed => self.coefficient,
        }
    }
}

/// The rated accuracy of a resistance meter as a piecewise table
///
/// The bound returned for a resistance is used as the standard uncertainty of a zero-centred
/// term with infinite degrees of freedom: it is a specification limit, not a statistical
/// estimate.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MeterSpecification {
    bands: Vec<Band>,
}

impl Default for MeterSpecification {
    fn default() -> Self {
        Self::guildline_6530()
    }
}

impl MeterSpecification {
    /// The accuracy table of the Guildline 6530 tera-ohmmeter
    #[must_use]
    pub fn guildline_6530() -> Self {
        Self {
            bands: vec![
                Band::proportional(9e4, 2e5, 4e-5),
                Band::proportional(2e5, 2e9, 8e-6),
                Band::proportional(2e9, 2e10, 1e-5),
                Band::proportional(2e10, 2e11, 1.5e-5),
                Band {
                    lower: 2e11,
                    upper: 2e12,
                    rule: Rule::Fixed,
                    coefficient: 5e-5,
                },
                Band::proportional(2e12, 2e13, 1.2e-4),
                Band::proportional(2e13, 2e14, 2e-4),
                Band::proportional(2e14, 2e15, 8e-4),
                Band::proportional(2e15, 2e16, 2e-3),
            ],
        }
    }

    /// Build a table from bands, checking they are well formed and do not overlap
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the table is empty, a band is empty or inverted, a
    /// coefficient is negative, or two bands overlap.
    pub fn new(bands: Vec<Band>) -> Result<Self> {
        let specification = Self { bands };
        specification.validate()?;
        Ok(specification)
    }

    /// # Errors
    /// See [`MeterSpecification::new`].
    pub fn validate(&self) -> Result<()> {
        if self.bands.is_empty() {
            return Err(Error::Configuration(
                "meter specification has no bands".into(),
            ));
        }

        for band in &self.bands {
            if !(band.lower < band.upper) {
                return Err(Error::Configuration(format!(
                    "meter specification band ({}, {}] is empty",
                    band.lower, band.upper
                )));
            }
            if !(band.coefficient >= 0.0) {
                return Err(Error::Configuration(format!(
                    "meter specification band ({}, {}] has negative coefficient {}",
                    band.lower, band.upper, band.coefficient
                )));
            }
        }

        let sorted = self
            .bands
            .iter()
            .sorted_by(|a, b| a.lower.total_cmp(&b.lower))
            .collect::<Vec<_>>();
        for (below, above) in sorted.into_iter().tuple_windows() {
            if above.lower < below.upper {
                return Err(Error::Configuration(format!(
                    "meter specification bands ({}, {}] and ({}, {}] overlap",
                    below.lower, below.upper, above.lower, above.upper
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// The specified uncertainty bound for a nominal resistance in Ohm
    ///
    /// # Errors
    /// Returns [`Error::SpecificationOutOfRange`] if no band covers `resistance`.
    pub fn bound(&self, resistance: f64) -> Result<f64> {
        let magnitude = resistance.abs();
        self.bands
            .iter()
            .find(|band| band.contains(magnitude))
            .map(|band| band.bound(magnitude))
            .ok_or(Error::SpecificationOutOfRange(resistance))
    }

    /// A zero-centred value whose standard uncertainty is the specified bound
    ///
    /// # Errors
    /// Returns [`Error::SpecificationOutOfRange`] if no band covers `resistance`.
    pub fn uncertainty(&self, resistance: f64) -> Result<UncertainValue> {
        UncertainValue::zero_mean(self.bound(resistance)?, "meter specification")
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::{Band, MeterSpecification, Rule};
    use crate::{Error, Result};

    #[test]
    fn tabulated_bounds_are_reproduced() -> Result<()> {
        let specification = MeterSpecification::default();

        approx::assert_relative_eq!(specification.bound(1e5)?, 4.0, max_relative = 1e-12);
        approx::assert_relative_eq!(specification.bound(1e10)?, 1e5, max_relative = 1e-12);
        approx::assert_relative_eq!(specification.bound(1e9)?, 8e3, max_relative = 1e-12);
        approx::assert_relative_eq!(specification.bound(1e14)?, 2e10, max_relative = 1e-12);
        Ok(())
    }

    #[test]
    fn band_edges_are_open_below_and_closed_above() -> Result<()> {
        let specification = MeterSpecification::default();

        approx::assert_relative_eq!(specification.bound(2e5)?, 8.0, max_relative = 1e-12);
        approx::assert_relative_eq!(
            specification.bound(2.000_001e5)?,
            8e-6 * 2.000_001e5,
            max_relative = 1e-12
        );
        assert!(specification.bound(9e4).is_err());
        assert!(specification.bound(2e16).is_ok());
        Ok(())
    }

    #[test]
    fn fixed_band_ignores_resistance() -> Result<()> {
        let specification = MeterSpecification::default();
        approx::assert_relative_eq!(specification.bound(5e11)?, 5e-5);
        approx::assert_relative_eq!(specification.bound(2e12)?, 5e-5);
        Ok(())
    }

    #[test]
    fn resistances_outside_the_table_are_rejected() {
        let specification = MeterSpecification::default();
        assert!(matches!(
            specification.bound(1e1),
            Err(Error::SpecificationOutOfRange(_))
        ));
        assert!(matches!(
            specification.bound(3e16),
            Err(Error::SpecificationOutOfRange(_))
        ));
        assert!(specification.bound(f64::NAN).is_err());
    }

    #[test]
    fn uncertainty_term_is_zero_centred_with_infinite_dof() -> Result<()> {
        let term = MeterSpecification::default().uncertainty(1e9)?;
        approx::assert_relative_eq!(term.estimate(), 0.0);
        approx::assert_relative_eq!(term.standard_uncertainty(), 8e3, max_relative = 1e-12);
        assert!(term.degrees_of_freedom().is_infinite());
        Ok(())
    }

    #[test]
    fn overlapping_or_inverted_bands_are_rejected() {
        let overlapping = vec![
            Band {
                lower: 1e5,
                upper: 1e7,
                rule: Rule::Proportional,
                coefficient: 1e-5,
            },
            Band {
                lower: 1e6,
                upper: 1e8,
                rule: Rule::Proportional,
                coefficient: 1e-5,
            },
        ];
        assert!(MeterSpecification::new(overlapping).is_err());

        let inverted = vec![Band {
            lower: 1e7,
            upper: 1e5,
            rule: Rule::Fixed,
            coefficient: 1.0,
        }];
        assert!(MeterSpecification::new(inverted).is_err());
        assert!(MeterSpecification::new(vec![]).is_err());
        assert!(MeterSpecification::guildline_6530().validate().is_ok());
    }

    #[derive(Deserialize)]
    struct Wrapper {
        meter_specification: MeterSpecification,
    }

    #[test]
    fn table_can_be_read_from_toml() -> Result<()> {
        let wrapper: Wrapper = toml::from_str(
            r#"
            [[meter_specification]]
            lower = 1e3
            upper = 1e6
            rule = "proportional"
            coefficient = 1e-4

            [[meter_specification]]
            lower = 1e6
            upper = 1e9
            rule = "fixed"
            coefficient = 250.0
            "#,
        )?;
        let specification = wrapper.meter_specification;
        specification.validate()?;

        approx::assert_relative_eq!(specification.bound(1e4)?, 1.0, max_relative = 1e-12);
        approx::assert_relative_eq!(specification.bound(1e8)?, 250.0);
        Ok(())
    }
}
