use tracing::debug;

use crate::channel::{ChannelMeasurement, CorrectedChannel};
use crate::specification::MeterSpecification;
use crate::uncertain::UncertainValue;
use crate::Result;

/// Transfers the corrected value of the reference resistor to the other channels
///
/// Each channel is corrected as
///
/// $$
///     R_x = R_s \frac{M_x}{M_s} + \epsilon
/// $$
///
/// where $R_s$ is the true value of the reference, $M_x$ and $M_s$ are the measured values and
/// $\epsilon$ is a zero-mean term standing in for the meter's rated accuracy. The standard
/// uncertainty of $\epsilon$ is the larger of the specified bounds at $M_x$ and $M_s$, not their
/// quadrature sum.
pub struct RatioTransfer<'a> {
    reference: &'a CorrectedChannel,
    specification: &'a MeterSpecification,
    reference_bound: f64,
}

impl<'a> RatioTransfer<'a> {
    /// # Errors
    /// Returns an error if the meter specification does not cover the reference's measured
    /// value.
    pub fn new(
        reference: &'a CorrectedChannel,
        specification: &'a MeterSpecification,
    ) -> Result<Self> {
        let reference_bound = specification.bound(reference.measurement.value.estimate())?;
        Ok(Self {
            reference,
            specification,
            reference_bound,
        })
    }

    /// Correct a non-reference channel
    ///
    /// # Errors
    /// Returns an error if the meter specification does not cover the channel's measured value,
    /// or if the reference's measured value is exactly zero.
    pub fn correct(&self, measurement: ChannelMeasurement) -> Result<CorrectedChannel> {
        let channel_bound = self.specification.bound(measurement.value.estimate())?;
        let bound = channel_bound.max(self.reference_bound);
        debug!(
            "{}: specification bounds {channel_bound} (channel), {} (reference), using {bound}",
            measurement.label, self.reference_bound
        );
        let specification_term = UncertainValue::zero_mean(bound, "meter specification")?;

        let ratio = (&self.reference.true_value * &measurement.value)
            .checked_div(&self.reference.measurement.value)?;
        let true_value = (&ratio + &specification_term).with_label(measurement.resistor_name.clone());

        Ok(CorrectedChannel {
            measurement,
            true_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RatioTransfer;
    use crate::calibration::correct_reference;
    use crate::calibration::tests::gigaohm_record;
    use crate::channel::{ChannelMeasurement, CorrectedChannel};
    use crate::specification::MeterSpecification;
    use crate::uncertain::UncertainValue;
    use crate::{Error, Result};

    fn measurement(
        number: usize,
        value: UncertainValue,
        temperature: UncertainValue,
        test_voltage: f64,
    ) -> ChannelMeasurement {
        ChannelMeasurement {
            channel_number: number,
            label: crate::channel::label(number),
            resistor_name: format!("R{}", number + 1),
            is_reference: number == 0,
            value,
            temperature,
            test_voltage,
            mean_timestamp: "2020/06/10 14:00:00".into(),
        }
    }

    fn reference() -> Result<CorrectedChannel> {
        let reference = measurement(
            0,
            UncertainValue::new(1e9, 1e4, 19.0, "A01 R")?,
            UncertainValue::new(25.0, 0.1, 9.0, "A01 T")?,
            10.0,
        );
        Ok(correct_reference(reference, &gigaohm_record()))
    }

    #[test]
    fn channel_value_is_scaled_by_the_reference_ratio() -> Result<()> {
        let reference = reference()?;
        let specification = MeterSpecification::default();
        let transfer = RatioTransfer::new(&reference, &specification)?;

        let value = UncertainValue::new(5e8, 1e5, 29.0, "A02 R")?;
        let channel = measurement(1, value.clone(), UncertainValue::exact(25.0), 10.0);
        let corrected = transfer.correct(channel)?;

        approx::assert_relative_eq!(
            corrected.true_value.estimate(),
            reference.true_value.estimate() * 0.5,
            max_relative = 1e-15
        );

        let ratio_only = (&reference.true_value * &value).checked_div(&reference.measurement.value)?;
        assert!(corrected.true_value.standard_uncertainty() > ratio_only.standard_uncertainty());
        assert_eq!(corrected.true_value.label(), "R2");
        Ok(())
    }

    #[test]
    fn larger_specification_bound_is_used() -> Result<()> {
        let reference = reference()?;
        let specification = MeterSpecification::default();
        let transfer = RatioTransfer::new(&reference, &specification)?;

        // Exact inputs leave only the specification term: max(8e-6 * 5e8, 8e-6 * 1e9)
        let exact_reference = CorrectedChannel {
            measurement: measurement(
                0,
                UncertainValue::exact(1e9),
                UncertainValue::exact(23.0),
                10.0,
            ),
            true_value: UncertainValue::exact(1e9),
        };
        let transfer_exact = RatioTransfer::new(&exact_reference, &specification)?;
        let channel = measurement(1, UncertainValue::exact(5e8), UncertainValue::exact(23.0), 10.0);
        let corrected = transfer_exact.correct(channel)?;
        approx::assert_relative_eq!(corrected.true_value.estimate(), 5e8);
        approx::assert_relative_eq!(
            corrected.true_value.standard_uncertainty(),
            8e3,
            max_relative = 1e-12
        );
        assert!(corrected.true_value.degrees_of_freedom().is_infinite());

        // A channel in a less accurate band dominates the reference's bound
        let channel = measurement(2, UncertainValue::exact(1e15), UncertainValue::exact(23.0), 10.0);
        let corrected = transfer.correct(channel)?;
        let ratio_variance = (reference.true_value.standard_uncertainty() * 1e15 / 1e9).powi(2)
            + (1e15 * 1e4 / 1e9 * reference.true_value.estimate() / 1e9).powi(2);
        approx::assert_relative_eq!(
            corrected.true_value.standard_uncertainty(),
            (8e-4f64 * 1e15).hypot(ratio_variance.sqrt()),
            max_relative = 1e-9
        );
        Ok(())
    }

    #[test]
    fn channels_outside_the_specification_fail() -> Result<()> {
        let reference = reference()?;
        let specification = MeterSpecification::default();
        let transfer = RatioTransfer::new(&reference, &specification)?;

        let channel = measurement(1, UncertainValue::exact(10.0), UncertainValue::exact(23.0), 10.0);
        assert!(matches!(
            transfer.correct(channel),
            Err(Error::SpecificationOutOfRange(_))
        ));
        Ok(())
    }

    #[test]
    fn zero_reference_reading_is_rejected() -> Result<()> {
        let specification = MeterSpecification::new(vec![crate::specification::Band {
            lower: -1.0,
            upper: 1e12,
            rule: crate::specification::Rule::Fixed,
            coefficient: 1.0,
        }])?;
        let reference = CorrectedChannel {
            measurement: measurement(0, UncertainValue::exact(0.0), UncertainValue::exact(23.0), 10.0),
            true_value: UncertainValue::exact(1e9),
        };
        let transfer = RatioTransfer::new(&reference, &specification)?;

        let channel = measurement(1, UncertainValue::exact(5e8), UncertainValue::exact(23.0), 10.0);
        assert!(matches!(transfer.correct(channel), Err(Error::DivisionByZero)));
        Ok(())
    }
}
