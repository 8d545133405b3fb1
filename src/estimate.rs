use chrono::{DateTime, NaiveDateTime};
use ndarray::ArrayView1;
use num_traits::{Float, FromPrimitive};

use crate::uncertain::UncertainValue;
use crate::{Error, Result};

/// Format of the timestamps recorded alongside each trace sample
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Reduce a sequence of raw samples to an uncertain value
///
/// The estimate is the arithmetic mean, the standard uncertainty is the experimental standard
/// deviation of the mean $s / \sqrt{n}$ and the degrees of freedom are $n - 1$.
///
/// A single sample carries no information about its own dispersion and would have zero degrees
/// of freedom, so it is rejected rather than reported with a nil uncertainty.
///
/// # Errors
/// - [`Error::EmptySample`] if `samples` is empty
/// - [`Error::InsufficientSamples`] if `samples` holds exactly one value
/// - [`Error::InputData`] if the statistics cannot be represented as `f64`
pub fn estimate<A: Float + FromPrimitive>(
    samples: &[A],
    label: impl Into<String>,
) -> Result<UncertainValue> {
    let n = samples.len();
    match n {
        0 => return Err(Error::EmptySample),
        1 => return Err(Error::InsufficientSamples(1)),
        _ => {}
    }

    let samples = ArrayView1::from(samples);
    let mean = samples.mean().ok_or(Error::EmptySample)?;
    let standard_deviation = samples.std(A::one());
    let count = A::from_usize(n).ok_or_else(|| overflow(n))?;
    let standard_uncertainty = standard_deviation / count.sqrt();

    let to_f64 = |value: A| value.to_f64().ok_or_else(|| overflow(n));
    let dof = A::from_usize(n - 1).ok_or_else(|| overflow(n))?;

    UncertainValue::new(
        to_f64(mean)?,
        to_f64(standard_uncertainty)?,
        to_f64(dof)?,
        label,
    )
}

fn overflow(n: usize) -> Error {
    Error::InputData(format!("statistics of {n} samples are not representable"))
}

/// The mean of a sequence of timestamps, truncated to whole seconds
///
/// Timestamps are read and written in [`TIMESTAMP_FORMAT`] and treated as naive wall-clock
/// times, so the result does not depend on the local timezone.
///
/// # Errors
/// Returns an error if `times` is empty or any entry does not parse.
pub fn mean_timestamp<S: AsRef<str>>(times: &[S]) -> Result<String> {
    if times.is_empty() {
        return Err(Error::EmptySample);
    }

    let mut total: i64 = 0;
    for time in times {
        let time = time.as_ref();
        let parsed = NaiveDateTime::parse_from_str(time, TIMESTAMP_FORMAT)
            .map_err(|_| Error::InvalidTimestamp(time.to_owned()))?;
        total += parsed.and_utc().timestamp();
    }

    let count = i64::try_from(times.len()).map_err(|_| overflow(times.len()))?;
    let mean = total.div_euclid(count);

    let mean = DateTime::from_timestamp(mean, 0)
        .ok_or_else(|| Error::InvalidTimestamp(format!("{mean} seconds since epoch")))?;
    Ok(mean.naive_utc().format(TIMESTAMP_FORMAT).to_string())
}
