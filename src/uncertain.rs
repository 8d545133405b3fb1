use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::atomic::{AtomicU64, Ordering};

use itertools::{EitherOrBoth, Itertools};
use num_traits::Zero;

use crate::{Error, Result};

/// Degrees of freedom at or above this are reported as infinite after combination, and do not
/// contribute to the Welch-Satterthwaite denominator.
pub const INFINITE_DOF_THRESHOLD: f64 = 1e6;

static NEXT_INPUT: AtomicU64 = AtomicU64::new(0);

/// The first-order contribution of one independent elementary input to a derived value.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Component {
    input: u64,
    uncertainty: f64,
    dof: f64,
    sensitivity: f64,
}

impl Component {
    fn contribution(&self) -> f64 {
        self.sensitivity * self.uncertainty
    }

    fn scaled(&self, factor: f64) -> Self {
        Self {
            sensitivity: self.sensitivity * factor,
            ..*self
        }
    }
}

/// A measured or derived quantity with a standard uncertainty and degrees of freedom
///
/// Values are immutable. Elementary values (those built with [`UncertainValue::new`]) are
/// independent of one another. Values derived through arithmetic remember their first-order
/// sensitivity to every elementary input they depend on, so the uncertainty of `x - x` is nil
/// and that of `x + x` is twice the uncertainty of `x`.
///
/// The combined standard uncertainty of a derived value is
///
/// $$
///     u_c^2 = \sum_i \left(c_i u_i\right)^2
/// $$
///
/// and its effective degrees of freedom follow Welch-Satterthwaite
///
/// $$
///     \nu_{eff} = \frac{u_c^4}{\sum_i \left(c_i u_i\right)^4 / \nu_i}
/// $$
///
/// There is no `/` operator: division can fail on a zero divisor, so it is only available as
/// [`UncertainValue::checked_div`] and [`UncertainValue::checked_div_scalar`].
#[derive(Clone, Debug)]
pub struct UncertainValue {
    estimate: f64,
    uncertainty: f64,
    dof: f64,
    label: String,
    /// Sorted by `input`
    components: Vec<Component>,
}

impl UncertainValue {
    /// Create an independent elementary value
    ///
    /// # Errors
    /// Returns an error if `uncertainty` is negative or not finite, or if `dof` is not positive.
    /// An infinite `dof` is allowed.
    pub fn new(
        estimate: f64,
        uncertainty: f64,
        dof: f64,
        label: impl Into<String>,
    ) -> Result<Self> {
        if !(uncertainty.is_finite() && uncertainty >= 0.0) {
            return Err(Error::InvalidUncertainty(uncertainty));
        }
        if dof.is_nan() || dof <= 0.0 {
            return Err(Error::InvalidDegreesOfFreedom(dof));
        }

        let components = if uncertainty > 0.0 {
            vec![Component {
                input: NEXT_INPUT.fetch_add(1, Ordering::Relaxed),
                uncertainty,
                dof,
                sensitivity: 1.0,
            }]
        } else {
            vec![]
        };

        Ok(Self {
            estimate,
            uncertainty,
            dof,
            label: label.into(),
            components,
        })
    }

    /// A value known without uncertainty
    #[must_use]
    pub const fn exact(estimate: f64) -> Self {
        Self {
            estimate,
            uncertainty: 0.0,
            dof: f64::INFINITY,
            label: String::new(),
            components: Vec::new(),
        }
    }

    /// A zero-centred value carrying a specification limit as its uncertainty
    ///
    /// # Errors
    /// Returns an error if `uncertainty` is negative or not finite.
    pub fn zero_mean(uncertainty: f64, label: impl Into<String>) -> Result<Self> {
        Self::new(0.0, uncertainty, f64::INFINITY, label)
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub const fn estimate(&self) -> f64 {
        self.estimate
    }

    #[must_use]
    pub const fn standard_uncertainty(&self) -> f64 {
        self.uncertainty
    }

    #[must_use]
    pub const fn degrees_of_freedom(&self) -> f64 {
        self.dof
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn has_infinite_dof(&self) -> bool {
        self.dof >= INFINITE_DOF_THRESHOLD
    }

    fn derived(estimate: f64, components: Vec<Component>) -> Self {
        let variance: f64 = components
            .iter()
            .map(|component| component.contribution().powi(2))
            .sum();

        Self {
            estimate,
            uncertainty: variance.sqrt(),
            dof: welch_satterthwaite(variance, &components),
            label: String::new(),
            components,
        }
    }

    /// Linear combination `a * ca + b * cb` of the components of two values
    fn combine(estimate: f64, a: &Self, ca: f64, b: &Self, cb: f64) -> Self {
        let components = a
            .components
            .iter()
            .merge_join_by(&b.components, |x, y| x.input.cmp(&y.input))
            .map(|pair| match pair {
                EitherOrBoth::Left(x) => x.scaled(ca),
                EitherOrBoth::Right(y) => y.scaled(cb),
                EitherOrBoth::Both(x, y) => Component {
                    sensitivity: x.sensitivity.mul_add(ca, y.sensitivity * cb),
                    ..*x
                },
            })
            .collect();

        Self::derived(estimate, components)
    }

    fn scale(&self, factor: f64) -> Self {
        Self::derived(
            self.estimate * factor,
            self.components.iter().map(|c| c.scaled(factor)).collect(),
        )
    }

    fn shift(&self, offset: f64) -> Self {
        Self::derived(self.estimate + offset, self.components.clone())
    }

    /// Divide `self` by `rhs`
    ///
    /// # Errors
    /// Returns [`Error::DivisionByZero`] if the estimate of `rhs` is exactly zero.
    pub fn checked_div(&self, rhs: &Self) -> Result<Self> {
        if rhs.estimate == 0.0 {
            return Err(Error::DivisionByZero);
        }
        let quotient = self.estimate / rhs.estimate;
        Ok(Self::combine(
            quotient,
            self,
            rhs.estimate.recip(),
            rhs,
            -quotient / rhs.estimate,
        ))
    }

    /// Divide `self` by a plain number
    ///
    /// # Errors
    /// Returns [`Error::DivisionByZero`] if `rhs` is exactly zero.
    pub fn checked_div_scalar(&self, rhs: f64) -> Result<Self> {
        if rhs == 0.0 {
            return Err(Error::DivisionByZero);
        }
        Ok(self.scale(rhs.recip()))
    }
}

fn welch_satterthwaite(variance: f64, components: &[Component]) -> f64 {
    if variance == 0.0 {
        return f64::INFINITY;
    }

    let denominator: f64 = components
        .iter()
        .filter(|component| component.dof < INFINITE_DOF_THRESHOLD)
        .map(|component| component.contribution().powi(4) / component.dof)
        .sum();

    if denominator == 0.0 {
        return f64::INFINITY;
    }

    let dof = variance.powi(2) / denominator;
    if dof >= INFINITE_DOF_THRESHOLD {
        f64::INFINITY
    } else {
        dof
    }
}

impl PartialEq for UncertainValue {
    fn eq(&self, other: &Self) -> bool {
        self.estimate == other.estimate
            && self.uncertainty == other.uncertainty
            && self.dof == other.dof
            && self.label == other.label
    }
}

impl fmt::Display for UncertainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ± {}", self.estimate, self.uncertainty)?;
        if self.has_infinite_dof() {
            write!(f, " (dof = inf)")
        } else {
            write!(f, " (dof = {:.1})", self.dof)
        }
    }
}

impl Add for &UncertainValue {
    type Output = UncertainValue;

    fn add(self, rhs: Self) -> UncertainValue {
        UncertainValue::combine(self.estimate + rhs.estimate, self, 1.0, rhs, 1.0)
    }
}

impl Sub for &UncertainValue {
    type Output = UncertainValue;

    fn sub(self, rhs: Self) -> UncertainValue {
        UncertainValue::combine(self.estimate - rhs.estimate, self, 1.0, rhs, -1.0)
    }
}

impl Mul for &UncertainValue {
    type Output = UncertainValue;

    fn mul(self, rhs: Self) -> UncertainValue {
        UncertainValue::combine(
            self.estimate * rhs.estimate,
            self,
            rhs.estimate,
            rhs,
            self.estimate,
        )
    }
}

impl Neg for &UncertainValue {
    type Output = UncertainValue;

    fn neg(self) -> UncertainValue {
        self.scale(-1.0)
    }
}

impl Neg for UncertainValue {
    type Output = Self;

    fn neg(self) -> Self {
        -&self
    }
}

impl Add<f64> for &UncertainValue {
    type Output = UncertainValue;

    fn add(self, rhs: f64) -> UncertainValue {
        self.shift(rhs)
    }
}

impl Sub<f64> for &UncertainValue {
    type Output = UncertainValue;

    fn sub(self, rhs: f64) -> UncertainValue {
        self.shift(-rhs)
    }
}

impl Mul<f64> for &UncertainValue {
    type Output = UncertainValue;

    fn mul(self, rhs: f64) -> UncertainValue {
        self.scale(rhs)
    }
}

impl Add<&UncertainValue> for f64 {
    type Output = UncertainValue;

    fn add(self, rhs: &UncertainValue) -> UncertainValue {
        rhs.shift(self)
    }
}

impl Sub<&UncertainValue> for f64 {
    type Output = UncertainValue;

    fn sub(self, rhs: &UncertainValue) -> UncertainValue {
        (-rhs).shift(self)
    }
}

impl Mul<&UncertainValue> for f64 {
    type Output = UncertainValue;

    fn mul(self, rhs: &UncertainValue) -> UncertainValue {
        rhs.scale(self)
    }
}

// Owned operands forward to the borrowed implementations
macro_rules! forward_owned {
    ($imp:ident, $method:ident) => {
        impl $imp for UncertainValue {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self {
                (&self).$method(&rhs)
            }
        }

        impl $imp<&UncertainValue> for UncertainValue {
            type Output = Self;

            fn $method(self, rhs: &UncertainValue) -> Self {
                (&self).$method(rhs)
            }
        }

        impl $imp<UncertainValue> for &UncertainValue {
            type Output = UncertainValue;

            fn $method(self, rhs: UncertainValue) -> UncertainValue {
                self.$method(&rhs)
            }
        }

        impl $imp<f64> for UncertainValue {
            type Output = Self;

            fn $method(self, rhs: f64) -> Self {
                (&self).$method(rhs)
            }
        }

        impl $imp<UncertainValue> for f64 {
            type Output = UncertainValue;

            fn $method(self, rhs: UncertainValue) -> UncertainValue {
                self.$method(&rhs)
            }
        }
    };
}

forward_owned!(Add, add);
forward_owned!(Sub, sub);
forward_owned!(Mul, mul);

impl Zero for UncertainValue {
    fn zero() -> Self {
        Self::exact(0.0)
    }

    fn is_zero(&self) -> bool {
        self.estimate == 0.0 && self.uncertainty == 0.0
    }
}

impl Sum for UncertainValue {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, value| &acc + &value)
    }
}
