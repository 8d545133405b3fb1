//! Tagged JSON representation of [`UncertainValue`]
//!
//! An uncertain value is written as an object carrying the discriminator `"__ureal__": true`
//! alongside its `value`, `uncert`, `dof` and `label`. Infinite degrees of freedom are written
//! as the string `"inf"`, which JSON cannot otherwise express. The discriminator lets a reader
//! tell uncertain values apart from plain numbers and nested records.
//!
//! Decoded values are fresh elementary inputs: correlations between values are not persisted.

use std::fmt;

use serde::de::value::MapAccessDeserializer;
use serde::de::{self, Deserializer, MapAccess, Unexpected, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::uncertain::UncertainValue;

/// Name of the discriminator field
pub const TAG: &str = "__ureal__";

const INFINITY_TOKEN: &str = "inf";

/// Degrees of freedom as written on disk
#[derive(Clone, Copy, Debug, PartialEq)]
struct Dof(f64);

impl Serialize for Dof {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_infinite() {
            serializer.serialize_str(INFINITY_TOKEN)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

struct DofVisitor;

impl<'de> Visitor<'de> for DofVisitor {
    type Value = Dof;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a number or the string \"{INFINITY_TOKEN}\"")
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Dof, E> {
        Ok(Dof(value))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Dof, E> {
        Ok(Dof(value as f64))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Dof, E> {
        Ok(Dof(value as f64))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Dof, E> {
        if value.eq_ignore_ascii_case(INFINITY_TOKEN) {
            Ok(Dof(f64::INFINITY))
        } else {
            Err(E::invalid_value(Unexpected::Str(value), &self))
        }
    }
}

impl<'de> Deserialize<'de> for Dof {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DofVisitor)
    }
}

#[derive(Serialize)]
struct TaggedRef<'a> {
    #[serde(rename = "__ureal__")]
    tag: bool,
    value: f64,
    uncert: f64,
    dof: Dof,
    label: &'a str,
}

#[derive(Deserialize)]
struct Tagged {
    #[serde(rename = "__ureal__")]
    tag: bool,
    value: f64,
    uncert: f64,
    dof: Dof,
    #[serde(default)]
    label: String,
}

impl Serialize for UncertainValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TaggedRef {
            tag: true,
            value: self.estimate(),
            uncert: self.standard_uncertainty(),
            dof: Dof(self.degrees_of_freedom()),
            label: self.label(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for UncertainValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tagged = Tagged::deserialize(deserializer)?;
        if !tagged.tag {
            return Err(de::Error::custom(format!(
                "uncertain value must carry \"{TAG}\": true"
            )));
        }
        Self::new(tagged.value, tagged.uncert, tagged.dof.0, tagged.label)
            .map_err(de::Error::custom)
    }
}

/// A stored numeric field: either a tagged uncertain value or a plain number
struct Quantity(UncertainValue);

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a number or an object tagged \"{TAG}\"")
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Quantity, E> {
        Ok(Quantity(UncertainValue::exact(value)))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Quantity, E> {
        self.visit_f64(value as f64)
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Quantity, E> {
        self.visit_f64(value as f64)
    }

    // Errors from a malformed tagged object are passed through
    fn visit_map<M: MapAccess<'de>>(self, map: M) -> Result<Quantity, M::Error> {
        UncertainValue::deserialize(MapAccessDeserializer::new(map)).map(Quantity)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

/// Deserialize a field that may be stored as a tagged uncertain value or a plain number
///
/// Plain numbers become exact values. Use with `#[serde(deserialize_with = "...")]`.
///
/// # Errors
/// Fails if the field is neither a number nor a valid tagged uncertain value.
pub fn quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<UncertainValue, D::Error> {
    Quantity::deserialize(deserializer).map(|quantity| quantity.0)
}

/// As [`quantity`], for fields that may be absent. Pair with `#[serde(default)]`.
///
/// # Errors
/// Fails if the field is present but is neither a number nor a valid tagged uncertain value.
pub fn optional_quantity<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<UncertainValue>, D::Error> {
    Option::<Quantity>::deserialize(deserializer).map(|field| field.map(|quantity| quantity.0))
}
