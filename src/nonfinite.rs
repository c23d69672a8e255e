//! Serde helpers for floats that may be infinite or NaN.
//!
//! JSON numbers cannot hold those values, so they are written as the strings
//! `"inf"`, `"-inf"` and `"nan"`. Finite values stay plain numbers. A `null`
//! reads back as NaN.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

#[derive(Debug, Clone, Copy)]
struct Value(f64);

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.0;
        if value.is_finite() {
            serializer.serialize_f64(value)
        } else if value.is_nan() {
            serializer.serialize_str("nan")
        } else if value > 0. {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

struct ValueVisitor;

impl Visitor<'_> for ValueVisitor {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number, \"inf\", \"-inf\" or \"nan\"")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
        match v {
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            "nan" => Ok(f64::NAN),
            other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
        }
    }

    fn visit_unit<E: de::Error>(self) -> Result<f64, E> {
        Ok(f64::NAN)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor).map(Value)
    }
}

pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    Value(*value).serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Value::deserialize(deserializer).map(|v| v.0)
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(Value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?.map(|v| v.0))
    }
}

pub mod vec {
    use super::*;

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| Value(v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Value>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.0).collect())
    }
}

pub mod map {
    use super::*;

    pub fn serialize<S: Serializer>(
        values: &BTreeMap<String, f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(values.iter().map(|(k, &v)| (k, Value(v))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, f64>, D::Error> {
        let values = BTreeMap::<String, Value>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|(k, v)| (k, v.0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Record {
        #[serde(with = "crate::nonfinite")]
        scalar: f64,
        #[serde(with = "crate::nonfinite::option")]
        maybe: Option<f64>,
        #[serde(with = "crate::nonfinite::vec")]
        values: Vec<f64>,
    }

    #[test]
    fn signs_and_nan_survive() {
        let record = Record {
            scalar: f64::INFINITY,
            maybe: Some(f64::NEG_INFINITY),
            values: vec![1.5, f64::NAN, f64::NEG_INFINITY, f64::INFINITY],
        };
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(
            text,
            r#"{"scalar":"inf","maybe":"-inf","values":[1.5,"nan","-inf","inf"]}"#
        );
        let loaded: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded.scalar, f64::INFINITY);
        assert_eq!(loaded.maybe, Some(f64::NEG_INFINITY));
        assert_eq!(loaded.values[0], 1.5);
        assert!(loaded.values[1].is_nan());
        assert_eq!(loaded.values[2..], [f64::NEG_INFINITY, f64::INFINITY]);
    }

    #[test]
    fn missing_option_and_integers() {
        let loaded: Record =
            serde_json::from_str(r#"{"scalar":3,"maybe":null,"values":[null,-2]}"#).unwrap();
        assert_eq!(loaded.scalar, 3.);
        assert_eq!(loaded.maybe, None);
        assert!(loaded.values[0].is_nan());
        assert_eq!(loaded.values[1], -2.);
        let bad = r#"{"scalar":"big","maybe":null,"values":[]}"#;
        assert!(serde_json::from_str::<Record>(bad).is_err());
    }
}
