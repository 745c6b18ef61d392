//! Strict-but-tolerant JSON decoding for inbound frames.
//!
//! Decoding always goes through `serde_path_to_error`, so a schema failure names
//! the field that broke it. When the `tracing` feature is enabled, fields the
//! target type does not know about are logged as warnings, which is how payload
//! drift on the producer side gets noticed.

use std::fmt;
use std::marker::PhantomData;

use serde::de::value::MapAccessDeserializer;
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// A value that may only be decoded from a JSON object.
///
/// Derived struct impls also accept a positional array; this wrapper does not.
#[derive(Debug)]
pub struct Object<T>(pub T);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Object<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        object_only(deserializer).map(Object)
    }
}

/// `deserialize_with` helper that rejects anything but a JSON object.
pub fn object_only<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    deserializer.deserialize_map(ObjectVisitor(PhantomData))
}

struct ObjectVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for ObjectVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<T, A::Error> {
        T::deserialize(MapAccessDeserializer::new(map))
    }
}

/// Decode one complete JSON document from `raw`.
///
/// Trailing non-whitespace after the document is an error.
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(raw: &str) -> crate::Result<T> {
    use std::any::type_name;

    let jd = &mut serde_json::Deserializer::from_str(raw);

    // Collect unknown field paths during deserialization
    let mut unknown_paths: Vec<String> = Vec::new();
    let mut record = |path: serde_ignored::Path<'_>| unknown_paths.push(path.to_string());

    let result: T = serde_path_to_error::deserialize(serde_ignored::Deserializer::new(
        &mut *jd,
        &mut record,
    ))
    .inspect_err(|e| {
        tracing::debug!(
            type_name = %type_name::<T>(),
            path = %e.path(),
            error = %e.inner(),
            "deserialization failed"
        );
    })?;
    jd.end()?;

    if !unknown_paths.is_empty() {
        let original: Option<serde_json::Value> = serde_json::from_str(raw).ok();
        for path in unknown_paths {
            let value = original
                .as_ref()
                .and_then(|root| lookup_value(root, &path))
                .map_or_else(|| "<unable to retrieve>".to_owned(), ToString::to_string);

            tracing::warn!(
                type_name = %type_name::<T>(),
                field = %path,
                value = %value,
                "unknown field in inbound frame"
            );
        }
    }

    Ok(result)
}

/// Decode one complete JSON document from `raw`.
///
/// Trailing non-whitespace after the document is an error.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(raw: &str) -> crate::Result<T> {
    let jd = &mut serde_json::Deserializer::from_str(raw);
    let result: T = serde_path_to_error::deserialize(&mut *jd)?;
    jd.end()?;
    Ok(result)
}

/// Look up a value by the dotted path `serde_ignored` reports.
///
/// `?` segments mark Option wrappers and are skipped; numeric segments index arrays.
#[cfg(feature = "tracing")]
fn lookup_value<'value>(
    value: &'value serde_json::Value,
    path: &str,
) -> Option<&'value serde_json::Value> {
    use serde_json::Value;

    path.split('.')
        .filter(|segment| !segment.is_empty() && *segment != "?")
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
            _ => None,
        })
}
