//! Helpers called by generated `Deserialize` impls.
//!
//! Structs that embed fragments or hold polymorphic values decode from a
//! buffered JSON object; these functions read fields out of that buffer.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};

pub use serde_json::Value;

/// Decodes the field `key` of `value`. A missing key decodes like null.
pub fn field<T, E>(value: &Value, key: &str) -> Result<T, E>
where
    T: DeserializeOwned,
    E: de::Error,
{
    match value.get(key) {
        Some(field) => T::deserialize(field),
        None => T::deserialize(&Value::Null),
    }
    .map_err(|error| E::custom(format_args!("field `{key}`: {error}")))
}

/// Decodes the field `key` of `value`, with null or missing as the default.
pub fn field_or_default<T, E>(value: &Value, key: &str) -> Result<T, E>
where
    T: DeserializeOwned + Default,
    E: de::Error,
{
    match value.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(field) => {
            T::deserialize(field).map_err(|error| E::custom(format_args!("field `{key}`: {error}")))
        }
    }
}

/// Decodes a whole object into the type of an embedded fragment or variant.
pub fn embedded<T, E>(value: &Value) -> Result<T, E>
where
    T: DeserializeOwned,
    E: de::Error,
{
    T::deserialize(value).map_err(E::custom)
}

/// Returns the `__typename` of an object.
pub fn typename<E: de::Error>(value: &Value) -> Result<&str, E> {
    match value.get("__typename") {
        Some(Value::String(typename)) => Ok(typename.as_str()),
        Some(_) => Err(E::custom("`__typename` is not a string")),
        None => Err(E::missing_field("__typename")),
    }
}

/// `deserialize_with` target decoding null as the type's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// `skip_serializing_if` target for `omitempty` variables.
pub fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}
