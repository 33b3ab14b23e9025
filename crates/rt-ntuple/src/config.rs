//! Loading job description files and shared serde helpers.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{DeserializeOwned, Error as _, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::Result;

/// Read and parse a YAML file.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml_ng::from_str(&text)?)
}

/// Read and parse a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FalseOr<T> {
    Flag(bool),
    Value(T),
    Null,
}

/// Field that is either `false` (or absent/null) for "off", or a value.
pub(crate) fn false_or<'de, D, T>(d: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    match FalseOr::<T>::deserialize(d)? {
        FalseOr::Flag(false) | FalseOr::Null => Ok(None),
        FalseOr::Flag(true) => Err(D::Error::custom("expected `false` or a value, found `true`")),
        FalseOr::Value(v) => Ok(Some(v)),
    }
}

/// A mapping kept in document order. Null values become `V::default()`.
pub(crate) fn ordered_map<'de, D, V>(d: D) -> std::result::Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de> + Default,
{
    struct OrderedVisitor<V>(PhantomData<V>);

    impl<'de, V> Visitor<'de> for OrderedVisitor<V>
    where
        V: Deserialize<'de> + Default,
    {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut out: Vec<(String, V)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(key) = map.next_key::<String>()? {
                if out.iter().any(|(k, _)| *k == key) {
                    return Err(A::Error::custom(format!("duplicate key '{key}'")));
                }
                let value = map.next_value::<Option<V>>()?.unwrap_or_default();
                out.push((key, value));
            }
            Ok(out)
        }
    }

    d.deserialize_map(OrderedVisitor(PhantomData))
}
