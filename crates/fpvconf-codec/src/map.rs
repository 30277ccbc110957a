//! Parsed key/value view of a configuration file

use std::fmt::Display;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ParseWarning, WarningReason};

/// Flat or dotted key to string value, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigMap(IndexMap<String, String>);

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries of `self` whose value differs from (or is absent in) `base`
    pub fn diff(&self, base: &ConfigMap) -> ConfigMap {
        self.iter()
            .filter(|(k, v)| base.get(k) != Some(*v))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Read a numeric field, falling back to `T::default()` on failure
    pub fn number<T>(&self, key: &str) -> (Field<T>, Option<ParseWarning>)
    where
        T: FromStr + Default,
    {
        match self.get(key) {
            None => (
                Field::defaulted(T::default()),
                Some(ParseWarning {
                    key: key.to_string(),
                    raw: String::new(),
                    reason: WarningReason::Missing,
                }),
            ),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(value) => (Field::parsed(value), None),
                Err(_) => (
                    Field::defaulted(T::default()),
                    Some(ParseWarning {
                        key: key.to_string(),
                        raw: raw.to_string(),
                        reason: WarningReason::Invalid,
                    }),
                ),
            },
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'a> IntoIterator for &'a ConfigMap {
    type Item = (&'a String, &'a String);
    type IntoIter = indexmap::map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A typed value together with whether it was fabricated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field<T> {
    pub value: T,
    /// `true` when the document had no usable value and `value` is a fallback
    pub defaulted: bool,
}

impl<T> Field<T> {
    pub fn parsed(value: T) -> Self {
        Self {
            value,
            defaulted: false,
        }
    }

    pub fn defaulted(value: T) -> Self {
        Self {
            value,
            defaulted: true,
        }
    }

    /// Set a user-chosen value; the field is authoritative afterwards
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.defaulted = false;
    }
}

impl<T: Default> Default for Field<T> {
    fn default() -> Self {
        Self::defaulted(T::default())
    }
}

/// Typed settings plus the warnings raised while reading them
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub settings: T,
    pub warnings: Vec<ParseWarning>,
}

impl<T> Parsed<T> {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Collects warnings while typed views pull fields out of a map
pub(crate) struct FieldReader<'a> {
    map: &'a ConfigMap,
    warnings: Vec<ParseWarning>,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(map: &'a ConfigMap) -> Self {
        Self {
            map,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn text(&self, key: &str) -> Option<String> {
        self.map.get(key).map(String::from)
    }

    pub(crate) fn number<T: FromStr + Default>(&mut self, key: &str) -> Field<T> {
        let (field, warning) = self.map.number(key);
        self.warnings.extend(warning);
        field
    }

    pub(crate) fn finish<T>(self, settings: T) -> Parsed<T> {
        Parsed {
            settings,
            warnings: self.warnings,
        }
    }
}

/// Write side of typed views: defaulted numbers are never written back
pub(crate) struct FieldWriter<'a> {
    map: &'a mut ConfigMap,
}

impl<'a> FieldWriter<'a> {
    pub(crate) fn new(map: &'a mut ConfigMap) -> Self {
        Self { map }
    }

    pub(crate) fn text(&mut self, key: &str, value: &Option<String>) {
        if let Some(value) = value {
            self.map.insert(key, value.clone());
        }
    }

    pub(crate) fn number<T: Display>(&mut self, key: &str, field: &Field<T>) {
        if !field.defaulted {
            self.map.insert(key, field.value.to_string());
        }
    }
}
