//! Layered property lookup.
//!
//! Proxy settings are plain string properties that may come from several
//! places. [`LayeredConfig`] holds an ordered list of [`PropertySource`]s and
//! answers each lookup from the first source that knows the key.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use crate::config::loader::ConfigError;

/// A named source of string properties.
pub trait PropertySource: Send + Sync + std::fmt::Debug {
    /// Source name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Look up a single property.
    fn get(&self, key: &str) -> Option<String>;

    /// All keys this source can answer.
    fn keys(&self) -> Vec<String>;
}

/// A property source backed by an in-memory map.
#[derive(Debug, Clone)]
pub struct MapSource {
    name: String,
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new(name: impl Into<String>, values: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Build a source from static key/value pairs.
    pub fn from_pairs(name: impl Into<String>, pairs: &[(&str, &str)]) -> Self {
        let values = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self::new(name, values)
    }
}

impl PropertySource for MapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// A property value together with the source that supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub source: String,
}

/// Ordered chain of property sources. First hit wins.
#[derive(Debug, Default)]
pub struct LayeredConfig {
    sources: Vec<Box<dyn PropertySource>>,
}

impl LayeredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with lower precedence than the ones already added.
    pub fn with_source(mut self, source: impl PropertySource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Resolve a key, reporting which source answered.
    pub fn lookup(&self, key: &str) -> Option<Resolved> {
        self.sources.iter().find_map(|source| {
            source.get(key).map(|value| Resolved {
                value,
                source: source.name().to_string(),
            })
        })
    }

    /// Resolve a key to its value.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lookup(key).map(|r| r.value)
    }

    /// Resolve and parse a key. Absent keys are `Ok(None)`; values that fail
    /// to parse are configuration errors.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(resolved) = self.lookup(key) else {
            return Ok(None);
        };
        resolved
            .value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: resolved.value.clone(),
                reason: format!("{} (from {})", e, resolved.source),
            })
    }

    /// Union of the keys known to every source.
    pub fn keys(&self) -> BTreeSet<String> {
        self.sources.iter().flat_map(|s| s.keys()).collect()
    }
}
