use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RenderError, Result};

static FLAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*$").unwrap());

/// Command-line flags passed to the renderer, in insertion order.
///
/// The order matters: it is the order in which the flags appear on the command
/// line, and some renderers (wkhtmltopdf among them) interpret flags positionally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    entries: Vec<(String, Option<String>)>,
}

impl RenderOptions {
    /// Create an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `flag` to `value`. An existing flag keeps its position.
    ///
    /// A leading `--` on the flag is stripped, and an empty value is the same
    /// as no value.
    pub fn insert(&mut self, flag: impl Into<String>, value: Option<String>) -> &mut Self {
        let flag = normalize_flag(flag.into());
        let value = value.filter(|v| !v.is_empty());
        match self.entries.iter_mut().find(|(name, _)| *name == flag) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((flag, value)),
        }
        self
    }

    /// Builder form of [`RenderOptions::insert`] with a value.
    pub fn with(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(flag, Some(value.into()));
        self
    }

    /// Builder form of [`RenderOptions::insert`] for a bare flag.
    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.insert(flag, None);
        self
    }

    /// Look up a flag. The outer `Option` tells whether the flag is set.
    pub fn get(&self, flag: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(name, _)| name == flag)
            .map(|(_, value)| value.as_deref())
    }

    /// Number of flags.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no flags are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flags and their values, in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    /// Overlay `other` onto these options. Flags from `other` replace values in
    /// place; flags only present in `other` are appended in its order.
    pub fn merged(&self, other: &RenderOptions) -> RenderOptions {
        let mut merged = self.clone();
        for (flag, value) in &other.entries {
            merged.insert(flag.clone(), value.clone());
        }
        merged
    }

    /// Check that every flag is a plain option name.
    pub fn validate(&self) -> Result<()> {
        for (flag, _) in &self.entries {
            if !FLAG_PATTERN.is_match(flag) {
                return Err(RenderError::Configuration(format!(
                    "invalid renderer option `{flag}`"
                )));
            }
        }
        Ok(())
    }

    /// The options as an argument vector: `--flag` followed by its value, if any.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 2);
        for (flag, value) in &self.entries {
            args.push(format!("--{flag}"));
            if let Some(value) = value {
                args.push(value.clone());
            }
        }
        args
    }

    /// Parse a `flag[=value]` pair as given on the command line.
    pub fn parse_pair(pair: &str) -> (String, Option<String>) {
        match pair.split_once('=') {
            Some((flag, value)) => (flag.trim().to_string(), Some(value.to_string())),
            None => (pair.trim().to_string(), None),
        }
    }
}

fn normalize_flag(flag: String) -> String {
    match flag.strip_prefix("--") {
        Some(stripped) => stripped.to_string(),
        None => flag,
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for RenderOptions {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        let mut options = RenderOptions::new();
        for (flag, value) in iter {
            options.insert(flag, value);
        }
        options
    }
}

impl Serialize for RenderOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (flag, value) in &self.entries {
            map.serialize_entry(flag, value.as_deref().unwrap_or(""))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RenderOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(OptionsVisitor)
    }
}

struct OptionsVisitor;

impl<'de> Visitor<'de> for OptionsVisitor {
    type Value = RenderOptions;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of renderer flags to optional values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut options = RenderOptions::new();
        while let Some((flag, value)) = access.next_entry::<String, OptionValue>()? {
            if let OptionValue::Bool(false) = value {
                continue;
            }
            options.insert(flag, value.into_string());
        }
        Ok(options)
    }
}

/// Config files write values as strings, numbers or booleans. `true` and `""`
/// mean a bare flag, `false` leaves the flag out.
#[derive(Deserialize)]
#[serde(untagged)]
enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl OptionValue {
    fn into_string(self) -> Option<String> {
        match self {
            OptionValue::Bool(_) => None,
            OptionValue::Int(v) => Some(v.to_string()),
            OptionValue::Float(v) => Some(v.to_string()),
            OptionValue::Text(v) => Some(v),
        }
    }
}
