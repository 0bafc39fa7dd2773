use std::fmt;

/// Value of a per-query server setting.
///
/// Deserializes from a bare TOML/JSON scalar.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // The server spells booleans as 0/1.
            SettingValue::Bool(v) => write!(f, "{}", u8::from(*v)),
            SettingValue::Int(v) => write!(f, "{v}"),
            SettingValue::Float(v) => write!(f, "{v}"),
            SettingValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::Str(v.to_string())
    }
}

/// Ordered settings sent along with every query.
///
/// Insertion order is kept so the server sees them the way they were
/// configured; setting an existing name replaces its value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySettings {
    entries: Vec<(String, SettingValue)>,
}

impl Default for QuerySettings {
    /// Session defaults: outer joins and rollups produce nulls instead of
    /// type defaults, and collapsing engines are read merged.
    fn default() -> Self {
        let mut settings = Self::empty();
        settings.set("join_use_nulls", 1);
        settings.set("group_by_use_nulls", 1);
        settings.set("final", 1);
        settings
    }
}

impl QuerySettings {
    /// No settings at all, not even the defaults.
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == &name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `overrides` on top of these settings.
    pub fn merge(&mut self, overrides: impl IntoIterator<Item = (String, SettingValue)>) {
        for (name, value) in overrides {
            self.set(name, value);
        }
    }
}

impl From<i32> for SettingValue {
    fn from(v: i32) -> Self {
        SettingValue::Int(i64::from(v))
    }
}

/// SQL text plus the settings it runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub settings: QuerySettings,
}

impl Query {
    /// Query with the default session settings.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            settings: QuerySettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: QuerySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.settings.set(name, value);
        self
    }
}
