use chrono::{DateTime, FixedOffset};

/// A single event parameter. The set of kinds is closed: the writer
/// matches on it exhaustively, so adding a kind is a compile error until
/// serialization handles it.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    F32(f32),
    F64(f64),
    I32(i32),
    I64(i64),
    Str(String),
    Bool(bool),
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::F32(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::F64(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::I32(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::I64(v)
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

/// One telemetry record as handed to the recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub version: Option<i64>,
    /// Capture time. The recorder stamps "now" when this is `None`.
    pub timestamp: Option<DateTime<FixedOffset>>,
    params: Vec<(String, ParamValue)>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            timestamp: None,
            params: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn at(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builder form of [`Event::set_param`].
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set_param(key, value);
        self
    }

    /// Keys are unique: setting an existing key replaces the value but keeps
    /// its original position.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
    }

    pub fn params(&self) -> &[(String, ParamValue)] {
        &self.params
    }
}
