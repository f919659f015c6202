//! Core traits and data types for the sequencer.
//!
//! This module defines the vocabulary shared by the procedure language and the
//! instruments it drives:
//!
//! - [`Value`]: dynamically-typed scalar produced by literals and variables
//! - [`Reading`]: one recorded sample, an ordered field -> value mapping
//! - [`LogEntry`]: a timestamped operator message
//! - [`Instrument`]: the facade every device driver exposes to procedures
//! - [`Rack`]: name -> instrument lookup, with [`InstrumentRack`] as the in-process registry
//!
//! # Thread Safety
//!
//! `Instrument` and `Rack` require `Send + Sync` so an executor can be moved
//! onto a background task. Drivers that keep mutable state use interior
//! mutability (`tokio::sync::RwLock`, atomics) behind `&self`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Basic Data Types
// =============================================================================

/// Dynamically-typed scalar used for parameters, loop values and readings.
///
/// Literal tokens are coerced with [`Value::parse_literal`]: a token containing
/// `.` becomes a float, otherwise an integer if it parses cleanly, otherwise
/// it stays a string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Anything that is not numeric
    Str(String),
}

impl Value {
    /// Coerce a literal token from procedure text.
    pub fn parse_literal(token: &str) -> Self {
        let token = token.trim();
        if token.contains('.') {
            if let Ok(value) = token.parse::<f64>() {
                return Value::Float(value);
            }
        } else if let Ok(value) = token.parse::<i64>() {
            return Value::Int(value);
        }
        Value::Str(token.to_string())
    }

    /// Numeric view of the value, `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(_) => None,
        }
    }

    /// True for `Int` and `Float`.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Value::Str(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            // Debug keeps the trailing ".0" so floats stay recognisable as floats
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Name of the field every [`Reading`] starts with.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// One recorded sample: an ordered mapping from field name to value.
///
/// The first field is always [`TIMESTAMP_FIELD`] holding Unix seconds as a
/// float. Field order is insertion order, which the CSV writer uses for its
/// header.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    fields: Vec<(String, Value)>,
}

impl Reading {
    /// Create a reading stamped with `timestamp`.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        let secs = timestamp.timestamp_micros() as f64 / 1_000_000.0;
        Self::with_timestamp_secs(secs)
    }

    /// Create a reading stamped with Unix seconds.
    pub fn with_timestamp_secs(secs: f64) -> Self {
        Self {
            fields: vec![(TIMESTAMP_FIELD.to_string(), Value::Float(secs))],
        }
    }

    /// Set `key` to `value`, replacing an existing field in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Timestamp in Unix seconds.
    pub fn timestamp(&self) -> f64 {
        self.get(TIMESTAMP_FIELD)
            .and_then(Value::as_f64)
            .unwrap_or_default()
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields, timestamp included.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Never true in practice since the timestamp is always present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A timestamped message appended by `LOG`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEntry {
    /// UTC time the message was logged
    pub timestamp: DateTime<Utc>,
    /// Resolved message text
    pub message: String,
}

// =============================================================================
// Instrument Facade
// =============================================================================

/// The operations a procedure may invoke on a device.
///
/// Implementations wrap whatever driver sits underneath; errors are reported
/// as `anyhow::Error` and wrapped with instrument and operation context by the
/// sequencer.
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Bring the device into a usable state.
    async fn initialize(&self) -> Result<()>;

    /// Write a named parameter.
    async fn set_parameter(&self, name: &str, value: &Value) -> Result<()>;

    /// Read back a named numeric parameter.
    async fn get_parameter(&self, name: &str) -> Result<f64>;

    /// Sample the device's primary measurement.
    async fn read_value(&self) -> Result<f64>;
}

// =============================================================================
// Rack
// =============================================================================

/// Lookup from instrument name to facade.
pub trait Rack: Send + Sync {
    /// Return the instrument registered under `name`, if any.
    fn get_instrument(&self, name: &str) -> Option<Arc<dyn Instrument>>;
}

/// In-process rack backed by a `HashMap`.
#[derive(Default)]
pub struct InstrumentRack {
    instruments: HashMap<String, Arc<dyn Instrument>>,
}

impl InstrumentRack {
    /// Create an empty rack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instrument` under `name`, replacing any previous entry.
    pub fn add_instrument(&mut self, name: impl Into<String>, instrument: impl Instrument + 'static) {
        self.add_shared(name, Arc::new(instrument));
    }

    /// Register an already shared instrument, e.g. one a test keeps a handle to.
    pub fn add_shared(&mut self, name: impl Into<String>, instrument: Arc<dyn Instrument>) {
        let name = name.into();
        if self.instruments.insert(name.clone(), instrument).is_some() {
            tracing::warn!(instrument = %name, "Replacing instrument already in rack");
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instruments.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered instruments.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl Rack for InstrumentRack {
    fn get_instrument(&self, name: &str) -> Option<Arc<dyn Instrument>> {
        self.instruments.get(name).cloned()
    }
}

impl fmt::Debug for InstrumentRack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentRack")
            .field("instruments", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    #[async_trait]
    impl Instrument for Fixed {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn set_parameter(&self, _name: &str, _value: &Value) -> Result<()> {
            Ok(())
        }
        async fn get_parameter(&self, _name: &str) -> Result<f64> {
            Ok(self.0)
        }
        async fn read_value(&self) -> Result<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_literal_coercion() {
        assert_eq!(Value::parse_literal("3.5"), Value::Float(3.5));
        assert_eq!(Value::parse_literal("3"), Value::Int(3));
        assert_eq!(Value::parse_literal("-12"), Value::Int(-12));
        assert_eq!(Value::parse_literal("abc"), Value::Str("abc".into()));
        // Contains a dot but is not a float
        assert_eq!(Value::parse_literal("run.csv"), Value::Str("run.csv".into()));
        // No dot, not an integer
        assert_eq!(Value::parse_literal("1e3"), Value::Str("1e3".into()));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Int(25).to_string(), "25");
        assert_eq!(Value::Float(25.0).to_string(), "25.0");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::from("abc").to_string(), "abc");
    }

    #[test]
    fn test_reading_keeps_insertion_order() {
        let mut reading = Reading::with_timestamp_secs(10.0);
        reading.insert("sensor2", 1.0);
        reading.insert("sensor1", 2.0);
        reading.insert("sensor2", 3.0);

        let keys: Vec<&str> = reading.keys().collect();
        assert_eq!(keys, vec!["timestamp", "sensor2", "sensor1"]);
        assert_eq!(reading.get("sensor2"), Some(&Value::Float(3.0)));
        assert_eq!(reading.timestamp(), 10.0);
    }

    #[tokio::test]
    async fn test_rack_lookup() {
        let mut rack = InstrumentRack::new();
        rack.add_instrument("probe", Fixed(1.5));

        let probe = rack.get_instrument("probe").unwrap();
        assert_eq!(probe.read_value().await.unwrap(), 1.5);
        assert!(rack.get_instrument("missing").is_none());
        assert_eq!(rack.names(), vec!["probe".to_string()]);
    }
}
