//! A mock instrument that remembers its parameters and produces synthetic readings.
use crate::core::{Instrument, Value};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::info;

/// Simulated device for dry runs and tests.
///
/// - `set_parameter` stores the value
/// - `get_parameter` returns the stored value (0.0 when never set)
/// - `read_value` returns the fixed value if one was configured, otherwise a
///   uniform sample in `[20, 30)`
pub struct MockInstrument {
    label: String,
    parameters: RwLock<HashMap<String, Value>>,
    read_value: Option<f64>,
    initialized: AtomicBool,
}

impl MockInstrument {
    /// Mock with no parameters and random reads. `label` only appears in logs.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parameters: RwLock::new(HashMap::new()),
            read_value: None,
            initialized: AtomicBool::new(false),
        }
    }

    /// Seed a parameter before the procedure runs.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.get_mut().insert(name.into(), value.into());
        self
    }

    /// Make `read_value` deterministic.
    pub fn with_read_value(mut self, value: f64) -> Self {
        self.read_value = Some(value);
        self
    }

    /// True once `initialize` has been called.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Current value of a parameter, if it has been set.
    pub async fn parameter(&self, name: &str) -> Option<Value> {
        self.parameters.read().await.get(name).cloned()
    }
}

#[async_trait]
impl Instrument for MockInstrument {
    async fn initialize(&self) -> Result<()> {
        info!("MockInstrument '{}' initialized", self.label);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn set_parameter(&self, name: &str, value: &Value) -> Result<()> {
        self.parameters
            .write()
            .await
            .insert(name.to_string(), value.clone());
        info!("MockInstrument '{}': {} set to {}", self.label, name, value);
        Ok(())
    }

    async fn get_parameter(&self, name: &str) -> Result<f64> {
        match self.parameters.read().await.get(name) {
            None => Ok(0.0),
            Some(value) => value.as_f64().ok_or_else(|| {
                anyhow!(
                    "Parameter '{}' of '{}' is not numeric: {}",
                    name,
                    self.label,
                    value
                )
            }),
        }
    }

    async fn read_value(&self) -> Result<f64> {
        Ok(match self.read_value {
            Some(value) => value,
            None => rand::thread_rng().gen_range(20.0..30.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parameters_round_trip() {
        let mock = MockInstrument::new("TempController").with_parameter("setpoint", 20_i64);
        assert_eq!(mock.get_parameter("setpoint").await.unwrap(), 20.0);
        assert_eq!(mock.get_parameter("unset").await.unwrap(), 0.0);

        mock.set_parameter("setpoint", &Value::Float(25.5)).await.unwrap();
        assert_eq!(mock.get_parameter("setpoint").await.unwrap(), 25.5);

        mock.set_parameter("mode", &Value::from("ramp")).await.unwrap();
        assert!(mock.get_parameter("mode").await.is_err());
    }

    #[tokio::test]
    async fn test_read_value() {
        let fixed = MockInstrument::new("Sensor").with_read_value(1.25);
        assert_eq!(fixed.read_value().await.unwrap(), 1.25);

        let random = MockInstrument::new("Sensor");
        let value = random.read_value().await.unwrap();
        assert!((20.0..30.0).contains(&value));
    }

    #[tokio::test]
    async fn test_initialize_flag() {
        let mock = MockInstrument::new("Sensor");
        assert!(!mock.is_initialized());
        mock.initialize().await.unwrap();
        assert!(mock.is_initialized());
    }
}
