//! Software instruments: devices with no hardware behind them.
//!
//! Useful as rack members for recording elapsed time or random test signals
//! alongside real devices.
use crate::core::{Instrument, Value};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Mutex;
use tokio::time::Instant;

/// Reports elapsed time since construction or the last `initialize`.
///
/// Parameters: `elapsed_time` (seconds), `unix_time` (seconds since epoch).
pub struct TimeKeeper {
    start: Mutex<Instant>,
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeKeeper {
    /// Clock started now.
    pub fn new() -> Self {
        Self {
            start: Mutex::new(Instant::now()),
        }
    }

    /// Seconds since the last restart.
    pub fn elapsed_secs(&self) -> f64 {
        let start = match self.start.lock() {
            Ok(start) => *start,
            Err(poisoned) => *poisoned.into_inner(),
        };
        start.elapsed().as_secs_f64()
    }

    /// Reset the elapsed time to zero.
    pub fn restart(&self) {
        let mut start = match self.start.lock() {
            Ok(start) => start,
            Err(poisoned) => poisoned.into_inner(),
        };
        *start = Instant::now();
    }
}

#[async_trait]
impl Instrument for TimeKeeper {
    async fn initialize(&self) -> Result<()> {
        self.restart();
        Ok(())
    }

    async fn set_parameter(&self, name: &str, _value: &Value) -> Result<()> {
        bail!("TimeKeeper parameter '{}' is read-only", name)
    }

    async fn get_parameter(&self, name: &str) -> Result<f64> {
        match name {
            "elapsed_time" => Ok(self.elapsed_secs()),
            "unix_time" => Ok(chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0),
            other => Err(anyhow!("TimeKeeper has no parameter '{}'", other)),
        }
    }

    async fn read_value(&self) -> Result<f64> {
        Ok(self.elapsed_secs())
    }
}

/// Uniform random numbers in `[0, 1)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomGenerator;

impl RandomGenerator {
    /// Create a generator.
    pub fn new() -> Self {
        Self
    }

    fn sample() -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

#[async_trait]
impl Instrument for RandomGenerator {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn set_parameter(&self, name: &str, _value: &Value) -> Result<()> {
        bail!("RandomGenerator parameter '{}' is read-only", name)
    }

    async fn get_parameter(&self, name: &str) -> Result<f64> {
        match name {
            "random_number" => Ok(Self::sample()),
            other => Err(anyhow!("RandomGenerator has no parameter '{}'", other)),
        }
    }

    async fn read_value(&self) -> Result<f64> {
        Ok(Self::sample())
    }
}
