//! Shared fixtures for integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use daq_sequencer::core::{Instrument, InstrumentRack, Value};
use daq_sequencer::data::{CsvWriter, ReadingWriter};
use daq_sequencer::output::CaptureSink;
use daq_sequencer::sequencer::SequenceExecutor;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

/// One observed driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initialize,
    Set(String, Value),
    Get(String),
    Read,
}

/// Instrument that records every call and replays scripted values.
///
/// `get_parameter` pops from the script; once only one value remains it is
/// repeated forever. `read_value` behaves the same with its own script.
#[derive(Debug, Default)]
pub struct SpyInstrument {
    calls: Mutex<Vec<Call>>,
    gets: Mutex<VecDeque<f64>>,
    reads: Mutex<VecDeque<f64>>,
    fail_reads: bool,
    read_delay: Option<Duration>,
}

impl SpyInstrument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gets(values: impl IntoIterator<Item = f64>) -> Self {
        let spy = Self::new();
        spy.gets.lock().unwrap().extend(values);
        spy
    }

    pub fn with_reads(values: impl IntoIterator<Item = f64>) -> Self {
        let spy = Self::new();
        spy.reads.lock().unwrap().extend(values);
        spy
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    /// Make every `read_value` take `delay` before returning.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Values passed to `set_parameter(name, ..)`, in call order.
    pub fn sets_of(&self, name: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Set(param, value) if param == name => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn next(queue: &Mutex<VecDeque<f64>>) -> f64 {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().copied().unwrap_or(0.0)
        }
    }
}

#[async_trait]
impl Instrument for SpyInstrument {
    async fn initialize(&self) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Initialize);
        Ok(())
    }

    async fn set_parameter(&self, name: &str, value: &Value) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Set(name.to_string(), value.clone()));
        Ok(())
    }

    async fn get_parameter(&self, name: &str) -> Result<f64> {
        self.calls.lock().unwrap().push(Call::Get(name.to_string()));
        Ok(Self::next(&self.gets))
    }

    async fn read_value(&self) -> Result<f64> {
        self.calls.lock().unwrap().push(Call::Read);
        if let Some(delay) = self.read_delay {
            sleep(delay).await;
        }
        if self.fail_reads {
            return Err(anyhow!("sensor disconnected"));
        }
        Ok(Self::next(&self.reads))
    }
}

/// Rack holding the given spies under their names.
pub fn rack_with(instruments: &[(&str, Arc<SpyInstrument>)]) -> InstrumentRack {
    let mut rack = InstrumentRack::new();
    for (name, spy) in instruments {
        rack.add_shared(*name, spy.clone());
    }
    rack
}

/// Executor with captured output and CSV files written under `writer`.
pub fn executor_with(
    rack: InstrumentRack,
    writer: Arc<dyn ReadingWriter>,
) -> (SequenceExecutor, CaptureSink) {
    let sink = CaptureSink::new();
    let executor = SequenceExecutor::with_collaborators(Arc::new(rack), writer, Arc::new(sink.clone()));
    (executor, sink)
}

/// Executor with captured output, writing CSV into the working directory.
pub fn executor(rack: InstrumentRack) -> (SequenceExecutor, CaptureSink) {
    executor_with(rack, Arc::new(CsvWriter::new()))
}
