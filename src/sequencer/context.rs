//! Per-run state shared by every command.
//!
//! One [`ExecutionContext`] lives for the whole run: variable bindings made by
//! a `LOOP` stay visible to later commands, and readings and log entries keep
//! accumulating until the run ends.

use crate::core::{Instrument, LogEntry, Rack, Reading, Value};
use crate::data::{ReadingWriter, SaveOutcome};
use crate::error::{SeqResult, SequenceError};
use crate::output::OutputSink;
use crate::sequencer::command::Operand;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Variables, recorded readings and log entries for one run.
pub struct ExecutionContext {
    rack: Arc<dyn Rack>,
    writer: Arc<dyn ReadingWriter>,
    sink: Arc<dyn OutputSink>,
    variables: HashMap<String, Value>,
    readings: Vec<Reading>,
    logs: Vec<LogEntry>,
}

impl ExecutionContext {
    /// Empty context bound to a rack, a writer for `SAVE_DATA` and an output sink.
    pub fn new(
        rack: Arc<dyn Rack>,
        writer: Arc<dyn ReadingWriter>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            rack,
            writer,
            sink,
            variables: HashMap::new(),
            readings: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// The rack commands look instruments up in.
    pub fn rack(&self) -> &dyn Rack {
        self.rack.as_ref()
    }

    /// Look up an instrument, failing if the rack does not hold it.
    pub fn instrument(&self, name: &str) -> SeqResult<Arc<dyn Instrument>> {
        self.rack
            .get_instrument(name)
            .ok_or_else(|| SequenceError::InstrumentNotFound {
                name: name.to_string(),
            })
    }

    /// Bind `name`, replacing any earlier binding.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Current binding of `name`.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// All bindings.
    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    /// Literal operands resolve to themselves; `$name` must be bound.
    pub fn resolve(&self, operand: &Operand) -> SeqResult<Value> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Variable(name) => {
                self.variables
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SequenceError::UndefinedVariable { name: name.clone() })
            }
        }
    }

    /// Append one recorded sample.
    pub fn add_reading(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    /// Readings recorded so far, oldest first.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Append a timestamped log entry.
    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// Log entries so far, oldest first.
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Send one line to the operator-facing output.
    pub fn emit(&self, text: &str) {
        self.sink.line(text);
    }

    /// Hand every reading so far to the persistence collaborator.
    pub async fn save_data(&self, destination: &str) -> SeqResult<SaveOutcome> {
        self.writer
            .write_readings(destination, &self.readings)
            .await
            .map_err(|source| SequenceError::Storage {
                destination: destination.to_string(),
                source,
            })
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("variables", &self.variables)
            .field("readings", &self.readings.len())
            .field("logs", &self.logs.len())
            .finish()
    }
}
