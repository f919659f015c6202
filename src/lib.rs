//! Core library for the daq_sequencer application.
//!
//! This library binds named instruments into a rack and drives them with a
//! small procedure language: initialize devices, set parameters, wait, wait
//! until a parameter settles, record readings, loop, log and save data. It is
//! used by the `daq_sequencer` binary and can be embedded by applications that
//! supply their own [`Instrument`](core::Instrument) drivers.

pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod instrument;
pub mod output;
pub mod sequencer;

/// Common imports for driving procedures.
pub mod prelude {
    pub use crate::core::{Instrument, InstrumentRack, Rack, Reading, Value};
    pub use crate::data::{CsvWriter, ReadingWriter, SaveOutcome};
    pub use crate::error::{ParseError, ParseErrorKind, SeqResult, SequenceError};
    pub use crate::instrument::{MockInstrument, RandomGenerator, TimeKeeper};
    pub use crate::output::{CaptureSink, OutputSink, StdoutSink};
    pub use crate::sequencer::{Command, Operand, Procedure, RunMode, SequenceExecutor};
}
