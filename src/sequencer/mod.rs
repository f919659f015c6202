//! Procedure language: command model, parser and executor.
//!
//! # Architecture
//!
//! ```text
//! procedure text --parse_str--> Procedure { metadata, commands }
//!                                   │
//!                          SequenceExecutor::run
//!                                   │
//!               Command::execute(&mut ExecutionContext)
//!                  │                    │
//!            Rack / Instrument     ReadingWriter, OutputSink
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use daq_sequencer::prelude::*;
//! use std::sync::Arc;
//!
//! let mut rack = InstrumentRack::new();
//! rack.add_instrument("temp_ctrl", MockInstrument::new("TempController"));
//!
//! let mut executor = SequenceExecutor::new(Arc::new(rack));
//! executor.load_file("sweep.seq")?;
//! executor.run(RunMode::Preview).await?;
//! executor.run(RunMode::Execute).await?;
//! ```

pub mod command;
pub mod context;
pub mod executor;
pub mod parser;

pub use command::{render_tree, Command, Operand, REQUIRED_STABLE_READINGS};
pub use context::ExecutionContext;
pub use executor::{RunMode, SequenceExecutor};
pub use parser::{parse_file, parse_sequence, parse_str, Procedure};
