//! Runs a loaded procedure against a rack.
//!
//! The executor owns the rack handle and exactly one [`ExecutionContext`].
//! Two modes are available per run:
//!
//! - [`RunMode::Preview`]: renders the command tree, executes nothing, never fails
//! - [`RunMode::Execute`]: awaits each top-level command in order; the first
//!   failure prints a failure banner and is returned to the caller
//!
//! The context persists across runs of the same executor, so variables,
//! readings and log entries accumulate.

use crate::core::Rack;
use crate::data::{CsvWriter, ReadingWriter};
use crate::error::SeqResult;
use crate::output::{OutputSink, StdoutSink};
use crate::sequencer::command::{render_tree, Command};
use crate::sequencer::context::ExecutionContext;
use crate::sequencer::parser::{self, Procedure};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// How [`SequenceExecutor::run`] treats the loaded commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Render only
    Preview,
    /// Execute in order, abort on first failure
    Execute,
}

/// Loads a procedure and runs it.
pub struct SequenceExecutor {
    rack: Arc<dyn Rack>,
    sink: Arc<dyn OutputSink>,
    context: ExecutionContext,
    procedure: Procedure,
}

impl SequenceExecutor {
    /// Executor writing progress to stdout and data as CSV in the working directory.
    pub fn new(rack: Arc<dyn Rack>) -> Self {
        Self::with_collaborators(rack, Arc::new(CsvWriter::new()), Arc::new(StdoutSink))
    }

    /// Executor with explicit persistence and output collaborators.
    pub fn with_collaborators(
        rack: Arc<dyn Rack>,
        writer: Arc<dyn ReadingWriter>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let context = ExecutionContext::new(rack.clone(), writer, sink.clone());
        Self {
            rack,
            sink,
            context,
            procedure: Procedure::default(),
        }
    }

    /// Parse and load a procedure file. Returns the number of top-level commands.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> SeqResult<usize> {
        let path = path.as_ref();
        let procedure = parser::parse_file(path)?;
        let count = self.load_procedure(procedure);
        self.sink.line(&format!(
            "Loaded {} top-level commands from {}",
            count,
            path.display()
        ));
        Ok(count)
    }

    /// Parse and load procedure text. Returns the number of top-level commands.
    pub fn load_str(&mut self, source: &str) -> SeqResult<usize> {
        let procedure = parser::parse_str(source)?;
        let count = self.load_procedure(procedure);
        self.sink
            .line(&format!("Loaded {} top-level commands", count));
        Ok(count)
    }

    /// Replace the loaded procedure.
    pub fn load_procedure(&mut self, procedure: Procedure) -> usize {
        info!(
            commands = procedure.commands.len(),
            total = procedure.command_count(),
            "Procedure loaded"
        );
        self.procedure = procedure;
        self.procedure.commands.len()
    }

    /// Top-level commands of the loaded procedure.
    pub fn commands(&self) -> &[Command] {
        &self.procedure.commands
    }

    /// `[EXPERIMENT]` pairs of the loaded procedure, in file order.
    pub fn metadata(&self) -> &[(String, String)] {
        &self.procedure.metadata
    }

    /// Value of one `[EXPERIMENT]` key.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.procedure.metadata_value(key)
    }

    /// State accumulated by runs so far.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The rack commands run against.
    pub fn rack(&self) -> &dyn Rack {
        self.rack.as_ref()
    }

    /// Indented text rendering of the loaded command tree.
    pub fn preview(&self) -> Vec<String> {
        render_tree(&self.procedure.commands)
    }

    /// Preview or execute the loaded procedure.
    pub async fn run(&mut self, mode: RunMode) -> SeqResult<()> {
        match mode {
            RunMode::Preview => {
                self.sink.line("=== DRY RUN MODE ===");
                for line in self.preview() {
                    self.sink.line(&line);
                }
                Ok(())
            }
            RunMode::Execute => self.execute().await,
        }
    }

    async fn execute(&mut self) -> SeqResult<()> {
        self.sink.line("=== STARTING SEQUENCE EXECUTION ===");
        info!(commands = self.procedure.commands.len(), "Sequence started");

        for command in &self.procedure.commands {
            if let Err(err) = command.execute(&mut self.context).await {
                self.sink.line("!!! EXECUTION FAILED !!!");
                self.sink.line(&format!("Error: {}", err));
                error!(command = %command, error = %err, "Sequence aborted");
                return Err(err);
            }
        }

        self.sink.line("=== SEQUENCE EXECUTION COMPLETE ===");
        info!(
            readings = self.context.readings().len(),
            logs = self.context.logs().len(),
            "Sequence complete"
        );
        Ok(())
    }
}
