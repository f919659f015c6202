//! Procedure commands.
//!
//! [`Command`] is a closed set of variants, one per procedure keyword. Each
//! variant executes against an [`ExecutionContext`]; `Loop` owns its body and
//! executes it recursively. Commands are immutable once parsed.
//!
//! | Variant | Suspends | Fails when |
//! |---|---|---|
//! | `Initialize` | no | instrument missing, driver error |
//! | `SetParameter` | no | instrument missing, variable undefined, driver error |
//! | `Wait` | fixed sleep | never |
//! | `WaitStable` | 1 s between polls | instrument missing, timeout |
//! | `Record` | `interval` between readings | driver error (missing instruments are skipped) |
//! | `Log` | no | variable undefined |
//! | `SaveData` | no | variable undefined, storage error |
//! | `Loop` | via body | any body command fails |

use crate::core::{Reading, Value};
use crate::data::SaveOutcome;
use crate::error::{SeqResult, SequenceError};
use crate::sequencer::context::ExecutionContext;
use chrono::Utc;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::{debug, info};

/// Consecutive in-tolerance deltas `WAIT_STABLE` needs before it succeeds.
pub const REQUIRED_STABLE_READINGS: u32 = 5;

/// Time between `WAIT_STABLE` polls.
pub const STABILITY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A command argument that is either a literal or a `$variable` reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Used as-is at execution time
    Literal(Value),
    /// Looked up in the context at execution time
    Variable(String),
}

impl Operand {
    /// Sentinel prefix marking a variable reference.
    pub const VARIABLE_PREFIX: char = '$';

    /// Parse a value token, coercing literals to numbers where they parse cleanly.
    pub fn parse_value(token: &str) -> Self {
        let token = token.trim();
        match token.strip_prefix(Self::VARIABLE_PREFIX) {
            Some(name) => Operand::Variable(name.to_string()),
            None => Operand::Literal(Value::parse_literal(token)),
        }
    }

    /// Parse a text token; literals stay strings.
    pub fn parse_text(token: &str) -> Self {
        match token.strip_prefix(Self::VARIABLE_PREFIX) {
            Some(name) => Operand::Variable(name.to_string()),
            None => Operand::Literal(Value::Str(token.to_string())),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{}", value),
            Operand::Variable(name) => write!(f, "${}", name),
        }
    }
}

/// One executable step of a procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// `INIT name`
    Initialize {
        /// Rack name
        instrument: String,
    },
    /// `SET name.parameter = value`
    SetParameter {
        /// Rack name
        instrument: String,
        /// Parameter to write
        parameter: String,
        /// Literal or `$variable`
        value: Operand,
    },
    /// `WAIT seconds`
    Wait {
        /// Sleep length in seconds
        seconds: f64,
    },
    /// `WAIT_STABLE name.parameter TOLERANCE=t TIMEOUT=s`
    WaitStable {
        /// Rack name
        instrument: String,
        /// Parameter to poll
        parameter: String,
        /// Largest change between polls that counts as stable
        tolerance: f64,
        /// Seconds before giving up
        timeout: f64,
    },
    /// `RECORD a, b DURATION=s INTERVAL=s`
    Record {
        /// Rack names to read, in column order
        instruments: Vec<String>,
        /// Recording window in seconds
        duration: f64,
        /// Seconds between readings
        interval: f64,
    },
    /// `LOG message`
    Log {
        /// Literal text or `$variable`
        message: Operand,
    },
    /// `SAVE_DATA destination`
    SaveData {
        /// Literal destination or `$variable`
        filename: Operand,
    },
    /// `LOOP var IN v1, v2 ... END`
    Loop {
        /// Name bound on each iteration
        variable: String,
        /// Values bound in order
        values: Vec<Value>,
        /// Commands run once per value
        body: Vec<Command>,
    },
}

impl Command {
    /// Procedure keyword for this command.
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Initialize { .. } => "INIT",
            Command::SetParameter { .. } => "SET",
            Command::Wait { .. } => "WAIT",
            Command::WaitStable { .. } => "WAIT_STABLE",
            Command::Record { .. } => "RECORD",
            Command::Log { .. } => "LOG",
            Command::SaveData { .. } => "SAVE_DATA",
            Command::Loop { .. } => "LOOP",
        }
    }

    /// Execute against `ctx`.
    ///
    /// Boxed so that `Loop` can execute its body recursively.
    pub fn execute<'a>(&'a self, ctx: &'a mut ExecutionContext) -> BoxFuture<'a, SeqResult<()>> {
        Box::pin(async move {
            debug!(command = %self, "Executing command");
            match self {
                Command::Initialize { instrument } => initialize(ctx, instrument).await,
                Command::SetParameter {
                    instrument,
                    parameter,
                    value,
                } => set_parameter(ctx, instrument, parameter, value).await,
                Command::Wait { seconds } => wait(ctx, *seconds).await,
                Command::WaitStable {
                    instrument,
                    parameter,
                    tolerance,
                    timeout,
                } => wait_stable(ctx, instrument, parameter, *tolerance, *timeout).await,
                Command::Record {
                    instruments,
                    duration,
                    interval,
                } => record(ctx, instruments, *duration, *interval).await,
                Command::Log { message } => log_message(ctx, message),
                Command::SaveData { filename } => save_data(ctx, filename).await,
                Command::Loop {
                    variable,
                    values,
                    body,
                } => {
                    ctx.emit(&format!(
                        "Starting loop: {} over [{}]",
                        variable,
                        join_values(values)
                    ));
                    for value in values {
                        ctx.set_variable(variable.clone(), value.clone());
                        ctx.emit(&format!("--- Loop iteration: {} = {} ---", variable, value));
                        for command in body {
                            command.execute(ctx).await?;
                        }
                    }
                    ctx.emit("Loop complete");
                    Ok(())
                }
            }
        })
    }
}

/// Renders the command as a single procedure line.
///
/// A `Loop` renders only its header; see [`render_tree`] for bodies.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Initialize { instrument } => write!(f, "INIT {}", instrument),
            Command::SetParameter {
                instrument,
                parameter,
                value,
            } => write!(f, "SET {}.{} = {}", instrument, parameter, value),
            Command::Wait { seconds } => write!(f, "WAIT {}", seconds),
            Command::WaitStable {
                instrument,
                parameter,
                tolerance,
                timeout,
            } => write!(
                f,
                "WAIT_STABLE {}.{} TOLERANCE={} TIMEOUT={}",
                instrument, parameter, tolerance, timeout
            ),
            Command::Record {
                instruments,
                duration,
                interval,
            } => write!(
                f,
                "RECORD {} DURATION={} INTERVAL={}",
                instruments.join(", "),
                duration,
                interval
            ),
            Command::Log { message } => match message {
                Operand::Literal(text) => write!(f, "LOG \"{}\"", text),
                Operand::Variable(_) => write!(f, "LOG {}", message),
            },
            Command::SaveData { filename } => write!(f, "SAVE_DATA {}", filename),
            Command::Loop {
                variable, values, ..
            } => write!(f, "LOOP {} IN {}", variable, join_values(values)),
        }
    }
}

/// Render a command list as indented procedure text, two spaces per nesting level.
pub fn render_tree(commands: &[Command]) -> Vec<String> {
    fn walk(commands: &[Command], depth: usize, out: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        for command in commands {
            out.push(format!("{}{}", indent, command));
            if let Command::Loop { body, .. } = command {
                walk(body, depth + 1, out);
                out.push(format!("{}END", indent));
            }
        }
    }

    let mut out = Vec::new();
    walk(commands, 0, &mut out);
    out
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn seconds(value: f64, what: &str) -> SeqResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        SequenceError::InvalidArgument(format!(
            "{} must be a finite, non-negative number of seconds, got {}",
            what, value
        ))
    })
}

async fn initialize(ctx: &mut ExecutionContext, instrument: &str) -> SeqResult<()> {
    let device = ctx.instrument(instrument)?;
    ctx.emit(&format!("Initializing {}...", instrument));
    device
        .initialize()
        .await
        .map_err(|e| SequenceError::instrument(instrument, "initialize", e))?;
    info!(instrument, "Instrument initialized");
    Ok(())
}

async fn set_parameter(
    ctx: &mut ExecutionContext,
    instrument: &str,
    parameter: &str,
    value: &Operand,
) -> SeqResult<()> {
    let resolved = ctx.resolve(value)?;
    let device = ctx.instrument(instrument)?;
    ctx.emit(&format!("Setting {}.{} = {}", instrument, parameter, resolved));
    device
        .set_parameter(parameter, &resolved)
        .await
        .map_err(|e| SequenceError::instrument(instrument, format!("set_parameter({})", parameter), e))
}

async fn wait(ctx: &mut ExecutionContext, secs: f64) -> SeqResult<()> {
    let duration = seconds(secs, "WAIT duration")?;
    ctx.emit(&format!("Waiting for {} seconds...", secs));
    sleep(duration).await;
    Ok(())
}

async fn wait_stable(
    ctx: &mut ExecutionContext,
    instrument: &str,
    parameter: &str,
    tolerance: f64,
    timeout: f64,
) -> SeqResult<()> {
    if !(tolerance > 0.0) || !tolerance.is_finite() {
        return Err(SequenceError::InvalidArgument(format!(
            "WAIT_STABLE tolerance must be positive, got {}",
            tolerance
        )));
    }
    let limit = seconds(timeout, "WAIT_STABLE timeout")?;
    let device = ctx.instrument(instrument)?;

    ctx.emit(&format!(
        "Waiting for {}.{} to stabilize (tolerance={}, timeout={}s)...",
        instrument, parameter, tolerance, timeout
    ));

    let start = Instant::now();
    let mut stable_count = 0u32;
    let mut last_value: Option<f64> = None;

    while start.elapsed() < limit {
        let current = device.get_parameter(parameter).await.map_err(|e| {
            SequenceError::instrument(instrument, format!("get_parameter({})", parameter), e)
        })?;

        if let Some(previous) = last_value {
            if (current - previous).abs() <= tolerance {
                stable_count += 1;
                if stable_count >= REQUIRED_STABLE_READINGS {
                    ctx.emit(&format!("  Stabilized at {}", current));
                    return Ok(());
                }
            } else {
                stable_count = 0;
            }
        }
        debug!(instrument, parameter, current, stable_count, "Stability poll");

        last_value = Some(current);
        // The last sleep is cut short so a fractional timeout is honoured
        let remaining = limit.saturating_sub(start.elapsed());
        sleep(STABILITY_POLL_INTERVAL.min(remaining)).await;
    }

    Err(SequenceError::Timeout {
        instrument: instrument.to_string(),
        parameter: parameter.to_string(),
        timeout_secs: timeout,
    })
}

/// Readings are due at `start + k * interval` for every `k` with a due time
/// before `start + duration`. A slow read skips due times already passed.
/// Returns at `start + duration`, or when the last reading completes if that
/// read ran past it.
async fn record(
    ctx: &mut ExecutionContext,
    instruments: &[String],
    duration: f64,
    interval: f64,
) -> SeqResult<()> {
    let total = seconds(duration, "RECORD duration")?;
    let step = seconds(interval, "RECORD interval")?;
    if step.is_zero() {
        return Err(SequenceError::InvalidArgument(
            "RECORD interval must be greater than zero".to_string(),
        ));
    }

    ctx.emit(&format!(
        "Recording from {} for {}s at {}s intervals...",
        instruments.join(", "),
        duration,
        interval
    ));

    let start = Instant::now();
    let deadline = start.checked_add(total).ok_or_else(|| {
        SequenceError::InvalidArgument(format!("RECORD duration {}s is out of range", duration))
    })?;
    let mut count = 0usize;
    let mut k: u32 = 0;

    loop {
        let Some(due) = step.checked_mul(k).and_then(|offset| start.checked_add(offset)) else {
            break;
        };
        if due >= deadline {
            break;
        }
        sleep_until(due).await;

        let mut reading = Reading::new(Utc::now());
        for name in instruments {
            match ctx.rack().get_instrument(name) {
                Some(device) => {
                    let value = device
                        .read_value()
                        .await
                        .map_err(|e| SequenceError::instrument(name, "read_value", e))?;
                    reading.insert(name.clone(), value);
                }
                None => debug!(instrument = %name, "Skipping instrument not in rack"),
            }
        }
        ctx.add_reading(reading);
        count += 1;

        let behind = (start.elapsed().as_secs_f64() / interval).floor() as u32;
        k = k.saturating_add(1).max(behind.saturating_add(1));
    }

    sleep_until(deadline).await;
    ctx.emit(&format!("  Recorded {} data points", count));
    Ok(())
}

fn log_message(ctx: &mut ExecutionContext, message: &Operand) -> SeqResult<()> {
    let resolved = ctx.resolve(message)?.to_string();
    ctx.emit(&format!("LOG: {}", resolved));
    ctx.log(resolved);
    Ok(())
}

async fn save_data(ctx: &mut ExecutionContext, filename: &Operand) -> SeqResult<()> {
    let destination = ctx.resolve(filename)?.to_string();
    ctx.emit(&format!("Saving data to {}...", destination));
    match ctx.save_data(&destination).await? {
        SaveOutcome::Saved { path, rows } => {
            ctx.emit(&format!("Saved {} data points to {}", rows, path.display()));
        }
        SaveOutcome::NothingToSave => ctx.emit("No data to save"),
    }
    Ok(())
}
