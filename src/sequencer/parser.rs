//! Procedure text -> command tree.
//!
//! A procedure file is split into bracketed sections. `[EXPERIMENT]` holds free
//! `key=value` metadata, `[SEQUENCE]` holds one command per line. Any other
//! section is ignored. Section names are case-insensitive.
//!
//! ```text
//! [EXPERIMENT]
//! name = Temperature sweep
//!
//! [SEQUENCE]
//! INIT temp_ctrl
//! LOOP t IN 20, 25, 30
//!     SET temp_ctrl.setpoint = $t
//!     WAIT_STABLE temp_ctrl.temperature TOLERANCE=0.1 TIMEOUT=300
//!     RECORD sensor1, sensor2 DURATION=10 INTERVAL=1
//! END
//! SAVE_DATA sweep.csv
//! ```
//!
//! Keywords are matched case-insensitively against the first token of a
//! line through [`COMMAND_TABLE`]; `LOOP` and `END` are structural and handled
//! by `parse_block`. Options of `WAIT_STABLE` and `RECORD` are `KEY=value`
//! tokens in any order, keys case-insensitive, each exactly once.
//!
//! Parsing is fully static: no rack lookups happen here.

use crate::core::Value;
use crate::error::{ParseError, ParseErrorKind, SeqResult};
use crate::sequencer::command::{Command, Operand};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;

const LOOP: &str = "LOOP";
const END: &str = "END";
const EXPERIMENT_SECTION: &str = "EXPERIMENT";
const SEQUENCE_SECTION: &str = "SEQUENCE";

#[allow(clippy::expect_used)]
static TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\.(\w+)$").expect("target pattern is valid"));

#[allow(clippy::expect_used)]
static ASSIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\.(\w+)\s*=\s*(.+)$").expect("assignment pattern is valid"));

#[allow(clippy::expect_used)]
static LOOP_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\s+(?i:IN)\s+(.+)$").expect("loop pattern is valid"));

/// A parsed procedure file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Procedure {
    /// `[EXPERIMENT]` key/value pairs in file order; a repeated key keeps
    /// its first position and takes the last value
    pub metadata: Vec<(String, String)>,
    /// Top-level commands in document order
    pub commands: Vec<Command>,
}

impl Procedure {
    /// Value of an `[EXPERIMENT]` key, if present.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Total number of commands, loop bodies included (each counted once).
    pub fn command_count(&self) -> usize {
        fn count(commands: &[Command]) -> usize {
            commands
                .iter()
                .map(|command| match command {
                    Command::Loop { body, .. } => 1 + count(body),
                    _ => 1,
                })
                .sum()
        }
        count(&self.commands)
    }
}

/// One line of the `[SEQUENCE]` section with its 1-based file line number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SourceLine<'a> {
    number: usize,
    text: &'a str,
}

/// Sub-grammar checker for one keyword: receives the text after the keyword.
pub type CommandGrammar = fn(&str) -> Result<Command, String>;

/// Keyword -> sub-grammar dispatch for every non-structural command.
pub static COMMAND_TABLE: &[(&str, CommandGrammar)] = &[
    ("INIT", parse_init),
    ("SET", parse_set),
    ("WAIT", parse_wait),
    ("WAIT_STABLE", parse_wait_stable),
    ("RECORD", parse_record),
    ("LOG", parse_log),
    ("SAVE_DATA", parse_save_data),
];

/// Read and parse a procedure file.
pub fn parse_file(path: impl AsRef<Path>) -> SeqResult<Procedure> {
    let source = std::fs::read_to_string(path.as_ref())?;
    Ok(parse_str(&source)?)
}

/// Parse a complete procedure (sections and all).
pub fn parse_str(source: &str) -> Result<Procedure, ParseError> {
    let mut metadata: Vec<(String, String)> = Vec::new();
    let mut sequence = Vec::new();
    let mut section: Option<String> = None;
    let mut has_sequence = false;

    for (index, raw) in source.lines().enumerate() {
        let stripped = raw.trim();
        if stripped.starts_with('[') && stripped.ends_with(']') && stripped.len() >= 2 {
            let name = stripped[1..stripped.len() - 1].trim().to_ascii_uppercase();
            has_sequence |= name == SEQUENCE_SECTION;
            section = Some(name);
            continue;
        }

        match section.as_deref() {
            Some(EXPERIMENT_SECTION) => {
                if is_skippable(stripped) {
                    continue;
                }
                if let Some((key, value)) = stripped.split_once('=') {
                    let (key, value) = (key.trim(), value.trim().to_string());
                    match metadata.iter_mut().find(|(name, _)| name == key) {
                        Some(entry) => entry.1 = value,
                        None => metadata.push((key.to_string(), value)),
                    }
                }
            }
            Some(SEQUENCE_SECTION) => sequence.push(SourceLine {
                number: index + 1,
                text: raw,
            }),
            _ => {}
        }
    }

    if !has_sequence {
        return Err(ParseError::new(0, "", ParseErrorKind::MissingSequenceSection));
    }

    let commands = parse_block(&sequence)?;
    tracing::debug!(
        commands = commands.len(),
        metadata = metadata.len(),
        "Parsed procedure"
    );
    Ok(Procedure { metadata, commands })
}

/// Parse bare sequence lines (no section headers). Line numbers start at 1.
pub fn parse_sequence(body: &str) -> Result<Vec<Command>, ParseError> {
    let lines: Vec<SourceLine<'_>> = body
        .lines()
        .enumerate()
        .map(|(index, text)| SourceLine {
            number: index + 1,
            text,
        })
        .collect();
    parse_block(&lines)
}

fn is_skippable(text: &str) -> bool {
    text.is_empty() || text.starts_with('#')
}

/// Split a trimmed line into its keyword and the trimmed remainder.
fn split_keyword(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (text, ""),
    }
}

/// Parse `lines` into a command list, recursing into loop bodies.
///
/// An `END` seen here has no enclosing `LOOP` in this block: matched `END`
/// lines are consumed by [`find_matching_end`] before the body is recursed into.
fn parse_block(lines: &[SourceLine<'_>]) -> Result<Vec<Command>, ParseError> {
    let mut commands = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let text = line.text.trim();
        if is_skippable(text) {
            index += 1;
            continue;
        }

        let (keyword, rest) = split_keyword(text);
        if keyword.eq_ignore_ascii_case(END) {
            return Err(ParseError::new(
                line.number,
                text,
                ParseErrorKind::StrayTerminator,
            ));
        }

        if keyword.eq_ignore_ascii_case(LOOP) {
            let (variable, values) = parse_loop_header(rest)
                .map_err(|reason| ParseError::invalid_syntax(line.number, text, LOOP, reason))?;
            let end = find_matching_end(lines, index)?;
            let body = parse_block(&lines[index + 1..end])?;
            commands.push(Command::Loop {
                variable,
                values,
                body,
            });
            index = end + 1;
            continue;
        }

        commands.push(parse_command(line.number, text, keyword, rest)?);
        index += 1;
    }

    Ok(commands)
}

/// Index of the `END` closing the `LOOP` at `loop_index`.
///
/// Nested `LOOP` lines open a level and their `END` lines close it; the first
/// `END` found at level zero belongs to the outer loop.
pub(crate) fn find_matching_end(
    lines: &[SourceLine<'_>],
    loop_index: usize,
) -> Result<usize, ParseError> {
    let mut depth = 0usize;

    for (index, line) in lines.iter().enumerate().skip(loop_index + 1) {
        let text = line.text.trim();
        if is_skippable(text) {
            continue;
        }
        let (keyword, rest) = split_keyword(text);
        if keyword.eq_ignore_ascii_case(LOOP) {
            depth += 1;
        } else if keyword.eq_ignore_ascii_case(END) {
            if !rest.is_empty() {
                return Err(ParseError::invalid_syntax(
                    line.number,
                    text,
                    END,
                    "END takes no arguments",
                ));
            }
            if depth == 0 {
                return Ok(index);
            }
            depth -= 1;
        }
    }

    let opener = lines[loop_index];
    Err(ParseError::new(
        opener.number,
        opener.text,
        ParseErrorKind::UnterminatedLoop,
    ))
}

fn parse_command(number: usize, text: &str, keyword: &str, rest: &str) -> Result<Command, ParseError> {
    let (canonical, grammar) = COMMAND_TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(keyword))
        .copied()
        .ok_or_else(|| {
            ParseError::new(
                number,
                text,
                ParseErrorKind::UnknownKeyword(keyword.to_string()),
            )
        })?;

    grammar(rest).map_err(|reason| ParseError::invalid_syntax(number, text, canonical, reason))
}

// =============================================================================
// Sub-grammars
// =============================================================================

fn is_identifier(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn single_token<'a>(rest: &'a str, what: &str) -> Result<&'a str, String> {
    let mut tokens = rest.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(token), None) => Ok(token),
        (None, _) => Err(format!("expected {}", what)),
        (Some(_), Some(_)) => Err(format!("expected a single {}", what)),
    }
}

fn check_variable(operand: &Operand) -> Result<(), String> {
    match operand {
        Operand::Variable(name) if name.is_empty() => {
            Err("variable reference is missing a name after '$'".to_string())
        }
        _ => Ok(()),
    }
}

fn parse_target(token: &str) -> Result<(String, String), String> {
    TARGET
        .captures(token)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .ok_or_else(|| format!("expected instrument.parameter, found '{}'", token))
}

fn parse_number(key: &str, raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| format!("{} must be a number, found '{}'", key, raw))
}

/// Parse `KEY=value` tokens into numbers ordered like `keys`.
fn parse_options(tokens: &[&str], keys: &[&'static str]) -> Result<Vec<f64>, String> {
    let mut values: Vec<Option<f64>> = vec![None; keys.len()];

    for token in tokens {
        let (key, raw) = token
            .split_once('=')
            .ok_or_else(|| format!("expected KEY=value, found '{}'", token))?;
        let slot = keys
            .iter()
            .position(|name| name.eq_ignore_ascii_case(key))
            .ok_or_else(|| format!("unknown option '{}'", key))?;
        if values[slot].is_some() {
            return Err(format!("{} given more than once", keys[slot]));
        }
        values[slot] = Some(parse_number(keys[slot], raw)?);
    }

    keys.iter()
        .zip(values)
        .map(|(key, value)| value.ok_or_else(|| format!("missing {}=<number>", key)))
        .collect()
}

fn parse_init(rest: &str) -> Result<Command, String> {
    let instrument = single_token(rest, "an instrument name")?;
    if !is_identifier(instrument) {
        return Err(format!("invalid instrument name '{}'", instrument));
    }
    Ok(Command::Initialize {
        instrument: instrument.to_string(),
    })
}

fn parse_set(rest: &str) -> Result<Command, String> {
    let caps = ASSIGNMENT
        .captures(rest)
        .ok_or_else(|| "expected instrument.parameter = value".to_string())?;
    let value = Operand::parse_value(&caps[3]);
    check_variable(&value)?;
    Ok(Command::SetParameter {
        instrument: caps[1].to_string(),
        parameter: caps[2].to_string(),
        value,
    })
}

fn parse_wait(rest: &str) -> Result<Command, String> {
    let raw = single_token(rest, "a duration in seconds")?;
    let seconds = parse_number("duration", raw)?;
    if seconds < 0.0 {
        return Err(format!("duration cannot be negative, found {}", seconds));
    }
    Ok(Command::Wait { seconds })
}

fn parse_wait_stable(rest: &str) -> Result<Command, String> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let (target, options) = tokens
        .split_first()
        .ok_or_else(|| "expected instrument.parameter TOLERANCE=<num> TIMEOUT=<num>".to_string())?;
    let (instrument, parameter) = parse_target(target)?;

    let values = parse_options(options, &["TOLERANCE", "TIMEOUT"])?;
    let (tolerance, timeout) = (values[0], values[1]);
    if tolerance <= 0.0 {
        return Err(format!("TOLERANCE must be positive, found {}", tolerance));
    }
    if timeout <= 0.0 {
        return Err(format!("TIMEOUT must be positive, found {}", timeout));
    }

    Ok(Command::WaitStable {
        instrument,
        parameter,
        tolerance,
        timeout,
    })
}

fn parse_record(rest: &str) -> Result<Command, String> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let split = tokens
        .iter()
        .position(|token| token.contains('='))
        .unwrap_or(tokens.len());
    let (names, options) = tokens.split_at(split);

    let instruments: Vec<String> = names
        .join(" ")
        .split(',')
        .map(str::trim)
        .map(str::to_string)
        .collect();
    if instruments.iter().all(String::is_empty) {
        return Err("expected at least one instrument name".to_string());
    }
    if let Some(bad) = instruments.iter().find(|name| !is_identifier(name)) {
        return Err(format!("invalid instrument name '{}'", bad));
    }

    let values = parse_options(options, &["DURATION", "INTERVAL"])?;
    let (duration, interval) = (values[0], values[1]);
    if duration < 0.0 {
        return Err(format!("DURATION cannot be negative, found {}", duration));
    }
    if interval <= 0.0 {
        return Err(format!("INTERVAL must be positive, found {}", interval));
    }

    Ok(Command::Record {
        instruments,
        duration,
        interval,
    })
}

fn parse_log(rest: &str) -> Result<Command, String> {
    if rest.is_empty() {
        return Err("expected a message".to_string());
    }
    let message = Operand::parse_text(strip_quotes(rest));
    check_variable(&message)?;
    Ok(Command::Log { message })
}

/// Remove one pair of matching surrounding quotes.
fn strip_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

fn parse_save_data(rest: &str) -> Result<Command, String> {
    let filename = Operand::parse_text(single_token(rest, "a filename")?);
    check_variable(&filename)?;
    Ok(Command::SaveData { filename })
}

fn parse_loop_header(rest: &str) -> Result<(String, Vec<Value>), String> {
    let caps = LOOP_HEADER
        .captures(rest)
        .ok_or_else(|| "expected LOOP variable IN v1, v2, ...".to_string())?;

    let mut values = Vec::new();
    for item in caps[2].split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err("empty value in loop list".to_string());
        }
        values.push(Value::parse_literal(item));
    }
    Ok((caps[1].to_string(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(body: &str) -> Vec<SourceLine<'_>> {
        body.lines()
            .enumerate()
            .map(|(index, text)| SourceLine {
                number: index + 1,
                text,
            })
            .collect()
    }

    fn kind(result: Result<Vec<Command>, ParseError>) -> ParseErrorKind {
        result.unwrap_err().kind
    }

    #[test]
    fn test_metadata_keeps_file_order() {
        let procedure = parse_str(
            "[EXPERIMENT]\n\
             zeta = 1\n\
             alpha = 2\n\
             zeta = 3\n\
             [SEQUENCE]\n\
             WAIT 0\n",
        )
        .unwrap();

        assert_eq!(
            procedure.metadata,
            vec![
                ("zeta".to_string(), "3".to_string()),
                ("alpha".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_sections_and_metadata() {
        let procedure = parse_str(
            "[EXPERIMENT]\n\
             name = Sweep\n\
             # operator = nobody\n\
             operator=alice\n\
             [NOTES]\n\
             INIT ignored\n\
             [sequence]\n\
             INIT temp_ctrl\n",
        )
        .unwrap();

        assert_eq!(procedure.metadata_value("name"), Some("Sweep"));
        assert_eq!(procedure.metadata_value("operator"), Some("alice"));
        assert_eq!(procedure.metadata.len(), 2);
        assert_eq!(
            procedure.commands,
            vec![Command::Initialize {
                instrument: "temp_ctrl".into()
            }]
        );
    }

    #[test]
    fn test_missing_sequence_section() {
        let err = parse_str("[EXPERIMENT]\nname=x\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingSequenceSection);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let commands = parse_sequence("init dev\nWait 2\nsave_data out.csv").unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[1], Command::Wait { seconds: 2.0 });
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        let commands = parse_sequence("\n# comment\n   \nINIT dev\n  # indented comment").unwrap();
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn test_set_coerces_literals() {
        let commands = parse_sequence(
            "SET dev.a = 3.5\nSET dev.b = 3\nSET dev.c = abc\nSET dev.d = $x\nSET dev.e=fast mode",
        )
        .unwrap();
        let values: Vec<Operand> = commands
            .into_iter()
            .map(|command| match command {
                Command::SetParameter { value, .. } => value,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            values,
            vec![
                Operand::Literal(Value::Float(3.5)),
                Operand::Literal(Value::Int(3)),
                Operand::Literal(Value::Str("abc".into())),
                Operand::Variable("x".into()),
                Operand::Literal(Value::Str("fast mode".into())),
            ]
        );
    }

    #[test]
    fn test_set_requires_assignment() {
        let err = parse_sequence("SET dev.setpoint 25").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(matches!(err.kind, ParseErrorKind::InvalidSyntax { ref keyword, .. } if keyword == "SET"));

        let err = parse_sequence("SET dev.setpoint = $").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidSyntax { .. }));
    }

    #[test]
    fn test_wait_stable_options_any_order() {
        let expected = Command::WaitStable {
            instrument: "temp_ctrl".into(),
            parameter: "temperature".into(),
            tolerance: 0.1,
            timeout: 60.0,
        };
        let canonical =
            parse_sequence("WAIT_STABLE temp_ctrl.temperature TOLERANCE=0.1 TIMEOUT=60").unwrap();
        let swapped =
            parse_sequence("wait_stable temp_ctrl.temperature timeout=60 Tolerance=0.1").unwrap();
        assert_eq!(canonical, vec![expected.clone()]);
        assert_eq!(swapped, vec![expected]);
    }

    #[test]
    fn test_wait_stable_rejects_bad_options() {
        for line in [
            "WAIT_STABLE temp_ctrl.temperature TOLERANCE=0.1",
            "WAIT_STABLE temp_ctrl.temperature TOLERANCE=0.1 TIMEOUT=60 TIMEOUT=5",
            "WAIT_STABLE temp_ctrl.temperature TOLERANCE=0 TIMEOUT=60",
            "WAIT_STABLE temp_ctrl.temperature TOLERANCE=0.1 TIMEOUT=soon",
            "WAIT_STABLE temp_ctrl.temperature TOLERANCE=0.1 TIMEOUT=60 RATE=2",
            "WAIT_STABLE temp_ctrl TOLERANCE=0.1 TIMEOUT=60",
        ] {
            let err = parse_sequence(line).unwrap_err();
            assert!(
                matches!(err.kind, ParseErrorKind::InvalidSyntax { ref keyword, .. } if keyword == "WAIT_STABLE"),
                "{} -> {:?}",
                line,
                err
            );
        }
    }

    #[test]
    fn test_record_grammar() {
        let commands = parse_sequence("RECORD sensor1, sensor2,sensor3 INTERVAL=0.5 duration=10").unwrap();
        assert_eq!(
            commands,
            vec![Command::Record {
                instruments: vec!["sensor1".into(), "sensor2".into(), "sensor3".into()],
                duration: 10.0,
                interval: 0.5,
            }]
        );

        assert!(parse_sequence("RECORD DURATION=1 INTERVAL=1").is_err());
        assert!(parse_sequence("RECORD a,,b DURATION=1 INTERVAL=1").is_err());
        assert!(parse_sequence("RECORD a DURATION=1 INTERVAL=0").is_err());
    }

    #[test]
    fn test_log_and_save_data() {
        let commands = parse_sequence(
            "LOG \"setpoint reached $setpoint\"\nLOG $status\nLOG plain text\nSAVE_DATA $file\nSAVE_DATA run.csv",
        )
        .unwrap();
        assert_eq!(
            commands,
            vec![
                Command::Log {
                    message: Operand::Literal(Value::Str("setpoint reached $setpoint".into()))
                },
                Command::Log {
                    message: Operand::Variable("status".into())
                },
                Command::Log {
                    message: Operand::Literal(Value::Str("plain text".into()))
                },
                Command::SaveData {
                    filename: Operand::Variable("file".into())
                },
                Command::SaveData {
                    filename: Operand::Literal(Value::Str("run.csv".into()))
                },
            ]
        );

        assert!(parse_sequence("SAVE_DATA a.csv b.csv").is_err());
        assert!(parse_sequence("LOG").is_err());
    }

    #[test]
    fn test_unknown_keyword_names_line() {
        let err = parse_sequence("INIT dev\n\nFROB dev").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.text, "FROB dev");
        assert_eq!(err.kind, ParseErrorKind::UnknownKeyword("FROB".into()));
    }

    #[test]
    fn test_keyword_prefix_is_not_a_match() {
        let err = parse_sequence("WAITING 5").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownKeyword("WAITING".into()));
    }

    #[test]
    fn test_loop_values_coerced() {
        let commands = parse_sequence("LOOP x IN 1, 2.5, high\nWAIT 0\nEND").unwrap();
        match &commands[0] {
            Command::Loop {
                variable,
                values,
                body,
            } => {
                assert_eq!(variable, "x");
                assert_eq!(
                    values,
                    &vec![Value::Int(1), Value::Float(2.5), Value::Str("high".into())]
                );
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected loop, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_loops() {
        let commands = parse_sequence(
            "LOOP a IN 1, 2\n\
               LOOP b IN x, y, z\n\
                 INIT dev\n\
                 WAIT 0\n\
               end\n\
               LOG done\n\
             END\n\
             INIT after",
        )
        .unwrap();

        assert_eq!(commands.len(), 2);
        let Command::Loop { body, .. } = &commands[0] else {
            panic!("expected outer loop");
        };
        assert_eq!(body.len(), 2);
        let Command::Loop { body: inner, values, .. } = &body[0] else {
            panic!("expected inner loop");
        };
        assert_eq!(values.len(), 3);
        assert_eq!(inner.len(), 2);
        assert_eq!(
            commands[1],
            Command::Initialize {
                instrument: "after".into()
            }
        );
    }

    #[test]
    fn test_find_matching_end_skips_nested_pairs() {
        let source = lines("LOOP a IN 1\nLOOP b IN 2\nEND\n# END\nEND\nEND");
        assert_eq!(find_matching_end(&source, 0).unwrap(), 4);
        assert_eq!(find_matching_end(&source, 1).unwrap(), 2);
    }

    #[test]
    fn test_unterminated_loop() {
        let err = parse_sequence("INIT dev\nLOOP x IN 1, 2\nLOOP y IN 3\nEND").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedLoop);
        assert_eq!(err.line, 2);

        assert_eq!(kind(parse_sequence("LOOP x IN 1")), ParseErrorKind::UnterminatedLoop);
    }

    #[test]
    fn test_stray_terminator() {
        let err = parse_sequence("INIT dev\nEND").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::StrayTerminator);
        assert_eq!(err.line, 2);

        assert_eq!(
            kind(parse_sequence("LOOP x IN 1\nEND\nEND")),
            ParseErrorKind::StrayTerminator
        );
    }

    #[test]
    fn test_loop_header_errors() {
        assert!(matches!(
            kind(parse_sequence("LOOP x 1, 2\nEND")),
            ParseErrorKind::InvalidSyntax { .. }
        ));
        assert!(matches!(
            kind(parse_sequence("LOOP x IN 1,,2\nEND")),
            ParseErrorKind::InvalidSyntax { .. }
        ));
        assert!(matches!(
            kind(parse_sequence("LOOP x IN 1\nEND now")),
            ParseErrorKind::InvalidSyntax { .. }
        ));
    }

    #[test]
    fn test_errors_inside_loop_body_report_file_line() {
        let err = parse_str("[SEQUENCE]\nLOOP x IN 1\n  BOGUS\nEND\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.text, "BOGUS");
    }

    #[test]
    fn test_command_count() {
        let procedure = parse_str("[SEQUENCE]\nLOOP x IN 1\nLOOP y IN 1\nWAIT 0\nEND\nEND\nINIT d").unwrap();
        assert_eq!(procedure.commands.len(), 2);
        assert_eq!(procedure.command_count(), 4);
    }
}
