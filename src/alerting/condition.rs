//! Alert condition grammar.
//!
//! A condition is a single `field OP value` expression over the probe
//! result. Parsing happens once per evaluation into a small sum type so
//! the hot path compares typed values instead of strings, and the
//! grammar stays open to extension.

use std::time::Duration;

use tracing::warn;

use crate::probe::ProbeResult;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Op {
    fn parse(token: &str) -> Option<Op> {
        match token {
            ">" => Some(Op::Gt),
            ">=" => Some(Op::Ge),
            "<" => Some(Op::Lt),
            "<=" => Some(Op::Le),
            "==" => Some(Op::Eq),
            "!=" => Some(Op::Ne),
            _ => None,
        }
    }

    fn compare<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            Op::Gt => left > right,
            Op::Ge => left >= right,
            Op::Lt => left < right,
            Op::Le => left <= right,
            Op::Eq => left == right,
            Op::Ne => left != right,
        }
    }
}

/// Parsed condition. `Unknown` never triggers.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `success == true` / `success == false` (and `!=` variants).
    SuccessIs(bool),

    /// `duration OP <humantime>`, e.g. `duration > 5s`.
    DurationCmp(Op, Duration),

    /// `status_code OP N`.
    StatusCmp(Op, u16),

    /// Anything unrecognised; logged once at parse time.
    Unknown,
}

impl Condition {
    pub fn parse(input: &str) -> Condition {
        let parsed = Self::try_parse(input);
        if parsed == Condition::Unknown {
            warn!(condition = %input, "unrecognised alert condition, treating as never-triggering");
        }
        parsed
    }

    fn try_parse(input: &str) -> Condition {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        if tokens.len() != 3 {
            return Condition::Unknown;
        }
        let (field, op, value) = (tokens[0], tokens[1], tokens[2]);
        let Some(op) = Op::parse(op) else {
            return Condition::Unknown;
        };

        match field {
            "success" => {
                let Ok(expected) = value.parse::<bool>() else {
                    return Condition::Unknown;
                };
                match op {
                    Op::Eq => Condition::SuccessIs(expected),
                    Op::Ne => Condition::SuccessIs(!expected),
                    _ => Condition::Unknown,
                }
            }
            "duration" => match humantime::parse_duration(value) {
                Ok(threshold) => Condition::DurationCmp(op, threshold),
                Err(_) => Condition::Unknown,
            },
            "status_code" => match value.parse::<u16>() {
                Ok(code) => Condition::StatusCmp(op, code),
                Err(_) => Condition::Unknown,
            },
            _ => Condition::Unknown,
        }
    }

    /// Whether the rule triggers for this result.
    pub fn evaluate(&self, result: &ProbeResult) -> bool {
        match self {
            Condition::SuccessIs(expected) => result.success == *expected,
            Condition::DurationCmp(op, threshold) => op.compare(result.duration, *threshold),
            Condition::StatusCmp(op, code) => op.compare(result.status_code, *code),
            Condition::Unknown => false,
        }
    }
}
