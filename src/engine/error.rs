use crate::model::{Minute, format_clock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `start >= end`, or the window runs past midnight.
    InvalidInterval { start: Minute, end: Minute },
    InvalidTime(String),
    InvalidDate(String),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval { start, end } => write!(
                f,
                "invalid interval: start {} must be before end {}",
                format_clock(*start),
                format_clock(*end)
            ),
            EngineError::InvalidTime(raw) => write!(f, "invalid time of day: {raw:?} (expected HH:MM)"),
            EngineError::InvalidDate(raw) => write!(f, "invalid date: {raw:?} (expected YYYY-MM-DD)"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
