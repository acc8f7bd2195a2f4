use std::fmt;

use super::error::SensorError;

/// Result type for sensor discovery and acquisition.
pub type SensorResult<T> = std::result::Result<T, SensorError>;

/// A measured value, stringified into the MQTT payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingValue {
    Float(f64),
    Integer(i64),
}

impl fmt::Display for ReadingValue {
    /// Floats always keep a fractional part (`21.0`, not `21`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Float(v) => write!(f, "{:?}", v),
            ReadingValue::Integer(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ReadingValue {
    fn from(value: f64) -> Self {
        ReadingValue::Float(value)
    }
}

impl From<i64> for ReadingValue {
    fn from(value: i64) -> Self {
        ReadingValue::Integer(value)
    }
}

impl From<u32> for ReadingValue {
    fn from(value: u32) -> Self {
        ReadingValue::Integer(value as i64)
    }
}

/// One (topic, value) pair produced by a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub topic: String,
    pub value: ReadingValue,
}

impl Reading {
    pub fn new(topic: impl Into<String>, value: impl Into<ReadingValue>) -> Self {
        Self {
            topic: topic.into(),
            value: value.into(),
        }
    }

    /// Stringified value as sent on the wire.
    pub fn payload(&self) -> String {
        self.value.to_string()
    }
}
