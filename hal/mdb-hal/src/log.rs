//! Structured log sink
//!
//! The engine reports what it does as records: a level, a fixed event name,
//! and a short list of typed fields. Formatting and storage belong to the
//! sink.

/// Log verbosity, ordered from quietest to noisiest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LogLevel {
    /// Nothing is emitted
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

/// A typed field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    Bool(bool),
    Str(&'static str),
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&'static str> for Value {
    fn from(v: &'static str) -> Self {
        Value::Str(v)
    }
}

/// A named field attached to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Field {
    pub key: &'static str,
    pub value: Value,
}

impl Field {
    pub fn new(key: &'static str, value: impl Into<Value>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// One log record
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Record<'a> {
    pub level: LogLevel,
    /// Stable event name, e.g. `"reset.complete"`
    pub event: &'static str,
    pub fields: &'a [Field],
}

/// Destination for log records
pub trait LogSink {
    fn write(&mut self, record: &Record<'_>);
}

impl<T: LogSink + ?Sized> LogSink for &mut T {
    fn write(&mut self, record: &Record<'_>) {
        (**self).write(record)
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write(&mut self, _record: &Record<'_>) {}
}
