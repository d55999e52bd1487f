//! Structured logger
//!
//! Filters records by level and hands them to the injected [`LogSink`].
//! With the `defmt` feature every forwarded record is mirrored to defmt.

use mdb_hal::{Field, LogLevel, LogSink, Record};

/// Leveled front end for a [`LogSink`]
#[derive(Debug)]
pub struct Logger<S> {
    sink: S,
    threshold: LogLevel,
}

impl<S: LogSink> Logger<S> {
    pub fn new(sink: S, threshold: LogLevel) -> Self {
        Self { sink, threshold }
    }

    pub fn set_threshold(&mut self, threshold: LogLevel) {
        self.threshold = threshold;
    }

    /// Whether a record at `level` would be forwarded
    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::None && level <= self.threshold
    }

    pub fn log(&mut self, level: LogLevel, event: &'static str, fields: &[Field]) {
        if !self.enabled(level) {
            return;
        }

        #[cfg(feature = "defmt")]
        match level {
            LogLevel::Error => defmt::error!("{=str} {}", event, fields),
            LogLevel::Warning => defmt::warn!("{=str} {}", event, fields),
            LogLevel::Info => defmt::info!("{=str} {}", event, fields),
            LogLevel::Debug => defmt::debug!("{=str} {}", event, fields),
            LogLevel::None => {}
        }

        self.sink.write(&Record {
            level,
            event,
            fields,
        });
    }

    pub fn error(&mut self, event: &'static str, fields: &[Field]) {
        self.log(LogLevel::Error, event, fields);
    }

    pub fn warn(&mut self, event: &'static str, fields: &[Field]) {
        self.log(LogLevel::Warning, event, fields);
    }

    pub fn info(&mut self, event: &'static str, fields: &[Field]) {
        self.log(LogLevel::Info, event, fields);
    }

    pub fn debug(&mut self, event: &'static str, fields: &[Field]) {
        self.log(LogLevel::Debug, event, fields);
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
