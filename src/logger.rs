//! Leveled logger writing through a pluggable sink.

use std::rc::Rc;
use std::str::FromStr;

use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    None,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "none" | "off" => Ok(LogLevel::None),
            _ => Err(ConfigError::InvalidValue {
                key: crate::config::LOG_LEVEL_KEY,
                value: s.to_string(),
            }),
        }
    }
}

/// Destination for formatted log lines.
pub trait LogSink {
    fn write(&self, level: LogLevel, line: &str);
}

impl<S: LogSink + ?Sized> LogSink for Rc<S> {
    fn write(&self, level: LogLevel, line: &str) {
        (**self).write(level, line)
    }
}

/// Writes to the Workers console.
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Debug | LogLevel::Info => {
                worker::console_log!("{}", line);
            }
            LogLevel::Warn => {
                worker::console_warn!("{}", line);
            }
            LogLevel::Error => {
                worker::console_error!("{}", line);
            }
            LogLevel::None => {}
        }
    }
}

pub struct Logger {
    level: LogLevel,
    prefix: String,
    sink: Box<dyn LogSink>,
}

impl Logger {
    /// Logger writing to the Workers console.
    pub fn new(level: LogLevel, prefix: impl Into<String>) -> Self {
        Self::with_sink(level, prefix, ConsoleSink)
    }

    pub fn with_sink(level: LogLevel, prefix: impl Into<String>, sink: impl LogSink + 'static) -> Self {
        Self {
            level,
            prefix: prefix.into(),
            sink: Box::new(sink),
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        if level != LogLevel::None && self.level <= level {
            self.sink.write(level, &format!("{}{}", self.prefix, message));
        }
    }
}
