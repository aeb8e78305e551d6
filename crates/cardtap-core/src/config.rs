//! Configuration
//!
//! Session and capture settings, loadable from JSON files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::capture::ResetLine;
use crate::error::ConfigError;
use crate::packet::DEFAULT_BUFFER_CAPACITY;
use crate::timing::MAX_BASE_BAUD_RATE;

/// Baud rate of a 3.5712 MHz card clock at the default 372 ticks per ETU
pub const DEFAULT_BASE_BAUD_RATE: u32 = 9600;

/// Default serial read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Identifies the physical line a session decodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineHandle(pub String);

impl LineHandle {
    /// Create a handle from a port name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Port name of the line
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session settings, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Line the session is attached to
    pub line: LineHandle,
    /// Baud rate matching 372 clock ticks per ETU
    pub base_baud_rate: u32,
    /// Packet buffer size in bytes
    pub buffer_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            line: LineHandle::default(),
            base_baud_rate: DEFAULT_BASE_BAUD_RATE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Create a config for a line at the given base rate
    pub fn new(line: LineHandle, base_baud_rate: u32) -> Self {
        Self {
            line,
            base_baud_rate,
            ..Self::default()
        }
    }

    /// Override the packet buffer size
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Check values the session relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_baud_rate == 0 {
            return Err(ConfigError::ZeroBaudRate);
        }
        if self.base_baud_rate > MAX_BASE_BAUD_RATE {
            return Err(ConfigError::BaudRateTooHigh(self.base_baud_rate));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }
        Ok(())
    }
}

/// Capture settings: a session plus how to read its serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Session settings; `session.line` names the serial port
    pub session: SessionConfig,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Modem status line wired to the card's RST contact
    pub reset_line: Option<ResetLine>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            reset_line: None,
        }
    }
}

impl CaptureConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CaptureConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Check values the capture loop relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroReadTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.session.base_baud_rate, 9600);
        assert_eq!(config.session.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert!(config.reset_line.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            CaptureConfig::from_json_str(r#"{"session": {"line": "/dev/ttyUSB0"}, "reset_line": "cd"}"#)
                .expect("valid config");
        assert_eq!(config.session.line, LineHandle::new("/dev/ttyUSB0"));
        assert_eq!(config.session.base_baud_rate, DEFAULT_BASE_BAUD_RATE);
        assert_eq!(config.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        assert_eq!(config.reset_line, Some(ResetLine::Cd));
    }

    #[test]
    fn test_rejects_zero_values() {
        let err = CaptureConfig::from_json_str(r#"{"session": {"base_baud_rate": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroBaudRate));

        let err =
            CaptureConfig::from_json_str(r#"{"session": {"buffer_capacity": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroBufferCapacity));

        let err = CaptureConfig::from_json_str(r#"{"read_timeout_ms": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroReadTimeout));
    }

    #[test]
    fn test_rejects_oversized_base_rate() {
        let err = CaptureConfig::from_json_str(r#"{"session": {"base_baud_rate": 100000000}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::BaudRateTooHigh(100_000_000)));

        let config = SessionConfig::new(LineHandle::new("ttyS0"), MAX_BASE_BAUD_RATE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reset_line_spellings() {
        let config = CaptureConfig::from_json_str(r#"{"reset_line": "dcd"}"#).expect("valid config");
        assert_eq!(config.reset_line, Some(ResetLine::Cd));
        assert_eq!("dcd".parse::<ResetLine>(), Ok(ResetLine::Cd));
    }

    #[test]
    fn test_rejects_bad_json() {
        let err = CaptureConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
