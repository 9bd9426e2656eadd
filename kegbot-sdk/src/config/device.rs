//! Meter device configuration.

use std::time::Duration;

/// Path that selects standard input instead of a file or port.
pub const STDIN_DEVICE_PATH: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    /// Serial port, FIFO or regular file; [`STDIN_DEVICE_PATH`] for stdin.
    pub path: String,
    /// Upper bound on a single read, so shutdown is noticed promptly.
    pub poll_timeout: Duration,
    /// Pause before reopening a device that failed or reached end of stream.
    pub reopen_delay: Duration,
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            poll_timeout: Duration::from_millis(500),
            reopen_delay: Duration::from_secs(1),
        }
    }

    pub fn is_stdin(&self) -> bool {
        self.path == STDIN_DEVICE_PATH
    }
}
