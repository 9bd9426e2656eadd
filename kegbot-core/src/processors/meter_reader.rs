//! MeterReader processor: one task per physical device.
//!
//! A device is a byte stream (serial port, FIFO, file or stdin) carrying one
//! message per line:
//!
//! ```text
//! meter <tap_name> <reading>
//! token <auth_device> <token_value> <tap_name> added|removed
//! flow <tap_name> start|stop
//! ```
//!
//! Blank lines and `#` comments are ignored. Malformed lines and read errors
//! are logged and the loop keeps going; end of stream reopens the device.

use crate::events::{InboundEvent, InboundEventSender};
use async_trait::async_trait;
use kegbot_sdk::config::DeviceConfig;
use kegbot_sdk::objects::{FlowRequest, MeterUpdate, TokenEvent};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed line {line:?}: {reason}")]
    Malformed { line: String, reason: String },
}

fn malformed(line: &str, reason: impl Into<String>) -> DeviceError {
    DeviceError::Malformed {
        line: line.to_string(),
        reason: reason.into(),
    }
}

/// Parse one protocol line. `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<InboundEvent>, DeviceError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let event = match fields.as_slice() {
        ["meter", tap_name, reading] => {
            let reading = reading
                .parse::<i64>()
                .map_err(|e| malformed(line, e.to_string()))?;
            InboundEvent::Meter(MeterUpdate {
                tap_name: tap_name.to_string(),
                reading,
            })
        }
        ["token", auth_device, token_value, tap_name, status] => {
            InboundEvent::Token(TokenEvent {
                auth_device: auth_device.to_string(),
                token_value: token_value.to_string(),
                tap_name: tap_name.to_string(),
                status: status.parse().map_err(|e: String| malformed(line, e))?,
            })
        }
        ["flow", tap_name, action] => InboundEvent::FlowRequest(FlowRequest {
            tap_name: tap_name.to_string(),
            action: action.parse().map_err(|e: String| malformed(line, e))?,
        }),
        [kind, ..] => return Err(malformed(line, format!("unknown or incomplete message: {kind}"))),
        [] => return Ok(None),
    };
    Ok(Some(event))
}

/// A source of protocol lines.
#[async_trait]
pub trait MeterDevice: Send {
    fn name(&self) -> &str;

    /// (Re)open the underlying handle.
    async fn open(&mut self) -> Result<(), DeviceError>;

    /// Next line, or `Ok(None)` at end of stream. Must be cancel safe.
    async fn read_line(&mut self) -> Result<Option<String>, DeviceError>;
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

enum Source {
    Path(String),
    Stdin,
    /// A one-shot reader; cannot be reopened.
    Reader(Option<BoxedReader>),
}

/// Line-oriented device backed by a file, stdin or an arbitrary reader.
pub struct LineDevice {
    name: String,
    source: Source,
    lines: Option<LinesStream<BufReader<BoxedReader>>>,
}

impl LineDevice {
    pub fn from_config(config: &DeviceConfig) -> Self {
        let source = if config.is_stdin() {
            Source::Stdin
        } else {
            Source::Path(config.path.clone())
        };
        Self {
            name: config.name.clone(),
            source,
            lines: None,
        }
    }

    pub fn from_reader(name: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            name: name.into(),
            source: Source::Reader(Some(Box::new(reader))),
            lines: None,
        }
    }
}

#[async_trait]
impl MeterDevice for LineDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self) -> Result<(), DeviceError> {
        let reader: BoxedReader = match &mut self.source {
            Source::Path(path) => Box::new(tokio::fs::File::open(path.as_str()).await?),
            Source::Stdin => Box::new(tokio::io::stdin()),
            Source::Reader(reader) => reader.take().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "reader exhausted")
            })?,
        };
        self.lines = Some(LinesStream::new(BufReader::new(reader).lines()));
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>, DeviceError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };
        match lines.next().await {
            Some(line) => Ok(Some(line?)),
            None => {
                self.lines = None;
                Ok(None)
            }
        }
    }
}

pub struct MeterReader<D> {
    device: D,
    poll_timeout: Duration,
    reopen_delay: Duration,
}

impl<D: MeterDevice> MeterReader<D> {
    pub fn new(device: D, poll_timeout: Duration, reopen_delay: Duration) -> Self {
        Self {
            device,
            poll_timeout,
            reopen_delay,
        }
    }

    /// Run the MeterReader until shutdown is signaled.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>, event_tx: InboundEventSender) {
        let name = self.device.name().to_string();
        info!(device = %name, "MeterReader started");
        let mut open = false;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if !open {
                match self.device.open().await {
                    Ok(()) => {
                        info!(device = %name, "Device opened");
                        open = true;
                    }
                    Err(e) => {
                        warn!(device = %name, error = %e, "Failed to open device");
                        if wait_or_shutdown(&mut shutdown_rx, self.reopen_delay).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let read = tokio::select! {
                biased;

                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }

                read = tokio::time::timeout(self.poll_timeout, self.device.read_line()) => read,
            };

            match read {
                // Poll timeout: loop around to observe shutdown.
                Err(_) => {}
                Ok(Ok(Some(line))) => match parse_line(&line) {
                    Ok(Some(event)) => {
                        debug!(device = %name, kind = event.kind(), "Read event");
                        if event_tx.send(event).await.is_err() {
                            info!(device = %name, "Inbound event channel closed");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(device = %name, error = %e, "Skipping malformed line"),
                },
                Ok(Ok(None)) => {
                    info!(device = %name, "Device reached end of stream, reopening");
                    open = false;
                    if wait_or_shutdown(&mut shutdown_rx, self.reopen_delay).await {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    warn!(device = %name, error = %e, "Device read failed, reopening");
                    open = false;
                    if wait_or_shutdown(&mut shutdown_rx, self.reopen_delay).await {
                        break;
                    }
                }
            }
        }

        info!(device = %name, "MeterReader shutdown complete");
    }
}

/// Sleep for `delay`; returns true if shutdown was signaled meanwhile.
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        biased;
        res = shutdown_rx.changed() => res.is_err() || *shutdown_rx.borrow(),
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::inbound_event_channel;
    use kegbot_sdk::objects::{AuthStatus, FlowAction};

    #[test]
    fn test_parse_lines() {
        assert_eq!(
            parse_line("meter kegboard.flow0 1200").unwrap(),
            Some(InboundEvent::Meter(MeterUpdate {
                tap_name: "kegboard.flow0".to_string(),
                reading: 1200,
            }))
        );
        assert_eq!(
            parse_line("  token core.rfid 3333 __all_taps__ removed ").unwrap(),
            Some(InboundEvent::Token(TokenEvent {
                auth_device: "core.rfid".to_string(),
                token_value: "3333".to_string(),
                tap_name: "__all_taps__".to_string(),
                status: AuthStatus::Removed,
            }))
        );
        assert_eq!(
            parse_line("flow kegboard.flow0 stop").unwrap(),
            Some(InboundEvent::FlowRequest(FlowRequest {
                tap_name: "kegboard.flow0".to_string(),
                action: FlowAction::Stop,
            }))
        );
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("# comment").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for line in [
            "meter kegboard.flow0",
            "meter kegboard.flow0 lots",
            "token core.rfid 3333 tap maybe",
            "flow kegboard.flow0 pause",
            "thermo sensor0 4.5",
        ] {
            assert!(
                matches!(parse_line(line), Err(DeviceError::Malformed { .. })),
                "{line}"
            );
        }
        // Negative readings parse; the meter rejects them.
        assert!(parse_line("meter a -1").unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_forwards_events_and_skips_bad_lines() {
        let input: &'static [u8] = b"meter a 100\nbogus line\n\n# note\nflow a start\nmeter a 150\n";
        let device = LineDevice::from_reader("test", input);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, mut event_rx) = inbound_event_channel();
        let reader = MeterReader::new(device, Duration::from_millis(100), Duration::from_secs(1));
        let handle = tokio::spawn(reader.run(shutdown_rx, event_tx));

        let kinds: Vec<_> = [
            event_rx.recv().await.unwrap(),
            event_rx.recv().await.unwrap(),
            event_rx.recv().await.unwrap(),
        ]
        .iter()
        .map(|e| e.kind())
        .collect();
        assert_eq!(kinds, ["meter", "flow_request", "meter"]);

        // End of stream: the one-shot reader cannot reopen, but the task keeps
        // running until shutdown.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_finished());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
