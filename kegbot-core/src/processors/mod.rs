//! Long-lived tasks of the accounting core.
//!
//! - `MeterReader`: one per device, parses lines into `InboundEvent`s
//! - `Heartbeat`: emits `HeartbeatTick` at a fixed interval
//! - `AlarmDispatcher`: turns fired alarms into `InboundEvent`s
//! - `CoreService`: single consumer of `InboundEvent`, drives the managers
//! - `DrinkRecorder`: records completed flows with the backend

pub mod alarm_dispatcher;
pub mod core_service;
pub mod drink_recorder;
pub mod heartbeat;
pub mod meter_reader;

pub use alarm_dispatcher::AlarmDispatcher;
pub use core_service::{CoreService, TapDiff};
pub use drink_recorder::{DrinkRecorder, calculate_retry_delay};
pub use heartbeat::Heartbeat;
pub use meter_reader::{DeviceError, LineDevice, MeterDevice, MeterReader, parse_line};
