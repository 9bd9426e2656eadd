#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod alarm;
pub mod auth;
pub mod backend;
pub mod config;
pub mod events;
pub mod flow;
pub mod flow_manager;
pub mod meter;
pub mod processors;
pub mod tap;

pub use alarm::{Alarm, AlarmManager};
pub use auth::{AuthenticationManager, TokenRecord, TokenStatus};
pub use flow::Flow;
pub use flow_manager::FlowManager;
pub use meter::{FlowMeter, MeterError};
pub use tap::{Tap, TapError, TapManager};
