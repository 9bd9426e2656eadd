//! Configuration types for the Kegbot core.
//!
//! These types represent the validated runtime configuration used by the core
//! and the server. The actual config loading/parsing is handled by the server
//! crate.

mod auth_device;
mod device;
mod general;
mod tap;

pub use auth_device::{AUTH_DEVICE_CORE_ONEWIRE, AUTH_DEVICE_CORE_RFID, AuthDevicePolicy, AuthPolicyTable};
pub use device::{DeviceConfig, STDIN_DEVICE_PATH};
pub use general::CoreConfig;
pub use tap::{DEFAULT_MAX_POUR_ML, TapConfig, default_max_tick_delta};
