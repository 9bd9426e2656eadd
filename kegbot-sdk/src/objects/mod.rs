pub mod api;
pub mod auth;
pub mod drink;
pub mod events;
pub mod flow;
pub mod inbound;
pub mod relay;
pub mod tap;

pub use api::{ApiEnvelope, ApiErrorBody, EnvelopeError};
pub use auth::{ALL_TAPS_ALIAS, AuthStatus, AuthToken, UserAuthEvent};
pub use drink::{DrinkCreated, DrinkRecord, RecordDrinkRequest};
pub use events::OutboundEvent;
pub use flow::{FlowState, FlowStateChange, FlowUpdate};
pub use inbound::{FlowAction, FlowRequest, HeartbeatTick, MeterUpdate, TokenEvent};
pub use relay::{RelayMode, SetRelayOutput};
pub use tap::{TapDetail, TapDetailSet, TapInfo};
