//! Wire event definitions and inbound validation.

pub mod types;
pub mod validator;

pub use types::{AckReply, ErrorBody, InboundEvent, InboundFrame, MessageDraft, OutboundEvent};
