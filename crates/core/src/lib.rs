//! Core traits and types for the callflow voice loop
//!
//! This crate provides foundational types used across all other crates:
//! - Session identity and per-call telephony context
//! - The `CallChannel` trait (black-box call-control collaborator) and its
//!   event stream
//! - Provider-neutral chat and tool-calling shapes

pub mod call;
pub mod channel;
pub mod llm_types;

pub use call::{CallDirection, SessionRef, TelephonyContext};
pub use channel::{
    CallChannel, CallEvent, ChannelError, DialTarget, GatherOptions, GatherSource,
};
pub use llm_types::{FinishReason, Message, Role, ToolCall, ToolDefinition};
