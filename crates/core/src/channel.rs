//! Call-control channel abstraction
//!
//! The signaling stack is a collaborator, not part of this workspace. It is
//! consumed through the `CallChannel` trait (verb operations keyed by
//! `SessionRef`) and observed through `CallEvent` values delivered on a
//! per-process event stream. Implementations wrap whatever transport the
//! deployment uses (ARI, ESL, a media gateway API); tests use a mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::call::SessionRef;

/// Structured failure from the control channel.
///
/// `NotFound` and `Terminal` mean the call leg no longer exists; every other
/// variant leaves the session usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No call leg with that reference
    #[error("session not found: {0}")]
    NotFound(SessionRef),

    /// Operation invalid for the leg's current state (e.g. answering twice)
    #[error("already in requested state: {0}")]
    AlreadyInState(String),

    /// Transport-level failure talking to the signaling stack
    #[error("transport error: {0}")]
    Transport(String),

    /// The call leg has ended; no further operations will succeed
    #[error("call leg terminated: {0}")]
    Terminal(SessionRef),
}

impl ChannelError {
    /// Whether the call leg is gone for good
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChannelError::NotFound(_) | ChannelError::Terminal(_))
    }
}

/// Where gathered input comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GatherSource {
    #[default]
    Speech,
    Dtmf,
    SpeechAndDtmf,
}

/// Options for the gather verb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GatherOptions {
    #[serde(default)]
    pub source: GatherSource,
    /// Overall collection timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Maximum DTMF digits to collect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_digits: Option<u8>,
    /// DTMF key that ends collection early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_on_key: Option<char>,
}

/// Target of a dial/transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialTarget(pub String);

impl DialTarget {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }
}

/// Verb operations against one call leg.
///
/// Each method performs exactly one signaling operation and reports success
/// or a structured failure. No retries here; retry policy belongs upstream.
#[async_trait]
pub trait CallChannel: Send + Sync {
    /// Answer the leg so audio can flow
    async fn answer(&self, session_ref: &SessionRef) -> Result<(), ChannelError>;

    /// Speak synthesized text on the leg
    async fn say(&self, session_ref: &SessionRef, text: &str) -> Result<(), ChannelError>;

    /// Play media by URL on the leg
    async fn play(&self, session_ref: &SessionRef, url: &str) -> Result<(), ChannelError>;

    /// Collect speech or DTMF input from the leg
    async fn gather(
        &self,
        session_ref: &SessionRef,
        options: &GatherOptions,
    ) -> Result<(), ChannelError>;

    /// Transfer/bridge the leg to a target
    async fn dial(&self, session_ref: &SessionRef, target: &DialTarget)
        -> Result<(), ChannelError>;

    /// Tear the leg down
    async fn hangup(&self, session_ref: &SessionRef) -> Result<(), ChannelError>;

    /// Stop sending the leg's audio
    async fn mute(&self, session_ref: &SessionRef) -> Result<(), ChannelError>;

    /// Resume sending the leg's audio
    async fn unmute(&self, session_ref: &SessionRef) -> Result<(), ChannelError>;

    /// Send DTMF digits on the leg
    async fn send_dtmf(&self, session_ref: &SessionRef, digits: &str)
        -> Result<(), ChannelError>;
}

/// Call lifecycle and media events delivered by the control channel,
/// tagged by the leg they belong to. Processed strictly in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    /// A new leg exists and wants handling
    Incoming {
        session_ref: SessionRef,
        caller: String,
        callee: String,
    },
    /// The leg was answered
    Answered { session_ref: SessionRef },
    /// A gather completed with collected input
    GatherResult {
        session_ref: SessionRef,
        /// Transcript or digit string, empty on timeout
        input: String,
    },
    /// A play finished
    PlaybackFinished { session_ref: SessionRef },
    /// A single DTMF digit arrived outside a gather
    DtmfReceived { session_ref: SessionRef, digit: char },
    /// The far end (or the stack) hung up
    Hangup { session_ref: SessionRef },
    /// The channel reports an error on the leg
    Error {
        session_ref: SessionRef,
        message: String,
    },
}

impl CallEvent {
    /// The leg this event belongs to
    pub fn session_ref(&self) -> &SessionRef {
        match self {
            CallEvent::Incoming { session_ref, .. }
            | CallEvent::Answered { session_ref }
            | CallEvent::GatherResult { session_ref, .. }
            | CallEvent::PlaybackFinished { session_ref }
            | CallEvent::DtmfReceived { session_ref, .. }
            | CallEvent::Hangup { session_ref }
            | CallEvent::Error { session_ref, .. } => session_ref,
        }
    }

    /// Whether this event ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallEvent::Hangup { .. })
    }
}
