//! Verb execution against the call-control channel
//!
//! A verb is a named, parameterized call-control action (answer, say, play,
//! gather, dial, hangup, …). Each verb has exactly one handler; a handler
//! performs exactly one channel operation and emits exactly one response.
//! The isolation wrapper guarantees a failing handler produces a well-formed
//! error response instead of taking the session down.

pub mod handlers;
pub mod isolation;
pub mod protocol;
pub mod registry;

pub use handlers::{
    AnswerHandler, DialHandler, GatherHandler, HandlerError, HangupHandler, MuteHandler,
    PlayHandler, SayHandler, SendDtmfHandler, UnmuteHandler, VerbHandler,
};
pub use isolation::Isolated;
pub use protocol::{
    ErrorCode, Verb, VerbError, VerbOutcome, VerbParams, VerbRequest, VerbResponse,
};
pub use registry::VerbRegistry;
